//! # evanchor-crypto: Cryptographic Primitives for evanchor
//!
//! This crate provides the cryptographic building blocks used throughout
//! the workspace:
//!
//! - **Merkle tree** over hex leaf hashes, with inclusion proofs. Parent
//!   nodes hash the concatenated *hex strings* of their children, which keeps
//!   roots reproducible by any tool that can hash text.
//! - **Leaf sealing** with AES-256-GCM (`ring`), so an encrypted bundle
//!   commits to ciphertexts rather than raw content hashes.
//! - **Bundle integrity tags** (HMAC-SHA-256) over the plaintext hash list
//!   of an encrypted bundle.
//! - **Custodial Ed25519 key** used to sign ledger transactions.

pub mod error;
pub mod mac;
pub mod merkle;
pub mod seal;
pub mod signer;

// Re-export primary types.
pub use error::CryptoError;
pub use mac::{integrity_mac, verify_integrity_mac};
pub use merkle::{hash_pair, verify_proof, MerkleProofStep, MerkleTree, ProofPosition};
pub use seal::{open_hash, seal_hash, EncryptionKey, SealedHash, NONCE_LEN};
pub use signer::{verify_signature, CustodialKey};
