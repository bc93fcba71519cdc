//! # evanchor-commit: Evidence Bundle Commitments
//!
//! Wraps the Merkle tree around an evidence bundle. A commitment records the
//! ordered leaf hashes and the root computed over them; the root is what gets
//! anchored on-chain.
//!
//! ## Lifecycle
//!
//! - [`CommitmentGenerator::generate_commitment`] builds version 1.
//! - [`CommitmentGenerator::update_commitment`] appends new leaves after the
//!   existing ones and yields version `n + 1`. Earlier versions are not
//!   modified, but their proofs no longer verify against the new root.
//! - Encrypted bundles commit to sealed leaves
//!   ([`SealedHash`](evanchor_crypto::SealedHash)) and carry an HMAC
//!   integrity tag over the plaintext hashes.

pub mod commitment;
pub mod error;
pub mod proof;

pub use commitment::{CommitmentGenerator, CommitmentSummary, EvidenceCommitment};
pub use error::CommitmentError;
pub use proof::EvidenceProof;
