//! Inclusion proof for one evidence item of a committed bundle.

use evanchor_core::{BundleId, HashAlgorithm};
use evanchor_crypto::{verify_proof, MerkleProofStep};
use serde::{Deserialize, Serialize};

/// Proof that the leaf at `evidence_index` is part of the commitment whose
/// root is `merkle_root`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceProof {
    /// Position of the leaf in the bundle.
    pub evidence_index: usize,
    /// The committed leaf (content hash, or sealed leaf when encrypted).
    pub evidence_hash: String,
    /// Root the proof resolves to.
    pub merkle_root: String,
    /// Sibling path, leaf to root.
    pub proof: Vec<MerkleProofStep>,
    /// Bundle the proof belongs to.
    pub bundle_id: BundleId,
    /// Hash algorithm of the tree.
    pub hash_algorithm: HashAlgorithm,
    /// Commitment version the proof was generated against.
    pub version: u32,
}

impl EvidenceProof {
    /// Replay the proof against its own recorded root.
    pub fn verify(&self) -> bool {
        verify_proof(
            self.hash_algorithm,
            &self.evidence_hash,
            &self.proof,
            &self.merkle_root,
        )
    }
}
