//! # Evidence Commitment
//!
//! [`EvidenceCommitment`] binds an ordered list of leaf hashes to a Merkle
//! root. The invariants `merkle_root == build(evidence_hashes)` and
//! `evidence_count == evidence_hashes.len()` hold for every commitment this
//! module produces, and are re-checked when one is loaded from JSON.

use chrono::{DateTime, Utc};
use evanchor_core::{BundleId, EvidenceItem, HashAlgorithm, IntegrityError, ValidationError};
use evanchor_crypto::{
    integrity_mac, open_hash, seal_hash, verify_integrity_mac, verify_proof, EncryptionKey,
    MerkleProofStep, MerkleTree, SealedHash,
};
use serde::{Deserialize, Serialize};

use crate::error::CommitmentError;
use crate::proof::EvidenceProof;

/// Version number of a freshly generated commitment.
pub const INITIAL_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Commitment
// ---------------------------------------------------------------------------

/// Merkle commitment to an evidence bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceCommitment {
    /// Bundle this commitment covers.
    pub bundle_id: BundleId,
    /// Root over `evidence_hashes`.
    pub merkle_root: String,
    /// Number of leaves.
    pub evidence_count: usize,
    /// Leaf hashes in bundle order. Sealed leaves when encrypted.
    pub evidence_hashes: Vec<String>,
    /// Hash algorithm of the tree.
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,
    /// Creation time of this version.
    pub created_at: DateTime<Utc>,
    /// 1 for a new commitment, incremented by every update.
    #[serde(default = "initial_version")]
    pub version: u32,
    /// Whether leaves are sealed content hashes.
    #[serde(default)]
    pub is_encrypted: bool,
    /// `key_{bundle_id}` when encrypted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key_id: Option<String>,
    /// Structured form of each sealed leaf, in leaf order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sealed: Vec<SealedHash>,
    /// HMAC over the plaintext hash list, hex. Encrypted commitments only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity_mac: Option<String>,
}

fn initial_version() -> u32 {
    INITIAL_VERSION
}

/// The externally reported shape of a commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentSummary {
    /// Merkle root, hex.
    pub merkle_root: String,
    /// Number of evidence items committed.
    pub evidence_count: usize,
    /// Bundle identifier.
    pub bundle_id: BundleId,
}

impl EvidenceCommitment {
    /// `{merkle_root, evidence_count, bundle_id}`.
    pub fn summary(&self) -> CommitmentSummary {
        CommitmentSummary {
            merkle_root: self.merkle_root.clone(),
            evidence_count: self.evidence_count,
            bundle_id: self.bundle_id.clone(),
        }
    }

    /// Rebuild the tree over the recorded leaves.
    pub fn tree(&self) -> Result<MerkleTree, ValidationError> {
        let mut tree =
            MerkleTree::from_leaf_hashes(self.evidence_hashes.iter().cloned(), self.hash_algorithm);
        tree.build()?;
        Ok(tree)
    }

    /// Re-check count, root and sealed-leaf consistency.
    pub fn check_invariants(&self) -> Result<(), CommitmentError> {
        if self.evidence_count != self.evidence_hashes.len() {
            return Err(IntegrityError::CountMismatch {
                recorded: self.evidence_count,
                actual: self.evidence_hashes.len(),
            }
            .into());
        }
        let recomputed = self
            .tree()?
            .root()
            .map(str::to_string)
            .ok_or(ValidationError::TreeNotBuilt)?;
        if recomputed != self.merkle_root {
            return Err(IntegrityError::RootMismatch {
                recorded: self.merkle_root.clone(),
                recomputed,
            }
            .into());
        }
        if self.is_encrypted {
            if self.sealed.len() != self.evidence_hashes.len() {
                return Err(IntegrityError::SealedCountMismatch {
                    leaves: self.evidence_hashes.len(),
                    sealed: self.sealed.len(),
                }
                .into());
            }
            if let Some(index) = self
                .sealed
                .iter()
                .zip(&self.evidence_hashes)
                .position(|(s, leaf)| s.to_leaf() != *leaf)
            {
                return Err(IntegrityError::SealedLeafMismatch { index }.into());
            }
        }
        Ok(())
    }

    /// Open every sealed leaf, returning the plaintext content hashes.
    fn open_all(&self, key: &EncryptionKey) -> Result<Vec<String>, CommitmentError> {
        self.sealed
            .iter()
            .map(|s| open_hash(key, s).map_err(CommitmentError::from))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Generates and checks commitments with a fixed hash algorithm.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitmentGenerator {
    algorithm: HashAlgorithm,
}

impl CommitmentGenerator {
    /// Generator using `algorithm` for new commitments.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Hash algorithm of new commitments.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Commit to `items` in order.
    ///
    /// With `encrypt`, each content hash is sealed under `key` and the sealed
    /// leaf is committed instead.
    ///
    /// # Errors
    ///
    /// [`ValidationError::EmptyEvidence`] for an empty list,
    /// [`ValidationError::MissingEncryptionKey`] when `encrypt` is set without
    /// a key, [`ValidationError::InvalidEvidence`] for a malformed hash.
    pub fn generate_commitment(
        &self,
        items: &[EvidenceItem],
        bundle_id: BundleId,
        encrypt: bool,
        key: Option<&EncryptionKey>,
    ) -> Result<EvidenceCommitment, CommitmentError> {
        if items.is_empty() {
            return Err(ValidationError::EmptyEvidence.into());
        }
        for item in items {
            item.validate()?;
        }
        let plain: Vec<String> = items.iter().map(|i| i.leaf_hash()).collect();

        let (leaves, sealed, mac, key_id) = if encrypt {
            let key = key.ok_or(ValidationError::MissingEncryptionKey)?;
            let sealed = plain
                .iter()
                .map(|h| seal_hash(key, h))
                .collect::<Result<Vec<_>, _>>()?;
            let leaves = sealed.iter().map(SealedHash::to_leaf).collect();
            let mac = integrity_mac(key, &plain)?;
            (leaves, sealed, Some(mac), Some(bundle_id.encryption_key_id()))
        } else {
            (plain, Vec::new(), None, None)
        };

        let commitment = self.assemble(
            bundle_id,
            self.algorithm,
            leaves,
            INITIAL_VERSION,
            sealed,
            mac,
            key_id,
        )?;
        tracing::info!(
            bundle_id = %commitment.bundle_id,
            evidence_count = commitment.evidence_count,
            encrypted = commitment.is_encrypted,
            merkle_root = %commitment.merkle_root,
            "generated evidence commitment"
        );
        Ok(commitment)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        bundle_id: BundleId,
        algorithm: HashAlgorithm,
        leaves: Vec<String>,
        version: u32,
        sealed: Vec<SealedHash>,
        integrity_mac: Option<String>,
        encryption_key_id: Option<String>,
    ) -> Result<EvidenceCommitment, CommitmentError> {
        let mut tree = MerkleTree::from_leaf_hashes(leaves.iter().cloned(), algorithm);
        let merkle_root = tree.build()?;
        Ok(EvidenceCommitment {
            bundle_id,
            merkle_root,
            evidence_count: leaves.len(),
            evidence_hashes: leaves,
            hash_algorithm: algorithm,
            created_at: Utc::now(),
            version,
            is_encrypted: encryption_key_id.is_some(),
            encryption_key_id,
            sealed,
            integrity_mac,
        })
    }

    /// Inclusion proof for the leaf at `index`.
    ///
    /// # Errors
    ///
    /// [`ValidationError::ProofIndexOutOfRange`] for an index past the end.
    pub fn generate_proof(
        &self,
        commitment: &EvidenceCommitment,
        index: usize,
    ) -> Result<EvidenceProof, CommitmentError> {
        if index >= commitment.evidence_hashes.len() {
            return Err(ValidationError::ProofIndexOutOfRange {
                index,
                len: commitment.evidence_hashes.len(),
            }
            .into());
        }
        let tree = commitment.tree()?;
        let proof = tree.get_proof(index)?;
        Ok(EvidenceProof {
            evidence_index: index,
            evidence_hash: commitment.evidence_hashes[index].clone(),
            merkle_root: commitment.merkle_root.clone(),
            proof,
            bundle_id: commitment.bundle_id.clone(),
            hash_algorithm: commitment.hash_algorithm,
            version: commitment.version,
        })
    }

    /// Stateless proof check with this generator's algorithm. Never fails.
    pub fn verify_proof(
        &self,
        evidence_hash: &str,
        proof: &[MerkleProofStep],
        merkle_root: &str,
    ) -> bool {
        verify_proof(self.algorithm, evidence_hash, proof, merkle_root)
    }

    /// Whether `current` still matches what `commitment` committed to.
    ///
    /// Unencrypted: exact ordered comparison of content hashes. Encrypted:
    /// count only; use
    /// [`verify_sealed_bundle_integrity`](Self::verify_sealed_bundle_integrity)
    /// when the key is available.
    pub fn verify_bundle_integrity(
        &self,
        current: &[EvidenceItem],
        commitment: &EvidenceCommitment,
    ) -> bool {
        if current.len() != commitment.evidence_count {
            return false;
        }
        if commitment.is_encrypted {
            return current.len() == commitment.evidence_hashes.len();
        }
        current
            .iter()
            .map(EvidenceItem::leaf_hash)
            .eq(commitment.evidence_hashes.iter().cloned())
    }

    /// Exact integrity check for an encrypted commitment.
    ///
    /// Checks the HMAC tag over the plaintext hashes; commitments without a
    /// tag are checked by opening every sealed leaf. Unencrypted commitments
    /// fall back to [`verify_bundle_integrity`](Self::verify_bundle_integrity).
    pub fn verify_sealed_bundle_integrity(
        &self,
        current: &[EvidenceItem],
        commitment: &EvidenceCommitment,
        key: &EncryptionKey,
    ) -> Result<bool, CommitmentError> {
        if !commitment.is_encrypted {
            return Ok(self.verify_bundle_integrity(current, commitment));
        }
        if current.len() != commitment.evidence_count {
            return Ok(false);
        }
        let plain: Vec<String> = current.iter().map(|i| i.leaf_hash()).collect();
        match &commitment.integrity_mac {
            Some(tag) => Ok(verify_integrity_mac(key, &plain, tag)?),
            None => Ok(commitment.open_all(key)? == plain),
        }
    }

    /// Append `new_items` to an unencrypted commitment.
    ///
    /// Existing leaves are kept as recorded and never re-derived.
    ///
    /// # Errors
    ///
    /// [`CommitmentError::KeyRequired`] for an encrypted commitment.
    pub fn update_commitment(
        &self,
        existing: &EvidenceCommitment,
        new_items: &[EvidenceItem],
    ) -> Result<EvidenceCommitment, CommitmentError> {
        if existing.is_encrypted {
            return Err(CommitmentError::KeyRequired(existing.bundle_id.to_string()));
        }
        for item in new_items {
            item.validate()?;
        }
        let mut leaves = existing.evidence_hashes.clone();
        leaves.extend(new_items.iter().map(|i| i.leaf_hash()));
        let updated = self.assemble(
            existing.bundle_id.clone(),
            existing.hash_algorithm,
            leaves,
            existing.version + 1,
            Vec::new(),
            None,
            None,
        )?;
        tracing::info!(
            bundle_id = %updated.bundle_id,
            version = updated.version,
            added = new_items.len(),
            "updated evidence commitment"
        );
        Ok(updated)
    }

    /// Append `new_items` to an encrypted commitment, sealing them under `key`.
    ///
    /// The integrity tag is recomputed over the full plaintext list, so `key`
    /// must be the key the existing leaves were sealed with.
    pub fn update_sealed_commitment(
        &self,
        existing: &EvidenceCommitment,
        new_items: &[EvidenceItem],
        key: &EncryptionKey,
    ) -> Result<EvidenceCommitment, CommitmentError> {
        if !existing.is_encrypted {
            return self.update_commitment(existing, new_items);
        }
        for item in new_items {
            item.validate()?;
        }
        let mut plain = existing.open_all(key)?;
        let mut sealed = existing.sealed.clone();
        let mut leaves = existing.evidence_hashes.clone();
        for item in new_items {
            let hash = item.leaf_hash();
            let s = seal_hash(key, &hash)?;
            leaves.push(s.to_leaf());
            sealed.push(s);
            plain.push(hash);
        }
        let mac = integrity_mac(key, &plain)?;
        let updated = self.assemble(
            existing.bundle_id.clone(),
            existing.hash_algorithm,
            leaves,
            existing.version + 1,
            sealed,
            Some(mac),
            existing
                .encryption_key_id
                .clone()
                .or_else(|| Some(existing.bundle_id.encryption_key_id())),
        )?;
        tracing::info!(
            bundle_id = %updated.bundle_id,
            version = updated.version,
            added = new_items.len(),
            "updated sealed evidence commitment"
        );
        Ok(updated)
    }

    /// Encode a commitment as JSON.
    pub fn serialize_commitment(
        &self,
        commitment: &EvidenceCommitment,
    ) -> Result<String, CommitmentError> {
        Ok(serde_json::to_string(commitment)?)
    }

    /// Decode a commitment from JSON and re-check its invariants.
    pub fn deserialize_commitment(&self, json: &str) -> Result<EvidenceCommitment, CommitmentError> {
        let commitment: EvidenceCommitment = serde_json::from_str(json)?;
        commitment.check_invariants()?;
        Ok(commitment)
    }

    /// `bundle_{tenant}_{claim}_{YYYYmmddHHMMSS}`, defaulting to now.
    pub fn generate_bundle_id(
        tenant_id: &str,
        claim_id: &str,
        timestamp: Option<DateTime<Utc>>,
    ) -> BundleId {
        BundleId::generate(tenant_id, claim_id, timestamp.unwrap_or_else(Utc::now))
    }
}
