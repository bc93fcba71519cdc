//! # Merkle Tree
//!
//! Binary Merkle tree over an ordered list of hex leaf hashes.
//!
//! ## Hashing
//!
//! - Leaf (via [`MerkleTree::add_leaf`]): `H(data)`.
//! - Node: `H(left_hex || right_hex)`, where the operands are the lowercase
//!   hex strings of the children, concatenated as UTF-8 text. This is not
//!   the raw-bytes convention; roots must stay bit-exact with existing
//!   commitments.
//! - An unpaired last node at any level is paired with itself.
//!
//! A proof is the list of sibling hashes from leaf to root, each tagged with
//! the side the sibling sits on.

use evanchor_core::{HashAlgorithm, ValidationError};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Proof types
// ---------------------------------------------------------------------------

/// Side of the sibling relative to the node being proven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofPosition {
    /// Sibling is the left operand: `H(sibling || current)`.
    Left,
    /// Sibling is the right operand: `H(current || sibling)`.
    Right,
}

impl ProofPosition {
    /// Lowercase name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProofPosition::Left => "left",
            ProofPosition::Right => "right",
        }
    }
}

impl std::fmt::Display for ProofPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of an inclusion proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProofStep {
    /// Sibling hash at this level.
    #[serde(rename = "hash")]
    pub sibling_hash: String,
    /// Side the sibling is on.
    pub position: ProofPosition,
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Parent hash of two hex children.
pub fn hash_pair(algorithm: HashAlgorithm, left: &str, right: &str) -> String {
    let mut combined = String::with_capacity(left.len() + right.len());
    combined.push_str(left);
    combined.push_str(right);
    algorithm.digest_hex(combined.as_bytes())
}

fn next_level(algorithm: HashAlgorithm, nodes: &[String]) -> Vec<String> {
    nodes
        .chunks(2)
        .map(|pair| {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            hash_pair(algorithm, left, right)
        })
        .collect()
}

/// Replay `proof` from `leaf_hash` and compare the result to `expected_root`.
///
/// Never fails: a malformed proof simply does not verify.
pub fn verify_proof(
    algorithm: HashAlgorithm,
    leaf_hash: &str,
    proof: &[MerkleProofStep],
    expected_root: &str,
) -> bool {
    let computed = proof
        .iter()
        .fold(leaf_hash.to_string(), |current, step| match step.position {
            ProofPosition::Left => hash_pair(algorithm, &step.sibling_hash, &current),
            ProofPosition::Right => hash_pair(algorithm, &current, &step.sibling_hash),
        });
    computed == expected_root
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// Merkle tree with an explicit build step.
///
/// Leaves are appended with [`add_leaf`](Self::add_leaf) (hashes raw data)
/// or supplied as-is with [`from_leaf_hashes`](Self::from_leaf_hashes).
/// Appending invalidates a previous build; [`build`](Self::build) must run
/// again before proofs can be produced.
#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    algorithm: HashAlgorithm,
    leaves: Vec<String>,
    /// All levels, leaves first, root last. Empty until built.
    levels: Vec<Vec<String>>,
}

impl MerkleTree {
    /// Create an empty tree.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            leaves: Vec::new(),
            levels: Vec::new(),
        }
    }

    /// Create an unbuilt tree whose leaves are the given hashes, not re-hashed.
    pub fn from_leaf_hashes<I, S>(hashes: I, algorithm: HashAlgorithm) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            algorithm,
            leaves: hashes.into_iter().map(Into::into).collect(),
            levels: Vec::new(),
        }
    }

    /// Hash `data` and append it as a leaf. Returns the leaf hash.
    pub fn add_leaf(&mut self, data: &[u8]) -> String {
        let leaf = self.algorithm.digest_hex(data);
        self.leaves.push(leaf.clone());
        self.levels.clear();
        leaf
    }

    /// Append several leaves, returning their hashes in order.
    pub fn add_leaves<'a, I>(&mut self, items: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        items.into_iter().map(|d| self.add_leaf(d)).collect()
    }

    /// Build the tree and return the root.
    ///
    /// # Errors
    ///
    /// [`ValidationError::EmptyLeafSet`] when there are no leaves.
    pub fn build(&mut self) -> Result<String, ValidationError> {
        if self.leaves.is_empty() {
            return Err(ValidationError::EmptyLeafSet);
        }
        let mut levels = vec![self.leaves.clone()];
        while let Some(top) = levels.last() {
            if top.len() <= 1 {
                break;
            }
            let parent = next_level(self.algorithm, top);
            levels.push(parent);
        }
        self.levels = levels;
        let root = self.root().map(str::to_string).ok_or(ValidationError::TreeNotBuilt)?;
        tracing::debug!(
            leaves = self.leaves.len(),
            root = %&root[..root.len().min(16)],
            "built merkle tree"
        );
        Ok(root)
    }

    /// Root of the last build, or `None` if unbuilt.
    pub fn root(&self) -> Option<&str> {
        self.levels
            .last()
            .and_then(|level| level.first())
            .map(String::as_str)
    }

    /// Inclusion proof for the leaf at `index`, ordered leaf to root.
    ///
    /// # Errors
    ///
    /// [`ValidationError::TreeNotBuilt`] before [`build`](Self::build), or
    /// [`ValidationError::ProofIndexOutOfRange`].
    pub fn get_proof(&self, index: usize) -> Result<Vec<MerkleProofStep>, ValidationError> {
        if self.levels.is_empty() {
            return Err(ValidationError::TreeNotBuilt);
        }
        if index >= self.leaves.len() {
            return Err(ValidationError::ProofIndexOutOfRange {
                index,
                len: self.leaves.len(),
            });
        }

        let mut proof = Vec::with_capacity(self.levels.len().saturating_sub(1));
        let mut current = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let step = if current % 2 == 0 {
                // Last node of an odd level is its own sibling.
                let sibling = level.get(current + 1).unwrap_or(&level[current]);
                MerkleProofStep {
                    sibling_hash: sibling.clone(),
                    position: ProofPosition::Right,
                }
            } else {
                MerkleProofStep {
                    sibling_hash: level[current - 1].clone(),
                    position: ProofPosition::Left,
                }
            };
            proof.push(step);
            current /= 2;
        }
        Ok(proof)
    }

    /// Verify a proof with this tree's algorithm. See [`verify_proof`].
    pub fn verify_proof(
        &self,
        leaf_hash: &str,
        proof: &[MerkleProofStep],
        expected_root: &str,
    ) -> bool {
        verify_proof(self.algorithm, leaf_hash, proof, expected_root)
    }

    /// Leaf hashes in order.
    pub fn leaves(&self) -> &[String] {
        &self.leaves
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// True when no leaves have been added.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Hash algorithm in use.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
