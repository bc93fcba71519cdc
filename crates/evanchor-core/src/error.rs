//! # Error Hierarchy
//!
//! Structured error types shared by every evanchor crate, built with
//! `thiserror`. No `Box<dyn Error>`, no `.unwrap()` outside tests.
//!
//! Two families live here because both cross crate boundaries:
//!
//! - [`ValidationError`]: malformed caller input. Local and fatal: the
//!   caller must fix the input before any network interaction happens.
//! - [`IntegrityError`]: stored or on-chain data that does not have the
//!   shape it must have. Treated as corruption, never coerced or defaulted.

use thiserror::Error;

/// Validation errors for caller-supplied input.
///
/// Each variant carries the offending value (or its length) and the
/// expected shape so an operator can fix the input without guesswork.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A Merkle tree was asked to build with no leaves.
    #[error("cannot build Merkle tree with no leaves")]
    EmptyLeafSet,

    /// A commitment was requested for an empty evidence list.
    #[error("cannot create commitment for empty evidence list")]
    EmptyEvidence,

    /// Encryption was requested without a key.
    #[error("encryption key required when encrypt=true")]
    MissingEncryptionKey,

    /// A hash string does not have exactly 64 hex characters.
    #[error("invalid {field}: expected 64 hex characters, got {len}")]
    InvalidHashLength {
        /// Name of the offending field.
        field: &'static str,
        /// Length of the supplied string.
        len: usize,
    },

    /// A hash string has the right length but is not hex.
    #[error("invalid {field}: not a hex string")]
    InvalidHex {
        /// Name of the offending field.
        field: &'static str,
    },

    /// Proof requested for a leaf index outside the tree.
    #[error("invalid leaf index {index} for tree with {len} leaves")]
    ProofIndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of leaves in the tree.
        len: usize,
    },

    /// Proof requested before the tree was built.
    #[error("tree must be built before generating proofs")]
    TreeNotBuilt,

    /// Package identifier is empty.
    #[error("invalid package_id: must be non-empty")]
    EmptyPackageId,

    /// Package identifier exceeds the on-chain box-name limit.
    #[error("invalid package_id: {len} bytes exceeds the {max}-byte limit")]
    PackageIdTooLong {
        /// UTF-8 byte length of the supplied identifier.
        len: usize,
        /// Maximum permitted byte length.
        max: usize,
    },

    /// Hash algorithm name is not one of the supported algorithms.
    #[error("unsupported hash algorithm: {0} (supported: SHA224, SHA256, SHA384, SHA512)")]
    UnsupportedHashAlgorithm(String),

    /// A ledger address failed to decode.
    #[error("invalid address \"{value}\": {reason}")]
    InvalidAddress {
        /// The string that failed to decode.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Evidence item fails basic shape checks.
    #[error("invalid evidence item: {0}")]
    InvalidEvidence(String),
}

/// Data-integrity violations.
///
/// Raised when persisted or on-chain data is present but not well formed,
/// or when it is absent where it must exist. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    /// No anchor box exists for the package.
    #[error("missing box: application {app_id} has no anchor for package \"{package_id}\"")]
    MissingBox {
        /// Application whose box storage was queried.
        app_id: u64,
        /// Package identifier used as the box name.
        package_id: String,
    },

    /// The anchor box exists but has the wrong size.
    #[error("malformed box for package \"{package_id}\": expected {expected} bytes, got {actual}")]
    MalformedBox {
        /// Package identifier used as the box name.
        package_id: String,
        /// Required box size.
        expected: usize,
        /// Observed box size.
        actual: usize,
    },

    /// A stored commitment's root does not match its leaves.
    #[error("commitment root mismatch: recorded {recorded}, recomputed {recomputed}")]
    RootMismatch {
        /// Root recorded in the commitment.
        recorded: String,
        /// Root recomputed from the commitment's leaves.
        recomputed: String,
    },

    /// A stored commitment's count does not match its leaves.
    #[error("commitment count mismatch: recorded {recorded}, actual {actual}")]
    CountMismatch {
        /// Count recorded in the commitment.
        recorded: usize,
        /// Number of leaf hashes present.
        actual: usize,
    },

    /// An encrypted commitment lists a different number of sealed entries
    /// than leaves.
    #[error("sealed entry count {sealed} does not match leaf count {leaves}")]
    SealedCountMismatch {
        /// Number of leaf hashes.
        leaves: usize,
        /// Number of structured sealed entries.
        sealed: usize,
    },

    /// A sealed entry does not encode to the leaf at the same position.
    #[error("sealed entry {index} does not match its leaf hash")]
    SealedLeafMismatch {
        /// Position of the first mismatching leaf.
        index: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_hash_length_display() {
        let err = ValidationError::InvalidHashLength {
            field: "package_hash",
            len: 12,
        };
        let msg = format!("{err}");
        assert!(msg.contains("package_hash"));
        assert!(msg.contains("64 hex characters"));
        assert!(msg.contains("12"));
    }

    #[test]
    fn test_proof_index_display() {
        let err = ValidationError::ProofIndexOutOfRange { index: 7, len: 3 };
        let msg = format!("{err}");
        assert!(msg.contains('7'));
        assert!(msg.contains('3'));
    }

    #[test]
    fn test_package_id_too_long_display() {
        let err = ValidationError::PackageIdTooLong { len: 70, max: 64 };
        let msg = format!("{err}");
        assert!(msg.contains("70"));
        assert!(msg.contains("64-byte"));
    }

    #[test]
    fn test_missing_box_display() {
        let err = IntegrityError::MissingBox {
            app_id: 42,
            package_id: "pkg_1".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("missing box"));
        assert!(msg.contains("pkg_1"));
    }

    #[test]
    fn test_malformed_box_display() {
        let err = IntegrityError::MalformedBox {
            package_id: "pkg".to_string(),
            expected: 104,
            actual: 72,
        };
        let msg = format!("{err}");
        assert!(msg.contains("104"));
        assert!(msg.contains("72"));
    }

    #[test]
    fn test_sealed_leaf_mismatch_display() {
        let msg = format!("{}", IntegrityError::SealedLeafMismatch { index: 2 });
        assert!(msg.contains("sealed entry 2"));
        let msg = format!(
            "{}",
            IntegrityError::SealedCountMismatch {
                leaves: 3,
                sealed: 1
            }
        );
        assert!(msg.contains('3') && msg.contains('1'));
    }

    #[test]
    fn test_errors_are_comparable() {
        assert_eq!(ValidationError::EmptyLeafSet, ValidationError::EmptyLeafSet);
        assert_ne!(ValidationError::EmptyLeafSet, ValidationError::EmptyEvidence);
    }
}
