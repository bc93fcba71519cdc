//! # Cryptographic Error Types
//!
//! Structured errors for all cryptographic operations in `evanchor-crypto`.

use evanchor_core::ValidationError;
use thiserror::Error;

/// Errors from cryptographic operations.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Encryption key has the wrong length.
    #[error("invalid encryption key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// AEAD sealing failed.
    #[error("seal failed")]
    SealFailed,

    /// AEAD opening failed: wrong key or tampered ciphertext.
    #[error("decryption failed: invalid key or tampered data")]
    OpenFailed,

    /// The integrity MAC could not be keyed.
    #[error("integrity MAC key rejected: {0}")]
    MacKey(String),

    /// A sealed leaf could not be parsed.
    #[error("malformed sealed leaf: {0}")]
    MalformedSealedLeaf(String),

    /// Signing seed is not 32 bytes of hex.
    #[error("invalid signing seed: {0}")]
    InvalidSeed(String),

    /// Invalid Ed25519 public key.
    #[error("invalid Ed25519 public key: {0}")]
    InvalidPublicKey(String),

    /// Ed25519 signature verification failed.
    #[error("Ed25519 verification failed: {0}")]
    VerificationFailed(String),

    /// Input validation failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_length_display() {
        let err = CryptoError::InvalidKeyLength(16);
        assert!(format!("{err}").contains("16"));
    }

    #[test]
    fn test_validation_is_transparent() {
        let err: CryptoError = ValidationError::EmptyLeafSet.into();
        assert_eq!(format!("{err}"), "cannot build Merkle tree with no leaves");
    }
}
