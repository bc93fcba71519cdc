//! Commitment errors.

use evanchor_core::{IntegrityError, ValidationError};
use evanchor_crypto::CryptoError;
use thiserror::Error;

/// Errors from commitment generation, proof generation and persistence.
#[derive(Error, Debug)]
pub enum CommitmentError {
    /// Caller input was malformed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A stored commitment violates its own invariants.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// Sealing or opening a leaf failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The operation needs the bundle's encryption key.
    #[error("commitment for bundle \"{0}\" is encrypted; the encryption key is required")]
    KeyRequired(String),

    /// JSON encoding or decoding failed.
    #[error("commitment serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
