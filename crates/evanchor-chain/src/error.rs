//! Anchoring errors.

use evanchor_core::{IntegrityError, ValidationError};
use evanchor_crypto::CryptoError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors from anchoring operations.
///
/// Only [`ConfirmationTimeout`](Self::ConfirmationTimeout), transport
/// failures and server-side node errors are retryable, and a retry always
/// means building a fresh transaction: nothing here resubmits on its own.
#[derive(Error, Debug)]
pub enum AnchoringError {
    /// Caller input was malformed. Nothing was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// On-chain data is missing or malformed.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// No anchor application is configured.
    #[error("anchor application id not configured: set EVANCHOR_APP_ID or deploy the program")]
    MissingAppId,

    /// Custodial signing was requested without a key.
    #[error("custodial signer not configured: set EVANCHOR_SIGNER_SEED")]
    MissingSigner,

    /// The node refused to compile a program.
    #[error("program compilation failed: {0}")]
    Compile(String),

    /// The transaction was not confirmed within the wait window.
    #[error("transaction {txid} not confirmed after {rounds} rounds")]
    ConfirmationTimeout {
        /// Transaction id that was being watched.
        txid: String,
        /// Rounds waited.
        rounds: u64,
    },

    /// The node or the program rejected the transaction.
    #[error("transaction {txid} rejected: {message}")]
    Rejected {
        /// Transaction id (first of the group for group submissions).
        txid: String,
        /// Node message.
        message: String,
    },

    /// Transport failure talking to the node.
    #[error("network error calling {endpoint}: {message}")]
    Network {
        /// `METHOD /path` of the call.
        endpoint: String,
        /// Transport error text.
        message: String,
    },

    /// The node answered with a non-success status.
    #[error("algod {endpoint} returned {status}: {body}")]
    Api {
        /// `METHOD /path` of the call.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The node answered with a body that could not be decoded.
    #[error("malformed response from {endpoint}: {message}")]
    Deserialization {
        /// `METHOD /path` of the call.
        endpoint: String,
        /// Decoder error text.
        message: String,
    },

    /// Transaction encoding or decoding failed.
    #[error("transaction encoding error: {0}")]
    Encoding(String),

    /// Key handling or signature checks failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A background anchor task ended abnormally.
    #[error("anchor task failed: {0}")]
    Task(String),
}

impl AnchoringError {
    /// Whether a caller may retry with a freshly built transaction.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConfirmationTimeout { .. } | Self::Network { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Transaction id, when the failure concerns a known transaction.
    pub fn txid(&self) -> Option<&str> {
        match self {
            Self::ConfirmationTimeout { txid, .. } | Self::Rejected { txid, .. } => Some(txid),
            _ => None,
        }
    }
}
