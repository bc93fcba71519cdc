//! # Anchor Records
//!
//! What the service hands back after anchoring a package, and the status
//! lifecycle each attempt moves through.
//!
//! ## Attempt Lifecycle
//!
//! ```text
//! Prepared ──▶ Submitted ──▶ Confirmed
//!     │            │
//!     └────────────┴───────▶ Failed
//! ```
//!
//! `Confirmed` and `Failed` are terminal. A retry is a new attempt with a
//! new transaction.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use evanchor_core::{sha256_hex, PackageId, ValidationError};
use evanchor_crypto::MerkleProofStep;

use crate::error::AnchoringError;

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Ledger network an anchor lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production network.
    Mainnet,
    /// Public test network.
    #[default]
    Testnet,
    /// Public beta network.
    Betanet,
    /// Local development node.
    Localnet,
}

impl Network {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Betanet => "betanet",
            Self::Localnet => "localnet",
        }
    }

    /// Public algod endpoint for the network.
    pub fn default_algod_url(&self) -> &'static str {
        match self {
            Self::Mainnet => "https://mainnet-api.algonode.cloud",
            Self::Testnet => crate::config::DEFAULT_ALGOD_URL,
            Self::Betanet => "https://betanet-api.algonode.cloud",
            Self::Localnet => "http://localhost:4001",
        }
    }

    fn explorer_base(&self) -> &'static str {
        match self {
            Self::Mainnet => "https://algoexplorer.io/tx/",
            Self::Testnet => "https://testnet.algoexplorer.io/tx/",
            Self::Betanet => "https://betanet.algoexplorer.io/tx/",
            Self::Localnet => "http://localhost:4001/tx/",
        }
    }

    /// Explorer link for a transaction.
    pub fn explorer_url(&self, txid: &str) -> String {
        format!("{}{txid}", self.explorer_base())
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "betanet" => Ok(Self::Betanet),
            "localnet" | "local" | "sandbox" => Ok(Self::Localnet),
            other => Err(format!("unknown network \"{other}\"")),
        }
    }
}

/// Parsed default algod URL of `network`.
pub fn default_algod_url(network: Network) -> Result<Url, url::ParseError> {
    Url::parse(network.default_algod_url())
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Externally reported anchor status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorStatus {
    /// Submitted, not yet confirmed.
    Pending,
    /// Confirmed in a block.
    Confirmed,
    /// Rejected or timed out.
    Failed,
}

impl AnchorStatus {
    /// Whether the status can still change.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for AnchorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        })
    }
}

/// State of one anchoring attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum AttemptState {
    /// Transaction built, nothing sent.
    Prepared,
    /// Sent to the node under `txid`.
    Submitted {
        /// Transaction id.
        txid: String,
    },
    /// Included in block `round`.
    Confirmed {
        /// Transaction id.
        txid: String,
        /// Confirmation round.
        round: u64,
    },
    /// Rejected, dropped or timed out.
    Failed {
        /// Transaction id, when one was assigned.
        txid: Option<String>,
        /// Failure description.
        reason: String,
    },
}

impl AttemptState {
    /// Record submission. Only valid from `Prepared`.
    pub fn submit(self, txid: impl Into<String>) -> Result<Self, AnchoringError> {
        match self {
            Self::Prepared => Ok(Self::Submitted { txid: txid.into() }),
            other => Err(invalid_transition(&other, "submitted")),
        }
    }

    /// Record confirmation. Only valid from `Submitted`.
    pub fn confirm(self, round: u64) -> Result<Self, AnchoringError> {
        match self {
            Self::Submitted { txid } => Ok(Self::Confirmed { txid, round }),
            other => Err(invalid_transition(&other, "confirmed")),
        }
    }

    /// Record failure. Valid from any non-terminal state.
    pub fn fail(self, reason: impl Into<String>) -> Result<Self, AnchoringError> {
        match self {
            Self::Prepared => Ok(Self::Failed {
                txid: None,
                reason: reason.into(),
            }),
            Self::Submitted { txid } => Ok(Self::Failed {
                txid: Some(txid),
                reason: reason.into(),
            }),
            other => Err(invalid_transition(&other, "failed")),
        }
    }

    /// Externally reported status.
    pub fn status(&self) -> AnchorStatus {
        match self {
            Self::Prepared | Self::Submitted { .. } => AnchorStatus::Pending,
            Self::Confirmed { .. } => AnchorStatus::Confirmed,
            Self::Failed { .. } => AnchorStatus::Failed,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Prepared => "prepared",
            Self::Submitted { .. } => "submitted",
            Self::Confirmed { .. } => "confirmed",
            Self::Failed { .. } => "failed",
        }
    }
}

fn invalid_transition(from: &AttemptState, to: &str) -> AnchoringError {
    AnchoringError::Task(format!(
        "invalid attempt transition {} -> {to}",
        from.name()
    ))
}

// ---------------------------------------------------------------------------
// Requests and records
// ---------------------------------------------------------------------------

/// Request to anchor one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorPackageRequest {
    /// Package identifier (box name).
    pub package_id: PackageId,
    /// 64-hex package hash.
    pub package_hash: String,
    /// 64-hex Merkle root; 64 zeros when absent.
    #[serde(default)]
    pub merkle_root: Option<String>,
    /// User on whose behalf the anchor is made.
    pub anchored_by: String,
}

/// One package of a batch anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPackage {
    /// Package identifier.
    pub package_id: PackageId,
    /// 64-hex package hash.
    pub package_hash: String,
}

/// Ledger family written into every record.
pub const BLOCKCHAIN: &str = "algorand";

fn default_blockchain() -> String {
    BLOCKCHAIN.to_string()
}

/// A confirmed anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorRecord {
    /// Stable identifier of this anchor.
    pub anchor_id: String,
    /// Anchored package.
    pub package_id: PackageId,
    /// Ledger family, [`BLOCKCHAIN`].
    #[serde(default = "default_blockchain")]
    pub blockchain: String,
    /// Package hash, lowercase hex.
    pub package_hash: String,
    /// Merkle root, lowercase hex.
    pub merkle_root: String,
    /// Transaction id of the anchor call.
    pub transaction_hash: String,
    /// Confirmation round.
    pub block_number: Option<u64>,
    /// Anchor application.
    pub app_id: u64,
    /// Network of the anchor.
    pub network: Network,
    /// Status.
    pub status: AnchorStatus,
    /// Requesting user.
    pub anchored_by: String,
    /// Account that signed the anchor call.
    pub signer_address: String,
    /// Timestamp written into the box (unix seconds).
    pub anchor_timestamp: u64,
    /// When the anchor was requested.
    pub anchored_at: DateTime<Utc>,
    /// When confirmation was observed.
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Fees of the anchor group, in microalgos. Shared by every record of
    /// a batch.
    pub transaction_fee: u64,
    /// Box holding a batch anchor. `None` when the box is named by
    /// `package_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<PackageId>,
    /// Path from `package_hash` to `merkle_root` for batch anchors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inclusion_proof: Vec<MerkleProofStep>,
}

/// The externally visible summary of an anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorOutput {
    /// Stable identifier of this anchor.
    pub anchor_id: String,
    /// Transaction id.
    pub transaction_hash: String,
    /// Confirmation round.
    pub block_number: Option<u64>,
    /// Explorer link.
    pub explorer_url: String,
    /// Status.
    pub status: AnchorStatus,
}

impl AnchorRecord {
    /// Name of the box this anchor was written to.
    pub fn box_name(&self) -> &PackageId {
        self.batch_id.as_ref().unwrap_or(&self.package_id)
    }

    /// External summary with the explorer link.
    pub fn output(&self) -> AnchorOutput {
        AnchorOutput {
            anchor_id: self.anchor_id.clone(),
            transaction_hash: self.transaction_hash.clone(),
            block_number: self.block_number,
            explorer_url: self.network.explorer_url(&self.transaction_hash),
            status: self.status,
        }
    }
}

/// Deterministic anchor identifier for a package and transaction.
pub fn anchor_id(package_id: &PackageId, txid: &str) -> String {
    let digest = sha256_hex(format!("{}:{txid}", package_id.as_str()).as_bytes());
    format!("anchor_{BLOCKCHAIN}_{}", &digest[..16])
}

/// Box name of a batch anchor: `batch_` and the first 16 hex chars of the
/// batch root.
pub fn batch_box_id(merkle_root_hex: &str) -> Result<PackageId, ValidationError> {
    let prefix = merkle_root_hex.get(..16).ok_or(ValidationError::InvalidHashLength {
        field: "merkle_root",
        len: merkle_root_hex.len(),
    })?;
    PackageId::new(format!("batch_{prefix}"))
}

/// Hash binding a batch to its package ids, in order.
///
/// SHA-256 over `u32_be(len) || utf8(id)` for each id.
pub fn batch_manifest_hash(packages: &[BatchPackage]) -> String {
    let mut manifest = Vec::new();
    for p in packages {
        let id = p.package_id.as_bytes();
        manifest.extend_from_slice(&(id.len() as u32).to_be_bytes());
        manifest.extend_from_slice(id);
    }
    sha256_hex(&manifest)
}

/// Confirmation depth of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorStatusReport {
    /// Transaction id.
    pub transaction_hash: String,
    /// Status derived from the depth.
    pub status: AnchorStatus,
    /// Round the transaction landed in.
    pub block_number: Option<u64>,
    /// Blocks since (and including) the confirmation round.
    pub confirmations: u64,
}

/// Confirmations after which an anchor is reported as final.
pub const FINALITY_CONFIRMATIONS: u64 = 6;

impl AnchorStatusReport {
    /// Report for a transaction confirmed in `confirmed_round` (0 if pending)
    /// as seen at `last_round`.
    pub fn from_rounds(txid: &str, confirmed_round: u64, last_round: u64) -> Self {
        let confirmations = if confirmed_round > 0 && last_round >= confirmed_round {
            last_round - confirmed_round + 1
        } else {
            0
        };
        let status = if confirmations >= FINALITY_CONFIRMATIONS {
            AnchorStatus::Confirmed
        } else {
            AnchorStatus::Pending
        };
        Self {
            transaction_hash: txid.to_string(),
            status,
            block_number: (confirmed_round > 0).then_some(confirmed_round),
            confirmations,
        }
    }
}

/// Cost of anchoring one package, in microalgos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Fees for the payment and the application call.
    pub transaction_fee: u64,
    /// Minimum balance the new box locks in the application account.
    pub box_min_balance: u64,
    /// Sum of both.
    pub total: u64,
}
