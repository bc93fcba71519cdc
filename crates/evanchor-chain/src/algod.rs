//! # Node Interface
//!
//! [`Algod`] abstracts over the ledger node. [`HttpAlgod`](crate::HttpAlgod)
//! talks to a real algod REST endpoint; [`SimulatedLedger`](crate::SimulatedLedger)
//! implements the same trait in memory for tests and local runs. The anchor
//! client composes these calls without knowing which backend it has.
//!
//! Response types follow the algod v2 JSON field names (kebab-case) and use
//! `#[serde(default)]` so additional fields from newer nodes are tolerated.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::address::{Address, Digest32};
use crate::error::AnchoringError;

/// Parameters a new transaction needs from the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TransactionParams {
    /// Suggested per-byte fee; ignored in favour of the flat minimum fee.
    #[serde(default)]
    pub fee: u64,
    /// Minimum flat fee per transaction.
    pub min_fee: u64,
    /// Latest round known to the node.
    pub last_round: u64,
    /// Network genesis id.
    pub genesis_id: String,
    /// Network genesis hash, base64.
    pub genesis_hash: String,
}

/// Fee and validity window derived from [`TransactionParams`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestedParams {
    /// Flat fee per transaction.
    pub fee: u64,
    /// First valid round.
    pub first_valid: u64,
    /// Last valid round.
    pub last_valid: u64,
    /// Network genesis id.
    pub genesis_id: String,
    /// Network genesis hash.
    pub genesis_hash: Digest32,
}

/// Rounds a transaction stays valid after its first valid round.
pub const VALIDITY_WINDOW: u64 = 1_000;

impl TransactionParams {
    /// Flat minimum fee over `[last_round, last_round + VALIDITY_WINDOW]`.
    pub fn suggest(&self) -> Result<SuggestedParams, AnchoringError> {
        let genesis_hash = Digest32::from_base64(&self.genesis_hash).ok_or_else(|| {
            AnchoringError::Deserialization {
                endpoint: "GET /v2/transactions/params".into(),
                message: "genesis-hash is not 32 bytes of base64".into(),
            }
        })?;
        Ok(SuggestedParams {
            fee: self.min_fee,
            first_valid: self.last_round,
            last_valid: self.last_round + VALIDITY_WINDOW,
            genesis_id: self.genesis_id.clone(),
            genesis_hash,
        })
    }
}

/// Node view of a submitted transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PendingTransaction {
    /// Round the transaction was confirmed in; 0 while pending.
    pub confirmed_round: u64,
    /// Non-empty when the pool dropped the transaction.
    pub pool_error: String,
    /// Id of the application created by this transaction, if any.
    pub application_index: Option<u64>,
}

/// Node status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NodeStatus {
    /// Latest round.
    pub last_round: u64,
}

/// Program compiled by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledProgram {
    /// Program hash (an address).
    pub hash: String,
    /// Program bytes, base64.
    pub result: String,
}

/// Account balance summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AccountInfo {
    /// Balance in microalgos.
    pub amount: u64,
    /// Minimum balance the account must keep.
    pub min_balance: u64,
}

/// Ledger node operations the anchor client depends on.
#[async_trait]
pub trait Algod: Send + Sync {
    /// Current transaction parameters.
    async fn transaction_params(&self) -> Result<TransactionParams, AnchoringError>;

    /// Submit raw signed-transaction bytes (one transaction or a group).
    /// Returns the id of the first transaction.
    async fn send_raw_transaction(&self, signed: &[u8]) -> Result<String, AnchoringError>;

    /// Pool or confirmation state of a transaction.
    async fn pending_transaction(&self, txid: &str) -> Result<PendingTransaction, AnchoringError>;

    /// Current node status.
    async fn status(&self) -> Result<NodeStatus, AnchoringError>;

    /// Block until a round after `round` exists.
    async fn wait_for_block_after(&self, round: u64) -> Result<NodeStatus, AnchoringError>;

    /// Value of box `name` of application `app_id`; `None` if the box does not exist.
    async fn application_box(&self, app_id: u64, name: &[u8])
        -> Result<Option<Vec<u8>>, AnchoringError>;

    /// Compile TEAL source into program bytes.
    async fn compile(&self, source: &str) -> Result<Vec<u8>, AnchoringError>;

    /// Balance summary of `address`.
    async fn account_info(&self, address: &Address) -> Result<AccountInfo, AnchoringError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_parse_from_node_json() {
        let json = r#"{
            "consensus-version": "future",
            "fee": 0,
            "genesis-hash": "SGO1GKSzyE7IEPItTxCByw9x8FmnrCDexi9/cOUJOiI=",
            "genesis-id": "testnet-v1.0",
            "last-round": 1000,
            "min-fee": 1000
        }"#;
        let params: TransactionParams = serde_json::from_str(json).unwrap();
        let suggested = params.suggest().unwrap();
        assert_eq!(suggested.fee, 1000);
        assert_eq!(suggested.first_valid, 1000);
        assert_eq!(suggested.last_valid, 2000);
        assert_eq!(suggested.genesis_id, "testnet-v1.0");
        assert!(!suggested.genesis_hash.is_zero());
    }

    #[test]
    fn test_bad_genesis_hash_rejected() {
        let params = TransactionParams {
            fee: 0,
            min_fee: 1000,
            last_round: 1,
            genesis_id: "x".into(),
            genesis_hash: "AAAA".into(),
        };
        assert!(matches!(
            params.suggest(),
            Err(AnchoringError::Deserialization { .. })
        ));
    }

    #[test]
    fn test_pending_defaults_tolerate_sparse_json() {
        let p: PendingTransaction = serde_json::from_str(r#"{"pool-error": ""}"#).unwrap();
        assert_eq!(p.confirmed_round, 0);
        assert!(p.application_index.is_none());
        let p: PendingTransaction =
            serde_json::from_str(r#"{"confirmed-round": 12, "application-index": 77}"#).unwrap();
        assert_eq!(p.confirmed_round, 12);
        assert_eq!(p.application_index, Some(77));
    }
}
