//! # evanchor-chain: Ledger Anchoring for evanchor
//!
//! Anchors a package hash and its evidence Merkle root in the box storage of
//! an Algorand application, one 104-byte box per package id.
//!
//! ## Layers
//!
//! - [`program`]: the anchor program (TEAL source, box layout, and a Rust
//!   evaluator of the same rules).
//! - [`txn`] and [`address`]: canonical msgpack transactions, ids, group
//!   ids and addresses.
//! - [`algod`]: the node trait, implemented over HTTP by [`HttpAlgod`] and in
//!   memory by [`SimulatedLedger`].
//! - [`client`]: building, signing (custodial or wallet), submitting and
//!   confirming anchor transactions.
//! - [`service`]: package-level anchoring and verification.

pub mod address;
pub mod algod;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod program;
pub mod record;
mod retry;
pub mod service;
pub mod sim;
pub mod txn;

pub use address::{Address, Digest32};
pub use algod::{
    AccountInfo, Algod, CompiledProgram, NodeStatus, PendingTransaction, SuggestedParams,
    TransactionParams,
};
pub use client::{
    build_anchor_call, build_funded_anchor_group, AnchorArgs, AnchorClient, Confirmation,
    DeployResult,
};
pub use config::{AnchorConfig, ConfigError};
pub use error::AnchoringError;
pub use http::HttpAlgod;
pub use program::{AnchorBox, ReanchorPolicy, ANCHOR_BOX_LEN};
pub use record::{
    anchor_id, batch_box_id, batch_manifest_hash, AnchorOutput, AnchorPackageRequest,
    AnchorRecord, AnchorStatus, AnchorStatusReport, AttemptState, BatchPackage, CostEstimate,
    Network, BLOCKCHAIN,
};
pub use service::{join_anchor, AnchorService, AnchorVerification};
pub use sim::SimulatedLedger;
pub use txn::{SignedTransaction, Transaction};
