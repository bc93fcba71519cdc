//! # Anchor Client
//!
//! Builds, signs, submits and confirms anchor-program transactions against
//! any [`Algod`] backend.
//!
//! ## Signing Flows
//!
//! - **Custodial**: [`AnchorClient::sign_and_send`] and
//!   [`AnchorClient::sign_and_send_group`] sign with a [`CustodialKey`] held
//!   by the caller.
//! - **Wallet**: [`AnchorClient::prepare_unsigned_txn`] returns the unsigned
//!   transaction as base64 msgpack; the wallet signs it and the result goes
//!   back through [`AnchorClient::submit_signed_txn`] untouched. No key is
//!   involved on this side.
//!
//! Nothing here resubmits a transaction. A timeout or a transport failure
//! after submission ends the attempt; a retry builds a fresh transaction.

use std::sync::Arc;

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use evanchor_core::{Hash32, IntegrityError, PackageId, ValidationError, ZERO_HASH_HEX};
use evanchor_crypto::CustodialKey;

use crate::address::Address;
use crate::algod::{Algod, PendingTransaction, SuggestedParams};
use crate::config::DEFAULT_WAIT_ROUNDS;
use crate::error::AnchoringError;
use crate::program::{
    approval_teal, box_min_balance, clear_teal, AnchorBox, ReanchorPolicy, ANCHOR_METHOD,
};
use crate::record::AttemptState;
use crate::txn::{
    assign_group_id, encode_signed_group, BoxReference, Transaction, TxType,
};

// ---------------------------------------------------------------------------
// Anchor arguments
// ---------------------------------------------------------------------------

/// Validated arguments of one anchor call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorArgs {
    /// Box name.
    pub package_id: PackageId,
    /// Package hash.
    pub package_hash: Hash32,
    /// Merkle root.
    pub merkle_root: Hash32,
    /// Unix seconds written into the box.
    pub timestamp: u64,
}

impl AnchorArgs {
    /// Validate caller input. `timestamp` defaults to now.
    ///
    /// # Errors
    ///
    /// [`ValidationError`] when the package id is empty or longer than 64
    /// bytes, or when either hash is not exactly 64 hex characters.
    pub fn new(
        package_id: &str,
        package_hash_hex: &str,
        merkle_root_hex: &str,
        timestamp: Option<u64>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            package_id: PackageId::new(package_id)?,
            package_hash: Hash32::from_hex("package_hash", package_hash_hex)?,
            merkle_root: Hash32::from_hex("merkle_root", merkle_root_hex)?,
            timestamp: timestamp.unwrap_or_else(now_unix),
        })
    }

    /// Same as [`new`](Self::new) with the all-zero merkle root when none is given.
    pub fn with_default_root(
        package_id: &str,
        package_hash_hex: &str,
        merkle_root_hex: Option<&str>,
        timestamp: Option<u64>,
    ) -> Result<Self, ValidationError> {
        Self::new(
            package_id,
            package_hash_hex,
            merkle_root_hex.unwrap_or(ZERO_HASH_HEX),
            timestamp,
        )
    }

    fn app_args(&self) -> Vec<ByteBuf> {
        vec![
            ByteBuf::from(ANCHOR_METHOD.to_vec()),
            ByteBuf::from(self.package_id.as_bytes().to_vec()),
            ByteBuf::from(self.package_hash.as_bytes().to_vec()),
            ByteBuf::from(self.merkle_root.as_bytes().to_vec()),
            ByteBuf::from(self.timestamp.to_be_bytes().to_vec()),
        ]
    }
}

fn now_unix() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

fn base_txn(params: &SuggestedParams, sender: Address, tx_type: TxType) -> Transaction {
    Transaction {
        tx_type,
        sender,
        fee: params.fee,
        first_valid: params.first_valid,
        last_valid: params.last_valid,
        genesis_id: params.genesis_id.clone(),
        genesis_hash: params.genesis_hash,
        ..Default::default()
    }
}

/// Application call that anchors `args` in `app_id`, declaring its box.
pub fn build_anchor_call(
    params: &SuggestedParams,
    sender: Address,
    app_id: u64,
    args: &AnchorArgs,
) -> Transaction {
    Transaction {
        app_id,
        app_args: args.app_args(),
        boxes: vec![BoxReference {
            app_index: 0,
            name: args.package_id.as_bytes().to_vec(),
        }],
        ..base_txn(params, sender, TxType::ApplicationCall)
    }
}

/// `[payment to the application account, anchor call]` with a shared group id.
pub fn build_funded_anchor_group(
    params: &SuggestedParams,
    sender: Address,
    app_id: u64,
    args: &AnchorArgs,
    funding_amount: u64,
) -> Result<Vec<Transaction>, AnchoringError> {
    let payment = Transaction {
        receiver: Some(Address::for_application(app_id)),
        amount: funding_amount,
        ..base_txn(params, sender, TxType::Payment)
    };
    let mut group = vec![payment, build_anchor_call(params, sender, app_id, args)];
    assign_group_id(&mut group)?;
    Ok(group)
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A confirmed submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    /// Ids of every transaction submitted, in group order.
    pub txids: Vec<String>,
    /// Round the submission was confirmed in.
    pub confirmed_round: u64,
    /// Application created by the submission, if any.
    pub application_index: Option<u64>,
}

impl Confirmation {
    /// Id of the first transaction.
    pub fn txid(&self) -> &str {
        self.txids.first().map(String::as_str).unwrap_or_default()
    }

    /// Id of the last transaction (the anchor call in a funded group).
    pub fn last_txid(&self) -> &str {
        self.txids.last().map(String::as_str).unwrap_or_default()
    }
}

/// Result of deploying the anchor program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployResult {
    /// Creation transaction id.
    pub txn_id: String,
    /// Confirmation round.
    pub confirmed_round: u64,
    /// New application id.
    pub app_id: u64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Anchor-program client over an [`Algod`] backend.
#[derive(Debug)]
pub struct AnchorClient<A> {
    algod: Arc<A>,
    wait_rounds: u64,
}

impl<A> Clone for AnchorClient<A> {
    fn clone(&self) -> Self {
        Self {
            algod: Arc::clone(&self.algod),
            wait_rounds: self.wait_rounds,
        }
    }
}

impl<A: Algod> AnchorClient<A> {
    /// Client waiting up to the default number of rounds for confirmation.
    pub fn new(algod: Arc<A>) -> Self {
        Self {
            algod,
            wait_rounds: DEFAULT_WAIT_ROUNDS,
        }
    }

    /// Override the confirmation wait.
    pub fn with_wait_rounds(mut self, rounds: u64) -> Self {
        self.wait_rounds = rounds.max(1);
        self
    }

    /// The node backend.
    pub fn algod(&self) -> &A {
        &self.algod
    }

    /// Escrow address of an application.
    pub fn application_address(&self, app_id: u64) -> Address {
        Address::for_application(app_id)
    }

    /// Fee and validity window for new transactions.
    pub async fn suggested_params(&self) -> Result<SuggestedParams, AnchoringError> {
        self.algod.transaction_params().await?.suggest()
    }

    /// Compile and create the anchor program, waiting for confirmation.
    pub async fn deploy(
        &self,
        creator: &CustodialKey,
        policy: ReanchorPolicy,
    ) -> Result<DeployResult, AnchoringError> {
        let approval = self.algod.compile(&approval_teal(policy)).await?;
        let clear = self.algod.compile(clear_teal()).await?;
        let params = self.suggested_params().await?;
        let txn = Transaction {
            approval_program: approval,
            clear_program: clear,
            ..base_txn(
                &params,
                Address::from_public_key(creator.public_key()),
                TxType::ApplicationCall,
            )
        };
        let confirmation = self.sign_and_send(txn, creator).await?;
        let app_id = confirmation
            .application_index
            .ok_or_else(|| AnchoringError::Deserialization {
                endpoint: format!("GET /v2/transactions/pending/{}", confirmation.txid()),
                message: "confirmed creation without application-index".into(),
            })?;
        tracing::info!(app_id, %policy, round = confirmation.confirmed_round, "anchor program deployed");
        Ok(DeployResult {
            txn_id: confirmation.txid().to_string(),
            confirmed_round: confirmation.confirmed_round,
            app_id,
        })
    }

    /// Sign one transaction with the custodial key, submit, and wait.
    pub async fn sign_and_send(
        &self,
        txn: Transaction,
        key: &CustodialKey,
    ) -> Result<Confirmation, AnchoringError> {
        self.sign_and_send_group(vec![txn], key).await
    }

    /// Sign every transaction of a group, submit it atomically, and wait.
    pub async fn sign_and_send_group(
        &self,
        txns: Vec<Transaction>,
        key: &CustodialKey,
    ) -> Result<Confirmation, AnchoringError> {
        let signed = txns
            .into_iter()
            .map(|t| t.sign(key))
            .collect::<Result<Vec<_>, _>>()?;
        let txids = signed
            .iter()
            .map(|s| s.id())
            .collect::<Result<Vec<_>, _>>()?;
        let blob = encode_signed_group(&signed)?;
        self.submit_and_confirm(&blob, txids).await
    }

    /// Base64 msgpack of an unsigned anchor call, for wallet signing.
    pub async fn prepare_unsigned_txn(
        &self,
        sender: Address,
        app_id: u64,
        args: &AnchorArgs,
    ) -> Result<String, AnchoringError> {
        let params = self.suggested_params().await?;
        build_anchor_call(&params, sender, app_id, args).to_base64()
    }

    /// Submit externally signed bytes (base64) exactly as given, and wait.
    pub async fn submit_signed_txn(&self, signed_b64: &str) -> Result<Confirmation, AnchoringError> {
        let blob = base64::engine::general_purpose::STANDARD
            .decode(signed_b64.trim())
            .map_err(|e| AnchoringError::Encoding(format!("signed transaction is not base64: {e}")))?;
        let txids = crate::txn::decode_signed_group(&blob)?
            .iter()
            .map(|s| s.id())
            .collect::<Result<Vec<_>, _>>()?;
        self.submit_and_confirm(&blob, txids).await
    }

    async fn submit_and_confirm(
        &self,
        blob: &[u8],
        txids: Vec<String>,
    ) -> Result<Confirmation, AnchoringError> {
        let mut attempt = AttemptState::Prepared;
        let txid = match self.algod.send_raw_transaction(blob).await {
            Ok(txid) => txid,
            Err(e) => {
                let state = attempt.fail(e.to_string())?;
                tracing::warn!(?state, "anchor submission failed");
                return Err(e);
            }
        };
        attempt = attempt.submit(txid.clone())?;
        tracing::info!(%txid, txns = txids.len(), "transaction submitted");

        match self.wait_for_confirmation(&txid, self.wait_rounds).await {
            Ok(pending) => {
                attempt = attempt.confirm(pending.confirmed_round)?;
                tracing::info!(%txid, round = pending.confirmed_round, state = ?attempt.status(), "transaction confirmed");
                Ok(Confirmation {
                    txids,
                    confirmed_round: pending.confirmed_round,
                    application_index: pending.application_index,
                })
            }
            Err(e) => {
                let state = attempt.fail(e.to_string())?;
                tracing::warn!(%txid, ?state, "transaction not confirmed");
                Err(e)
            }
        }
    }

    /// Poll until `txid` is confirmed, rejected, or `max_rounds` pass.
    pub async fn wait_for_confirmation(
        &self,
        txid: &str,
        max_rounds: u64,
    ) -> Result<PendingTransaction, AnchoringError> {
        let start = self.algod.status().await?.last_round;
        let mut round = start;
        while round < start + max_rounds {
            let pending = self.algod.pending_transaction(txid).await?;
            if pending.confirmed_round > 0 {
                return Ok(pending);
            }
            if !pending.pool_error.is_empty() {
                return Err(AnchoringError::Rejected {
                    txid: txid.to_string(),
                    message: pending.pool_error,
                });
            }
            let next = self.algod.wait_for_block_after(round).await?.last_round;
            round = next.max(round + 1);
        }
        Err(AnchoringError::ConfirmationTimeout {
            txid: txid.to_string(),
            rounds: max_rounds,
        })
    }

    /// Read and decode the anchor box of `package_id`.
    ///
    /// # Errors
    ///
    /// [`IntegrityError::MissingBox`] when no box exists,
    /// [`IntegrityError::MalformedBox`] when it is not 104 bytes.
    pub async fn read_anchor_box(
        &self,
        app_id: u64,
        package_id: &str,
    ) -> Result<AnchorBox, AnchoringError> {
        let id = PackageId::new(package_id)?;
        let value = self
            .algod
            .application_box(app_id, id.as_bytes())
            .await?
            .ok_or_else(|| IntegrityError::MissingBox {
                app_id,
                package_id: package_id.to_string(),
            })?;
        Ok(AnchorBox::decode(package_id, &value)?)
    }

    /// Microalgos the application account lacks to store the box of
    /// `package_id`. Zero when already sufficient or the box exists.
    pub async fn app_funding_shortfall(
        &self,
        app_id: u64,
        package_id: &str,
    ) -> Result<u64, AnchoringError> {
        let id = PackageId::new(package_id)?;
        if self.algod.application_box(app_id, id.as_bytes()).await?.is_some() {
            return Ok(0);
        }
        let account = self
            .algod
            .account_info(&self.application_address(app_id))
            .await?;
        let required = account.min_balance + box_min_balance(id.as_bytes().len());
        Ok(required.saturating_sub(account.amount))
    }
}
