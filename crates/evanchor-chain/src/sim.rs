//! # Simulated Ledger
//!
//! In-memory [`Algod`] backend that enforces the ledger rules the anchor
//! flow relies on: signatures, group ids, validity windows, fees, minimum
//! balances, box declarations and the anchor program itself (through
//! [`evaluate`](crate::program::evaluate)).
//!
//! A submitted group is applied to a copy of the state and committed only if
//! every transaction succeeds, so a rejected app call also rolls back the
//! payment grouped with it. Each accepted submission produces one block.
//!
//! "Compiling" returns the TEAL source bytes unchanged; application creation
//! recognises the anchor program variants by their source.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::address::{sha512_256, Address, Digest32};
use crate::algod::{
    AccountInfo, Algod, NodeStatus, PendingTransaction, TransactionParams,
};
use crate::error::AnchoringError;
use crate::program::{
    box_min_balance, evaluate, policy_of_source, AppCall, Effect, ReanchorPolicy,
    APP_ACCOUNT_MIN_BALANCE,
};
use crate::txn::{compute_group_id, decode_signed_group, SignedTransaction, TxType};

/// Minimum balance of a regular account.
pub const ACCOUNT_MIN_BALANCE: u64 = 100_000;

/// Flat minimum fee charged by the simulated ledger.
pub const SIM_MIN_FEE: u64 = 1_000;

/// Genesis id of the simulated ledger.
pub const SIM_GENESIS_ID: &str = "evanchor-sim-v1";

#[derive(Debug, Clone)]
struct App {
    policy: ReanchorPolicy,
    address: Address,
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    round: u64,
    next_app_id: u64,
    balances: HashMap<Address, u64>,
    apps: BTreeMap<u64, App>,
    boxes: HashMap<(u64, Vec<u8>), Vec<u8>>,
    transactions: HashMap<String, PendingTransaction>,
}

impl LedgerState {
    fn balance(&self, address: &Address) -> u64 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    fn min_balance(&self, address: &Address) -> u64 {
        let Some((app_id, _)) = self.apps.iter().find(|(_, app)| &app.address == address) else {
            return ACCOUNT_MIN_BALANCE;
        };
        let boxes: u64 = self
            .boxes
            .keys()
            .filter(|(id, _)| id == app_id)
            .map(|(_, name)| box_min_balance(name.len()))
            .sum();
        APP_ACCOUNT_MIN_BALANCE + boxes
    }

    fn debit(&mut self, address: &Address, amount: u64) -> Result<(), String> {
        let balance = self.balance(address);
        let remaining = balance
            .checked_sub(amount)
            .ok_or_else(|| format!("overspend: {address} has {balance}, needs {amount}"))?;
        self.balances.insert(*address, remaining);
        Ok(())
    }

    fn credit(&mut self, address: &Address, amount: u64) {
        *self.balances.entry(*address).or_insert(0) += amount;
    }
}

/// In-memory ledger implementing [`Algod`].
#[derive(Debug)]
pub struct SimulatedLedger {
    state: Mutex<LedgerState>,
    genesis_hash: Digest32,
    hold_pending: AtomicBool,
}

impl Default for SimulatedLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedLedger {
    /// Empty ledger at round 1.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState {
                round: 1,
                next_app_id: 1_000,
                ..LedgerState::default()
            }),
            genesis_hash: Digest32(sha512_256(&[SIM_GENESIS_ID.as_bytes()])),
            hold_pending: AtomicBool::new(false),
        }
    }

    /// Credit `amount` microalgos to `address`.
    pub fn fund(&self, address: &Address, amount: u64) {
        self.state.lock().credit(address, amount);
    }

    /// Balance of `address`.
    pub fn balance(&self, address: &Address) -> u64 {
        self.state.lock().balance(address)
    }

    /// Current round.
    pub fn round(&self) -> u64 {
        self.state.lock().round
    }

    /// Write a box directly, bypassing the program.
    pub fn put_raw_box(&self, app_id: u64, name: &[u8], value: Vec<u8>) {
        self.state.lock().boxes.insert((app_id, name.to_vec()), value);
    }

    /// When set, accepted submissions stay in the pool and never confirm.
    pub fn set_hold_pending(&self, hold: bool) {
        self.hold_pending.store(hold, Ordering::SeqCst);
    }

    /// Re-anchor policy of a deployed application.
    pub fn app_policy(&self, app_id: u64) -> Option<ReanchorPolicy> {
        self.state.lock().apps.get(&app_id).map(|a| a.policy)
    }

    fn check_group(&self, group: &[SignedTransaction], next_round: u64) -> Result<(), String> {
        for stx in group {
            stx.verify().map_err(|e| format!("signature: {e}"))?;
            let txn = &stx.txn;
            if txn.genesis_hash != self.genesis_hash {
                return Err("genesis hash mismatch".into());
            }
            if txn.fee < SIM_MIN_FEE {
                return Err(format!("fee {} below minimum {SIM_MIN_FEE}", txn.fee));
            }
            if next_round < txn.first_valid || next_round > txn.last_valid {
                return Err(format!(
                    "round {next_round} outside validity window [{}, {}]",
                    txn.first_valid, txn.last_valid
                ));
            }
        }
        let txns: Vec<_> = group.iter().map(|s| s.txn.clone()).collect();
        let expected = compute_group_id(&txns).map_err(|e| e.to_string())?;
        let consistent = if group.len() == 1 {
            txns[0].group.map_or(true, |g| g == expected)
        } else {
            txns.iter().all(|t| t.group == Some(expected))
        };
        if !consistent {
            return Err("group id mismatch".into());
        }
        Ok(())
    }

    fn apply(
        state: &mut LedgerState,
        stx: &SignedTransaction,
    ) -> Result<Option<u64>, String> {
        let txn = &stx.txn;
        state.debit(&txn.sender, txn.fee)?;
        match txn.tx_type {
            TxType::Payment => {
                let receiver = txn.receiver.ok_or("payment without receiver")?;
                state.debit(&txn.sender, txn.amount)?;
                state.credit(&receiver, txn.amount);
                Ok(None)
            }
            TxType::ApplicationCall if txn.app_id == 0 => {
                let policy = policy_of_source(&txn.approval_program)
                    .ok_or("approval program is not an anchor program")?;
                if txn.clear_program.is_empty() {
                    return Err("missing clear program".into());
                }
                let app_id = state.next_app_id;
                state.next_app_id += 1;
                state.apps.insert(
                    app_id,
                    App {
                        policy,
                        address: Address::for_application(app_id),
                    },
                );
                Ok(Some(app_id))
            }
            TxType::ApplicationCall => {
                let app = state
                    .apps
                    .get(&txn.app_id)
                    .cloned()
                    .ok_or_else(|| format!("application {} does not exist", txn.app_id))?;
                let args: Vec<&[u8]> = txn.app_args.iter().map(|a| a.as_slice()).collect();
                let call = AppCall {
                    app_id: txn.app_id,
                    on_completion: txn.on_completion,
                    args: &args,
                    sender: txn.sender,
                };
                let app_id = txn.app_id;
                let effect = evaluate(app.policy, &call, |name| {
                    state.boxes.contains_key(&(app_id, name.to_vec()))
                })
                .map_err(|e| e.to_string())?;
                if let Effect::BoxPut { name, value } = effect {
                    let declared = txn
                        .boxes
                        .iter()
                        .any(|b| b.app_index == 0 && b.name == name);
                    if !declared {
                        return Err("box reference not declared".into());
                    }
                    state.boxes.insert((app_id, name), value);
                }
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl Algod for SimulatedLedger {
    async fn transaction_params(&self) -> Result<TransactionParams, AnchoringError> {
        Ok(TransactionParams {
            fee: 0,
            min_fee: SIM_MIN_FEE,
            last_round: self.round(),
            genesis_id: SIM_GENESIS_ID.to_string(),
            genesis_hash: self.genesis_hash.to_base64(),
        })
    }

    async fn send_raw_transaction(&self, signed: &[u8]) -> Result<String, AnchoringError> {
        let group = decode_signed_group(signed).map_err(|e| AnchoringError::Rejected {
            txid: String::new(),
            message: e.to_string(),
        })?;
        let ids = group
            .iter()
            .map(SignedTransaction::id)
            .collect::<Result<Vec<_>, _>>()?;
        let first = ids[0].clone();
        let rejected = |message: String| {
            tracing::debug!(txid = %first, %message, "simulated ledger rejected group");
            AnchoringError::Rejected {
                txid: first.clone(),
                message,
            }
        };

        let mut state = self.state.lock();
        let next_round = state.round + 1;
        self.check_group(&group, next_round).map_err(&rejected)?;

        if self.hold_pending.load(Ordering::SeqCst) {
            for id in &ids {
                state
                    .transactions
                    .insert(id.clone(), PendingTransaction::default());
            }
            return Ok(first);
        }

        let mut draft = state.clone();
        let mut created = Vec::with_capacity(group.len());
        for stx in &group {
            created.push(Self::apply(&mut draft, stx).map_err(&rejected)?);
        }
        let mut touched: Vec<Address> = draft.balances.keys().copied().collect();
        touched.extend(
            draft
                .apps
                .iter()
                .filter(|(id, _)| draft.boxes.keys().any(|(box_app, _)| box_app == *id))
                .map(|(_, app)| app.address),
        );
        for address in touched {
            let balance = draft.balance(&address);
            let min = draft.min_balance(&address);
            let holds_boxes = min > APP_ACCOUNT_MIN_BALANCE;
            if (balance > 0 || holds_boxes) && balance < min {
                return Err(rejected(format!(
                    "balance {balance} below min {min} for {address}"
                )));
            }
        }

        draft.round = next_round;
        for (id, app_index) in ids.iter().zip(created) {
            draft.transactions.insert(
                id.clone(),
                PendingTransaction {
                    confirmed_round: next_round,
                    pool_error: String::new(),
                    application_index: app_index,
                },
            );
        }
        *state = draft;
        tracing::debug!(txid = %first, round = next_round, txns = ids.len(), "simulated block");
        Ok(first)
    }

    async fn pending_transaction(&self, txid: &str) -> Result<PendingTransaction, AnchoringError> {
        self.state
            .lock()
            .transactions
            .get(txid)
            .cloned()
            .ok_or_else(|| AnchoringError::Api {
                endpoint: format!("GET /v2/transactions/pending/{txid}"),
                status: 404,
                body: "transaction not found".into(),
            })
    }

    async fn status(&self) -> Result<NodeStatus, AnchoringError> {
        Ok(NodeStatus {
            last_round: self.round(),
        })
    }

    async fn wait_for_block_after(&self, round: u64) -> Result<NodeStatus, AnchoringError> {
        let mut state = self.state.lock();
        if state.round <= round {
            state.round = round + 1;
        }
        Ok(NodeStatus {
            last_round: state.round,
        })
    }

    async fn application_box(
        &self,
        app_id: u64,
        name: &[u8],
    ) -> Result<Option<Vec<u8>>, AnchoringError> {
        Ok(self
            .state
            .lock()
            .boxes
            .get(&(app_id, name.to_vec()))
            .cloned())
    }

    async fn compile(&self, source: &str) -> Result<Vec<u8>, AnchoringError> {
        if !source.starts_with("#pragma version") {
            return Err(AnchoringError::Compile("missing #pragma version".into()));
        }
        Ok(source.as_bytes().to_vec())
    }

    async fn account_info(&self, address: &Address) -> Result<AccountInfo, AnchoringError> {
        let state = self.state.lock();
        Ok(AccountInfo {
            amount: state.balance(address),
            min_balance: state.min_balance(address),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::Transaction;
    use evanchor_crypto::CustodialKey;

    async fn payment(ledger: &SimulatedLedger, key: &CustodialKey, to: Address, amt: u64) -> Transaction {
        let sp = ledger.transaction_params().await.unwrap().suggest().unwrap();
        Transaction {
            tx_type: TxType::Payment,
            sender: Address(key.public_key()),
            receiver: Some(to),
            amount: amt,
            fee: sp.fee,
            first_valid: sp.first_valid,
            last_valid: sp.last_valid,
            genesis_id: sp.genesis_id,
            genesis_hash: sp.genesis_hash,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_payment_moves_funds_and_advances_round() {
        let ledger = SimulatedLedger::new();
        let key = CustodialKey::from_seed(&[1u8; 32]);
        let from = Address(key.public_key());
        let to = Address([9u8; 32]);
        ledger.fund(&from, 1_000_000);

        let txn = payment(&ledger, &key, to, 200_000).await;
        let blob = txn.sign(&key).unwrap().encode().unwrap();
        let txid = ledger.send_raw_transaction(&blob).await.unwrap();

        assert_eq!(ledger.balance(&to), 200_000);
        assert_eq!(ledger.balance(&from), 1_000_000 - 200_000 - SIM_MIN_FEE);
        let pending = ledger.pending_transaction(&txid).await.unwrap();
        assert_eq!(pending.confirmed_round, 2);
        assert_eq!(ledger.round(), 2);
    }

    #[tokio::test]
    async fn test_overspend_rejected_without_state_change() {
        let ledger = SimulatedLedger::new();
        let key = CustodialKey::from_seed(&[1u8; 32]);
        let from = Address(key.public_key());
        ledger.fund(&from, 150_000);

        let txn = payment(&ledger, &key, Address([9u8; 32]), 500_000).await;
        let blob = txn.sign(&key).unwrap().encode().unwrap();
        let err = ledger.send_raw_transaction(&blob).await.unwrap_err();
        assert!(matches!(err, AnchoringError::Rejected { .. }));
        assert_eq!(ledger.balance(&from), 150_000);
        assert_eq!(ledger.round(), 1);
    }

    #[tokio::test]
    async fn test_bad_signature_rejected() {
        let ledger = SimulatedLedger::new();
        let key = CustodialKey::from_seed(&[1u8; 32]);
        ledger.fund(&Address(key.public_key()), 1_000_000);
        let txn = payment(&ledger, &key, Address([9u8; 32]), 1).await;
        let mut stx = txn.sign(&key).unwrap();
        stx.txn.amount = 2;
        let err = ledger
            .send_raw_transaction(&stx.encode().unwrap())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("signature"));
    }

    #[tokio::test]
    async fn test_expired_window_rejected() {
        let ledger = SimulatedLedger::new();
        let key = CustodialKey::from_seed(&[1u8; 32]);
        ledger.fund(&Address(key.public_key()), 1_000_000);
        let mut txn = payment(&ledger, &key, Address([9u8; 32]), 1).await;
        txn.last_valid = 1;
        let err = ledger
            .send_raw_transaction(&txn.sign(&key).unwrap().encode().unwrap())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("validity window"));
    }

    #[tokio::test]
    async fn test_held_transactions_stay_pending() {
        let ledger = SimulatedLedger::new();
        ledger.set_hold_pending(true);
        let key = CustodialKey::from_seed(&[1u8; 32]);
        ledger.fund(&Address(key.public_key()), 1_000_000);
        let txn = payment(&ledger, &key, Address([9u8; 32]), 1).await;
        let txid = ledger
            .send_raw_transaction(&txn.sign(&key).unwrap().encode().unwrap())
            .await
            .unwrap();
        assert_eq!(ledger.pending_transaction(&txid).await.unwrap().confirmed_round, 0);
        assert_eq!(ledger.balance(&Address([9u8; 32])), 0);
    }

    #[tokio::test]
    async fn test_wait_advances_round() {
        let ledger = SimulatedLedger::new();
        assert_eq!(ledger.wait_for_block_after(1).await.unwrap().last_round, 2);
        assert_eq!(ledger.wait_for_block_after(10).await.unwrap().last_round, 11);
    }

    #[tokio::test]
    async fn test_compile_requires_pragma() {
        let ledger = SimulatedLedger::new();
        assert!(ledger.compile("int 1").await.is_err());
        assert_eq!(
            ledger.compile("#pragma version 8\nint 1").await.unwrap(),
            b"#pragma version 8\nint 1"
        );
    }
}
