//! # Transaction Encoding
//!
//! Canonical msgpack form of the two transaction types the anchor flow uses:
//! payments (`pay`) and application calls (`appl`).
//!
//! ## Canonical Encoding
//!
//! Fields are serialized as a map whose keys are sorted and whose zero or
//! empty values are omitted. [`Transaction`] declares its fields in key order
//! and skips empty values, so `rmp_serde::to_vec_named` yields the canonical
//! bytes directly.
//!
//! - Transaction id: base32 of `SHA-512/256("TX" || msgpack(txn))`.
//! - Group id: `SHA-512/256("TG" || msgpack({"txlist": [id bytes...]}))`.
//! - Signature: Ed25519 over `"TX" || msgpack(txn)`.

use std::io::Cursor;

use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_bytes::ByteBuf;

use evanchor_crypto::{verify_signature, CustodialKey};

use crate::address::{base32_encode, sha512_256, Address, Digest32};
use crate::error::AnchoringError;

const TX_PREFIX: &[u8] = b"TX";
const GROUP_PREFIX: &[u8] = b"TG";

/// Maximum number of transactions in an atomic group.
pub const MAX_GROUP_SIZE: usize = 16;

fn is_zero(v: &u64) -> bool {
    *v == 0
}

fn is_zero_digest(d: &Digest32) -> bool {
    d.is_zero()
}

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxType {
    /// Payment (`pay`).
    #[default]
    Payment,
    /// Application call (`appl`).
    ApplicationCall,
}

impl TxType {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "pay",
            Self::ApplicationCall => "appl",
        }
    }
}

impl Serialize for TxType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TxType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "pay" => Ok(Self::Payment),
            "appl" => Ok(Self::ApplicationCall),
            other => Err(serde::de::Error::custom(format!(
                "unsupported transaction type \"{other}\""
            ))),
        }
    }
}

/// Application call completion action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnCompletion {
    /// Plain call.
    #[default]
    NoOp,
    /// Opt the sender in to local state.
    OptIn,
    /// Close out local state.
    CloseOut,
    /// Clear local state unconditionally.
    ClearState,
    /// Replace the programs.
    UpdateApplication,
    /// Delete the application.
    DeleteApplication,
}

impl OnCompletion {
    fn code(&self) -> u64 {
        match self {
            Self::NoOp => 0,
            Self::OptIn => 1,
            Self::CloseOut => 2,
            Self::ClearState => 3,
            Self::UpdateApplication => 4,
            Self::DeleteApplication => 5,
        }
    }

    fn is_noop(&self) -> bool {
        *self == Self::NoOp
    }
}

impl Serialize for OnCompletion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.code())
    }
}

impl<'de> Deserialize<'de> for OnCompletion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match u64::deserialize(deserializer)? {
            0 => Ok(Self::NoOp),
            1 => Ok(Self::OptIn),
            2 => Ok(Self::CloseOut),
            3 => Ok(Self::ClearState),
            4 => Ok(Self::UpdateApplication),
            5 => Ok(Self::DeleteApplication),
            n => Err(serde::de::Error::custom(format!("unknown on-completion {n}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// Box reference declared by an application call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxReference {
    /// Index into the foreign-app list; 0 is the called application.
    #[serde(rename = "i", skip_serializing_if = "is_zero")]
    pub app_index: u64,
    /// Box name.
    #[serde(rename = "n", with = "serde_bytes", skip_serializing_if = "Vec::is_empty")]
    pub name: Vec<u8>,
}

/// A payment or application-call transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Transaction {
    /// Payment amount in microalgos.
    #[serde(rename = "amt", skip_serializing_if = "is_zero")]
    pub amount: u64,
    /// Application arguments.
    #[serde(rename = "apaa", skip_serializing_if = "Vec::is_empty")]
    pub app_args: Vec<ByteBuf>,
    /// Completion action.
    #[serde(rename = "apan", skip_serializing_if = "OnCompletion::is_noop")]
    pub on_completion: OnCompletion,
    /// Approval program (creation only).
    #[serde(rename = "apap", with = "serde_bytes", skip_serializing_if = "Vec::is_empty")]
    pub approval_program: Vec<u8>,
    /// Declared box references.
    #[serde(rename = "apbx", skip_serializing_if = "Vec::is_empty")]
    pub boxes: Vec<BoxReference>,
    /// Called application; 0 creates a new one.
    #[serde(rename = "apid", skip_serializing_if = "is_zero")]
    pub app_id: u64,
    /// Clear-state program (creation only).
    #[serde(rename = "apsu", with = "serde_bytes", skip_serializing_if = "Vec::is_empty")]
    pub clear_program: Vec<u8>,
    /// Flat fee in microalgos.
    #[serde(rename = "fee", skip_serializing_if = "is_zero")]
    pub fee: u64,
    /// First valid round.
    #[serde(rename = "fv", skip_serializing_if = "is_zero")]
    pub first_valid: u64,
    /// Genesis id of the network.
    #[serde(rename = "gen", skip_serializing_if = "String::is_empty")]
    pub genesis_id: String,
    /// Genesis hash of the network.
    #[serde(rename = "gh", skip_serializing_if = "is_zero_digest")]
    pub genesis_hash: Digest32,
    /// Group id when part of an atomic group.
    #[serde(rename = "grp", skip_serializing_if = "Option::is_none")]
    pub group: Option<Digest32>,
    /// Last valid round.
    #[serde(rename = "lv", skip_serializing_if = "is_zero")]
    pub last_valid: u64,
    /// Free-form note.
    #[serde(rename = "note", with = "serde_bytes", skip_serializing_if = "Vec::is_empty")]
    pub note: Vec<u8>,
    /// Payment receiver.
    #[serde(rename = "rcv", skip_serializing_if = "Option::is_none")]
    pub receiver: Option<Address>,
    /// Sender.
    #[serde(rename = "snd")]
    pub sender: Address,
    /// Transaction type.
    #[serde(rename = "type")]
    pub tx_type: TxType,
}

impl Transaction {
    /// Canonical msgpack bytes.
    pub fn encode(&self) -> Result<Vec<u8>, AnchoringError> {
        rmp_serde::to_vec_named(self).map_err(|e| AnchoringError::Encoding(e.to_string()))
    }

    /// Decode canonical msgpack bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, AnchoringError> {
        rmp_serde::from_slice(bytes).map_err(|e| AnchoringError::Encoding(e.to_string()))
    }

    /// `"TX" || msgpack(self)`: the bytes that get signed and hashed.
    pub fn bytes_to_sign(&self) -> Result<Vec<u8>, AnchoringError> {
        let body = self.encode()?;
        let mut out = Vec::with_capacity(TX_PREFIX.len() + body.len());
        out.extend_from_slice(TX_PREFIX);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Raw 32-byte transaction id.
    pub fn raw_id(&self) -> Result<[u8; 32], AnchoringError> {
        Ok(sha512_256(&[&self.bytes_to_sign()?]))
    }

    /// Transaction id in text form (52 base32 characters).
    pub fn id(&self) -> Result<String, AnchoringError> {
        Ok(base32_encode(&self.raw_id()?))
    }

    /// Sign with the custodial key. The key must belong to the sender.
    pub fn sign(self, key: &CustodialKey) -> Result<SignedTransaction, AnchoringError> {
        if key.public_key() != self.sender.0 {
            return Err(AnchoringError::Encoding(
                "signing key does not match transaction sender".into(),
            ));
        }
        let sig = key.sign(&self.bytes_to_sign()?);
        Ok(SignedTransaction {
            sig: ByteBuf::from(sig.to_vec()),
            txn: self,
        })
    }

    /// Base64 of the canonical bytes, for wallet signing.
    pub fn to_base64(&self) -> Result<String, AnchoringError> {
        Ok(base64::engine::general_purpose::STANDARD.encode(self.encode()?))
    }
}

#[derive(Serialize)]
struct TxGroup<'a> {
    #[serde(rename = "txlist")]
    tx_list: &'a [Digest32],
}

/// Compute the group id of `txns` (ignoring any existing group field).
pub fn compute_group_id(txns: &[Transaction]) -> Result<Digest32, AnchoringError> {
    if txns.is_empty() || txns.len() > MAX_GROUP_SIZE {
        return Err(AnchoringError::Encoding(format!(
            "group must hold 1..={MAX_GROUP_SIZE} transactions, got {}",
            txns.len()
        )));
    }
    let ids = txns
        .iter()
        .map(|t| {
            let mut bare = t.clone();
            bare.group = None;
            bare.raw_id().map(Digest32)
        })
        .collect::<Result<Vec<_>, _>>()?;
    let body = rmp_serde::to_vec_named(&TxGroup { tx_list: &ids })
        .map_err(|e| AnchoringError::Encoding(e.to_string()))?;
    Ok(Digest32(sha512_256(&[GROUP_PREFIX, &body])))
}

/// Compute and set the shared group id on every transaction.
pub fn assign_group_id(txns: &mut [Transaction]) -> Result<Digest32, AnchoringError> {
    let gid = compute_group_id(txns)?;
    for t in txns.iter_mut() {
        t.group = Some(gid);
    }
    Ok(gid)
}

// ---------------------------------------------------------------------------
// Signed transaction
// ---------------------------------------------------------------------------

/// A transaction with its Ed25519 signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// 64-byte signature.
    pub sig: ByteBuf,
    /// The signed transaction.
    pub txn: Transaction,
}

impl SignedTransaction {
    /// Canonical msgpack bytes.
    pub fn encode(&self) -> Result<Vec<u8>, AnchoringError> {
        rmp_serde::to_vec_named(self).map_err(|e| AnchoringError::Encoding(e.to_string()))
    }

    /// Id of the inner transaction.
    pub fn id(&self) -> Result<String, AnchoringError> {
        self.txn.id()
    }

    /// Check the signature against the sender's key.
    pub fn verify(&self) -> Result<(), AnchoringError> {
        let sig: [u8; 64] = self
            .sig
            .as_slice()
            .try_into()
            .map_err(|_| AnchoringError::Encoding(format!("signature is {} bytes", self.sig.len())))?;
        verify_signature(&self.txn.sender.0, &self.txn.bytes_to_sign()?, &sig)?;
        Ok(())
    }
}

/// Concatenated msgpack of a signed group, as submitted to the node.
pub fn encode_signed_group(txns: &[SignedTransaction]) -> Result<Vec<u8>, AnchoringError> {
    let mut out = Vec::new();
    for t in txns {
        out.extend_from_slice(&t.encode()?);
    }
    Ok(out)
}

/// Split concatenated signed-transaction msgpack back into transactions.
pub fn decode_signed_group(bytes: &[u8]) -> Result<Vec<SignedTransaction>, AnchoringError> {
    let mut cursor = Cursor::new(bytes);
    let mut out = Vec::new();
    while (cursor.position() as usize) < bytes.len() {
        let stx: SignedTransaction = rmp_serde::from_read(&mut cursor)
            .map_err(|e| AnchoringError::Encoding(format!("signed transaction {}: {e}", out.len())))?;
        out.push(stx);
        if out.len() > MAX_GROUP_SIZE {
            return Err(AnchoringError::Encoding("too many transactions in blob".into()));
        }
    }
    if out.is_empty() {
        return Err(AnchoringError::Encoding("empty transaction blob".into()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_call(sender: Address) -> Transaction {
        Transaction {
            tx_type: TxType::ApplicationCall,
            sender,
            fee: 1000,
            first_valid: 10,
            last_valid: 1010,
            genesis_id: "testnet-v1.0".into(),
            genesis_hash: Digest32([9u8; 32]),
            app_id: 42,
            app_args: vec![ByteBuf::from(b"read".to_vec()), ByteBuf::from(b"pkg".to_vec())],
            boxes: vec![BoxReference {
                app_index: 0,
                name: b"pkg".to_vec(),
            }],
            ..Default::default()
        }
    }

    /// Keys of the top-level msgpack map, in encoded order.
    fn map_keys(bytes: &[u8]) -> Vec<String> {
        let value: rmpv::Value = rmpv::decode::read_value(&mut &bytes[..]).unwrap();
        value
            .as_map()
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_keys_are_sorted_and_empty_fields_omitted() {
        let bytes = sample_call(Address([1u8; 32])).encode().unwrap();
        let keys = map_keys(&bytes);
        assert_eq!(
            keys,
            vec!["apaa", "apbx", "apid", "fee", "fv", "gen", "gh", "lv", "snd", "type"]
        );
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_payment_keys() {
        let pay = Transaction {
            tx_type: TxType::Payment,
            sender: Address([1u8; 32]),
            receiver: Some(Address::for_application(1)),
            amount: 300_000,
            fee: 1000,
            first_valid: 1,
            last_valid: 1001,
            genesis_hash: Digest32([9u8; 32]),
            ..Default::default()
        };
        let keys = map_keys(&pay.encode().unwrap());
        assert_eq!(keys, vec!["amt", "fee", "fv", "gh", "lv", "rcv", "snd", "type"]);
    }

    #[test]
    fn test_encode_decode_preserves_transaction() {
        let txn = sample_call(Address([1u8; 32]));
        let back = Transaction::decode(&txn.encode().unwrap()).unwrap();
        assert_eq!(back, txn);
    }

    #[test]
    fn test_id_is_52_base32_chars_and_stable() {
        let txn = sample_call(Address([1u8; 32]));
        let id = txn.id().unwrap();
        assert_eq!(id.len(), 52);
        assert_eq!(id, txn.clone().id().unwrap());
        let mut other = txn;
        other.fee += 1;
        assert_ne!(other.id().unwrap(), id);
    }

    #[test]
    fn test_sign_and_verify() {
        let key = CustodialKey::from_seed(&[4u8; 32]);
        let txn = sample_call(Address(key.public_key()));
        let stx = txn.sign(&key).unwrap();
        assert_eq!(stx.sig.len(), 64);
        stx.verify().unwrap();

        let mut tampered = stx.clone();
        tampered.txn.fee = 5000;
        assert!(tampered.verify().is_err());
    }

    #[test]
    fn test_sign_refuses_foreign_sender() {
        let key = CustodialKey::from_seed(&[4u8; 32]);
        let txn = sample_call(Address([1u8; 32]));
        assert!(txn.sign(&key).is_err());
    }

    #[test]
    fn test_group_id_shared_and_order_sensitive() {
        let a = sample_call(Address([1u8; 32]));
        let mut b = sample_call(Address([1u8; 32]));
        b.fee = 2000;

        let mut group = vec![a.clone(), b.clone()];
        let gid = assign_group_id(&mut group).unwrap();
        assert!(group.iter().all(|t| t.group == Some(gid)));
        // Recomputing over already-grouped transactions yields the same id.
        assert_eq!(compute_group_id(&group).unwrap(), gid);

        let reversed = compute_group_id(&[b, a]).unwrap();
        assert_ne!(reversed, gid);
    }

    #[test]
    fn test_empty_group_rejected() {
        assert!(compute_group_id(&[]).is_err());
    }

    #[test]
    fn test_signed_group_blob_splits_back() {
        let key = CustodialKey::from_seed(&[4u8; 32]);
        let sender = Address(key.public_key());
        let mut group = vec![sample_call(sender), sample_call(sender)];
        group[1].fee = 3000;
        assign_group_id(&mut group).unwrap();
        let signed: Vec<_> = group
            .into_iter()
            .map(|t| t.sign(&key).unwrap())
            .collect();

        let blob = encode_signed_group(&signed).unwrap();
        let back = decode_signed_group(&blob).unwrap();
        assert_eq!(back, signed);
    }

    #[test]
    fn test_garbage_blob_rejected() {
        assert!(decode_signed_group(&[]).is_err());
        assert!(decode_signed_group(&[0xc1, 0x00]).is_err());
    }

    #[test]
    fn test_signed_transaction_keys() {
        let key = CustodialKey::from_seed(&[4u8; 32]);
        let stx = sample_call(Address(key.public_key())).sign(&key).unwrap();
        assert_eq!(map_keys(&stx.encode().unwrap()), vec!["sig", "txn"]);
    }
}
