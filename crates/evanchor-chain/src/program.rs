//! # Anchor Program
//!
//! The on-chain application that stores one 104-byte box per package id:
//!
//! ```text
//! package_hash (32) || merkle_root (32) || timestamp (8, big-endian) || caller (32)
//! ```
//!
//! The program is emitted as TEAL v8 source ([`approval_teal`],
//! [`clear_teal`]) and compiled by the node at deploy time. [`evaluate`]
//! mirrors the same approval logic in Rust for the simulated ledger and for
//! pre-flight checks, so both sides agree on what a call does.
//!
//! ## Calls
//!
//! | Call      | Args                                       | Effect                  |
//! |-----------|--------------------------------------------|-------------------------|
//! | create    | none                                       | approved, no state      |
//! | anchor    | `"anchor", id, hash(32), root(32), ts(8)`  | box `id` := layout      |
//! | read      | `"read", id`                               | approved, no effect     |
//! | opt-in, update, delete, close-out, anything else | | rejected                |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use evanchor_core::{IntegrityError, MAX_PACKAGE_ID_LEN};

use crate::address::Address;
use crate::txn::OnCompletion;

/// Size of an anchor box value in bytes.
pub const ANCHOR_BOX_LEN: usize = 104;

/// Minimum balance of an application account with no boxes, in microalgos.
pub const APP_ACCOUNT_MIN_BALANCE: u64 = 100_000;

const BOX_FLAT_MIN_BALANCE: u64 = 2_500;
const BOX_BYTE_MIN_BALANCE: u64 = 400;

/// First application argument of an anchor call.
pub const ANCHOR_METHOD: &[u8] = b"anchor";
/// First application argument of a read call.
pub const READ_METHOD: &[u8] = b"read";

/// Minimum balance one anchor box adds to the application account.
pub fn box_min_balance(name_len: usize) -> u64 {
    BOX_FLAT_MIN_BALANCE + BOX_BYTE_MIN_BALANCE * (name_len as u64 + ANCHOR_BOX_LEN as u64)
}

// ---------------------------------------------------------------------------
// Re-anchor policy
// ---------------------------------------------------------------------------

/// What an anchor call does when the package already has a box.
///
/// Fixed at deploy time by the program variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReanchorPolicy {
    /// Last write wins.
    #[default]
    Overwrite,
    /// Append-only: a second anchor for the same package is rejected.
    RejectExisting,
}

impl ReanchorPolicy {
    /// Configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overwrite => "overwrite",
            Self::RejectExisting => "reject-existing",
        }
    }
}

impl fmt::Display for ReanchorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReanchorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "reject-existing" | "reject_existing" => Ok(Self::RejectExisting),
            other => Err(format!(
                "unknown re-anchor policy \"{other}\" (expected overwrite or reject-existing)"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// TEAL source
// ---------------------------------------------------------------------------

/// TEAL v8 approval program for `policy`.
pub fn approval_teal(policy: ReanchorPolicy) -> String {
    let guard = match policy {
        ReanchorPolicy::Overwrite => "",
        ReanchorPolicy::RejectExisting => {
            "txna ApplicationArgs 1\nbox_len\n!\nassert\npop\n"
        }
    };
    format!(
        "#pragma version 8
txn OnCompletion
int OptIn
==
bnz reject
txn ApplicationID
int 0
==
bnz approve
txn OnCompletion
int UpdateApplication
==
bnz reject
txn OnCompletion
int DeleteApplication
==
bnz reject
txn OnCompletion
int NoOp
==
bz reject
txn NumAppArgs
int 5
==
bnz anchor
txn NumAppArgs
int 2
==
bnz read
b reject
anchor:
txna ApplicationArgs 0
byte \"anchor\"
==
assert
txna ApplicationArgs 1
len
int 0
>
assert
txna ApplicationArgs 1
len
int {max_id}
<=
assert
txna ApplicationArgs 2
len
int 32
==
assert
txna ApplicationArgs 3
len
int 32
==
assert
txna ApplicationArgs 4
len
int 8
==
assert
{guard}txna ApplicationArgs 1
txna ApplicationArgs 2
txna ApplicationArgs 3
concat
txna ApplicationArgs 4
concat
txn Sender
concat
box_put
b approve
read:
txna ApplicationArgs 0
byte \"read\"
==
assert
b approve
approve:
int 1
return
reject:
int 0
return
",
        max_id = MAX_PACKAGE_ID_LEN,
    )
}

/// TEAL v8 clear-state program: always approves.
pub fn clear_teal() -> &'static str {
    "#pragma version 8\nint 1\nreturn\n"
}

/// Identify which policy variant a program source implements.
pub fn policy_of_source(source: &[u8]) -> Option<ReanchorPolicy> {
    [ReanchorPolicy::Overwrite, ReanchorPolicy::RejectExisting]
        .into_iter()
        .find(|p| approval_teal(*p).as_bytes() == source)
}

// ---------------------------------------------------------------------------
// Box layout
// ---------------------------------------------------------------------------

/// Decoded anchor box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorBox {
    /// Hash of the anchored package.
    pub package_hash: [u8; 32],
    /// Merkle root of the package's evidence.
    pub merkle_root: [u8; 32],
    /// Caller-supplied unix timestamp.
    pub timestamp: u64,
    /// Account that sent the anchor call.
    pub anchored_by: Address,
}

impl AnchorBox {
    /// 104-byte box value.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ANCHOR_BOX_LEN);
        out.extend_from_slice(&self.package_hash);
        out.extend_from_slice(&self.merkle_root);
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(self.anchored_by.as_bytes());
        out
    }

    /// Parse a box value. Anything other than exactly 104 bytes is malformed.
    pub fn decode(package_id: &str, value: &[u8]) -> Result<Self, IntegrityError> {
        if value.len() != ANCHOR_BOX_LEN {
            return Err(IntegrityError::MalformedBox {
                package_id: package_id.to_string(),
                expected: ANCHOR_BOX_LEN,
                actual: value.len(),
            });
        }
        let mut package_hash = [0u8; 32];
        let mut merkle_root = [0u8; 32];
        let mut ts = [0u8; 8];
        let mut sender = [0u8; 32];
        package_hash.copy_from_slice(&value[0..32]);
        merkle_root.copy_from_slice(&value[32..64]);
        ts.copy_from_slice(&value[64..72]);
        sender.copy_from_slice(&value[72..104]);
        Ok(Self {
            package_hash,
            merkle_root,
            timestamp: u64::from_be_bytes(ts),
            anchored_by: Address(sender),
        })
    }

    /// Package hash as lowercase hex.
    pub fn package_hash_hex(&self) -> String {
        hex::encode(self.package_hash)
    }

    /// Merkle root as lowercase hex.
    pub fn merkle_root_hex(&self) -> String {
        hex::encode(self.merkle_root)
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// An application call as seen by the approval program.
#[derive(Debug, Clone, Copy)]
pub struct AppCall<'a> {
    /// Called application; 0 while creating.
    pub app_id: u64,
    /// Completion action.
    pub on_completion: OnCompletion,
    /// Application arguments.
    pub args: &'a [&'a [u8]],
    /// Sender of the call.
    pub sender: Address,
}

/// State change an approved call makes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Approved with no state change.
    None,
    /// Approved; write `value` into box `name`.
    BoxPut {
        /// Box name (the package id).
        name: Vec<u8>,
        /// 104-byte box value.
        value: Vec<u8>,
    },
}

/// The approval program rejected the call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("logic eval error: {0}")]
pub struct ProgramRejection(pub String);

fn reject(reason: impl Into<String>) -> Result<Effect, ProgramRejection> {
    Err(ProgramRejection(reason.into()))
}

/// Run the approval logic for `call` under `policy`.
///
/// `box_exists` answers whether the application already holds a box of the
/// given name.
pub fn evaluate(
    policy: ReanchorPolicy,
    call: &AppCall<'_>,
    box_exists: impl Fn(&[u8]) -> bool,
) -> Result<Effect, ProgramRejection> {
    match call.on_completion {
        OnCompletion::OptIn => return reject("opt-in not allowed"),
        _ if call.app_id == 0 => return Ok(Effect::None),
        OnCompletion::UpdateApplication => return reject("update not allowed"),
        OnCompletion::DeleteApplication => return reject("delete not allowed"),
        OnCompletion::NoOp => {}
        other => return reject(format!("{other:?} not allowed")),
    }

    match *call.args {
        [method, id, hash, root, ts] => {
            if method != ANCHOR_METHOD {
                return reject("unknown method");
            }
            if id.is_empty() || id.len() > MAX_PACKAGE_ID_LEN {
                return reject(format!("package id length {}", id.len()));
            }
            if hash.len() != 32 || root.len() != 32 || ts.len() != 8 {
                return reject("argument length mismatch");
            }
            if policy == ReanchorPolicy::RejectExisting && box_exists(id) {
                return reject("package already anchored");
            }
            let mut value = Vec::with_capacity(ANCHOR_BOX_LEN);
            value.extend_from_slice(hash);
            value.extend_from_slice(root);
            value.extend_from_slice(ts);
            value.extend_from_slice(call.sender.as_bytes());
            Ok(Effect::BoxPut {
                name: id.to_vec(),
                value,
            })
        }
        [method, _] => {
            if method != READ_METHOD {
                return reject("unknown method");
            }
            Ok(Effect::None)
        }
        _ => reject(format!("unexpected argument count {}", call.args.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENDER: Address = Address([7u8; 32]);

    fn call<'a>(args: &'a [&'a [u8]]) -> AppCall<'a> {
        AppCall {
            app_id: 5,
            on_completion: OnCompletion::NoOp,
            args,
            sender: SENDER,
        }
    }

    fn anchor_args() -> [Vec<u8>; 5] {
        [
            ANCHOR_METHOD.to_vec(),
            b"pkg_1".to_vec(),
            vec![1u8; 32],
            vec![2u8; 32],
            42u64.to_be_bytes().to_vec(),
        ]
    }

    #[test]
    fn test_anchor_writes_layout() {
        let owned = anchor_args();
        let args: Vec<&[u8]> = owned.iter().map(Vec::as_slice).collect();
        let effect = evaluate(ReanchorPolicy::Overwrite, &call(&args), |_| true).unwrap();
        let Effect::BoxPut { name, value } = effect else {
            panic!("expected box write");
        };
        assert_eq!(name, b"pkg_1");
        let decoded = AnchorBox::decode("pkg_1", &value).unwrap();
        assert_eq!(decoded.package_hash, [1u8; 32]);
        assert_eq!(decoded.merkle_root, [2u8; 32]);
        assert_eq!(decoded.timestamp, 42);
        assert_eq!(decoded.anchored_by, SENDER);
        assert_eq!(decoded.encode(), value);
    }

    #[test]
    fn test_anchor_rejects_bad_lengths() {
        let mut owned = anchor_args();
        owned[2] = vec![1u8; 31];
        let args: Vec<&[u8]> = owned.iter().map(Vec::as_slice).collect();
        assert!(evaluate(ReanchorPolicy::Overwrite, &call(&args), |_| false).is_err());

        let mut owned = anchor_args();
        owned[4] = vec![0u8; 4];
        let args: Vec<&[u8]> = owned.iter().map(Vec::as_slice).collect();
        assert!(evaluate(ReanchorPolicy::Overwrite, &call(&args), |_| false).is_err());

        let mut owned = anchor_args();
        owned[1] = vec![b'x'; 65];
        let args: Vec<&[u8]> = owned.iter().map(Vec::as_slice).collect();
        assert!(evaluate(ReanchorPolicy::Overwrite, &call(&args), |_| false).is_err());

        let mut owned = anchor_args();
        owned[1] = vec![b'x'; 64];
        let args: Vec<&[u8]> = owned.iter().map(Vec::as_slice).collect();
        assert!(evaluate(ReanchorPolicy::Overwrite, &call(&args), |_| false).is_ok());
    }

    #[test]
    fn test_reject_existing_policy() {
        let owned = anchor_args();
        let args: Vec<&[u8]> = owned.iter().map(Vec::as_slice).collect();
        assert!(evaluate(ReanchorPolicy::RejectExisting, &call(&args), |_| false).is_ok());
        let err = evaluate(ReanchorPolicy::RejectExisting, &call(&args), |_| true).unwrap_err();
        assert!(err.0.contains("already anchored"));
    }

    #[test]
    fn test_read_and_other_arg_counts() {
        let read: [&[u8]; 2] = [READ_METHOD, b"pkg"];
        assert_eq!(
            evaluate(ReanchorPolicy::Overwrite, &call(&read), |_| false).unwrap(),
            Effect::None
        );
        let wrong: [&[u8]; 2] = [b"write", b"pkg"];
        assert!(evaluate(ReanchorPolicy::Overwrite, &call(&wrong), |_| false).is_err());
        let three: [&[u8]; 3] = [b"anchor", b"a", b"b"];
        assert!(evaluate(ReanchorPolicy::Overwrite, &call(&three), |_| false).is_err());
        assert!(evaluate(ReanchorPolicy::Overwrite, &call(&[]), |_| false).is_err());
    }

    #[test]
    fn test_lifecycle_calls() {
        let none: [&[u8]; 0] = [];
        let create = AppCall {
            app_id: 0,
            ..call(&none)
        };
        assert_eq!(
            evaluate(ReanchorPolicy::Overwrite, &create, |_| false).unwrap(),
            Effect::None
        );
        for oc in [
            OnCompletion::OptIn,
            OnCompletion::UpdateApplication,
            OnCompletion::DeleteApplication,
            OnCompletion::CloseOut,
        ] {
            let c = AppCall {
                on_completion: oc,
                ..call(&none)
            };
            assert!(evaluate(ReanchorPolicy::Overwrite, &c, |_| false).is_err(), "{oc:?}");
        }
        let optin_create = AppCall {
            app_id: 0,
            on_completion: OnCompletion::OptIn,
            ..call(&none)
        };
        assert!(evaluate(ReanchorPolicy::Overwrite, &optin_create, |_| false).is_err());
    }

    #[test]
    fn test_malformed_box_sizes() {
        for len in [0usize, 103, 105] {
            let err = AnchorBox::decode("p", &vec![0u8; len]).unwrap_err();
            assert!(matches!(
                err,
                IntegrityError::MalformedBox { expected: 104, actual, .. } if actual == len
            ));
        }
    }

    #[test]
    fn test_box_min_balance_formula() {
        assert_eq!(box_min_balance(12), 2_500 + 400 * 116);
        assert_eq!(box_min_balance(64), 2_500 + 400 * 168);
    }

    #[test]
    fn test_teal_variants_differ_only_by_guard() {
        let lww = approval_teal(ReanchorPolicy::Overwrite);
        let strict = approval_teal(ReanchorPolicy::RejectExisting);
        assert!(lww.starts_with("#pragma version 8"));
        assert!(!lww.contains("box_len"));
        assert!(strict.contains("box_len\n!\nassert\npop"));
        assert!(lww.contains("int 64\n<="));
        assert_eq!(policy_of_source(lww.as_bytes()), Some(ReanchorPolicy::Overwrite));
        assert_eq!(
            policy_of_source(strict.as_bytes()),
            Some(ReanchorPolicy::RejectExisting)
        );
        assert_eq!(policy_of_source(clear_teal().as_bytes()), None);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("overwrite".parse(), Ok(ReanchorPolicy::Overwrite));
        assert_eq!("Reject-Existing".parse(), Ok(ReanchorPolicy::RejectExisting));
        assert!("append".parse::<ReanchorPolicy>().is_err());
        assert_eq!(ReanchorPolicy::default(), ReanchorPolicy::Overwrite);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn anchor_accepts_exactly_box_name_lengths(
                id in proptest::collection::vec(any::<u8>(), 0..80),
                hash in any::<[u8; 32]>(),
                root in any::<[u8; 32]>(),
                ts in any::<u64>(),
            ) {
                let ts = ts.to_be_bytes();
                let args: [&[u8]; 5] = [ANCHOR_METHOD, &id, &hash, &root, &ts];
                let result = evaluate(ReanchorPolicy::Overwrite, &call(&args), |_| false);
                if id.is_empty() || id.len() > MAX_PACKAGE_ID_LEN {
                    prop_assert!(result.is_err());
                } else {
                    let Ok(Effect::BoxPut { name, value }) = result else {
                        return Err(TestCaseError::fail("expected box write"));
                    };
                    prop_assert_eq!(name, id);
                    prop_assert_eq!(value.len(), ANCHOR_BOX_LEN);
                    let decoded = AnchorBox::decode("p", &value).unwrap();
                    prop_assert_eq!(decoded.timestamp, u64::from_be_bytes(ts));
                }
            }
        }
    }
}
