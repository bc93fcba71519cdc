//! # Ledger Addresses and Digests
//!
//! An account address is the 32-byte Ed25519 public key. Its text form is
//! base32 (RFC 4648 alphabet, no padding) of `pubkey || checksum`, where the
//! checksum is the last 4 bytes of `SHA-512/256(pubkey)`: 58 characters.
//!
//! Application accounts have no key; their address is
//! `SHA-512/256("appID" || app_id as 8 big-endian bytes)`.
//!
//! Both [`Address`] and [`Digest32`] serialize as raw bytes, which is what
//! the msgpack transaction encoding needs.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_bytes::ByteBuf;
use sha2::{Digest, Sha512_256};

use evanchor_core::ValidationError;

const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
const CHECKSUM_LEN: usize = 4;

/// Length of an address in text form.
pub const ADDRESS_LEN: usize = 58;

// ---------------------------------------------------------------------------
// Hashing and base32 helpers
// ---------------------------------------------------------------------------

/// SHA-512/256 over the concatenation of `parts`.
pub fn sha512_256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha512_256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Base32 without padding.
pub fn base32_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;
    for &b in bytes {
        buffer = (buffer << 8) | u32::from(b);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

/// Decode unpadded base32. Trailing bits that do not fill a byte must be zero.
pub fn base32_decode(s: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(s.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;
    for c in s.bytes() {
        let v = ALPHABET.iter().position(|&a| a == c)? as u32;
        buffer = (buffer << 5) | v;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
        }
        buffer &= (1 << bits) - 1;
    }
    if buffer != 0 {
        return None;
    }
    Some(out)
}

fn bytes32<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
    let buf = ByteBuf::deserialize(d)?;
    buf.as_slice()
        .try_into()
        .map_err(|_| serde::de::Error::invalid_length(buf.len(), &"32 bytes"))
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A ledger account address (the raw public key).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Address(pub [u8; 32]);

impl Address {
    /// Address of an Ed25519 public key.
    pub fn from_public_key(public_key: [u8; 32]) -> Self {
        Self(public_key)
    }

    /// Escrow address of an application account.
    pub fn for_application(app_id: u64) -> Self {
        Self(sha512_256(&[b"appID", &app_id.to_be_bytes()]))
    }

    /// Text form: base32 of key and checksum.
    pub fn encode(&self) -> String {
        let checksum = sha512_256(&[&self.0]);
        let mut buf = Vec::with_capacity(32 + CHECKSUM_LEN);
        buf.extend_from_slice(&self.0);
        buf.extend_from_slice(&checksum[32 - CHECKSUM_LEN..]);
        base32_encode(&buf)
    }

    /// Parse the text form, verifying the checksum.
    pub fn decode(s: &str) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidAddress {
            value: s.to_string(),
            reason: reason.to_string(),
        };
        if s.len() != ADDRESS_LEN {
            return Err(invalid("expected 58 characters"));
        }
        let bytes = base32_decode(s).ok_or_else(|| invalid("not base32"))?;
        if bytes.len() != 32 + CHECKSUM_LEN {
            return Err(invalid("wrong decoded length"));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes[..32]);
        let checksum = sha512_256(&[&key]);
        if bytes[32..] != checksum[32 - CHECKSUM_LEN..] {
            return Err(invalid("checksum mismatch"));
        }
        Ok(Self(key))
    }

    /// Raw public key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({})", self.encode())
    }
}

impl std::str::FromStr for Address {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        bytes32(deserializer).map(Self)
    }
}

// ---------------------------------------------------------------------------
// Digest32
// ---------------------------------------------------------------------------

/// A 32-byte digest carried in transactions (genesis hash, group id).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Digest32(pub [u8; 32]);

impl Digest32 {
    /// True for the all-zero digest.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Standard base64 text form.
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    /// Parse standard base64 into exactly 32 bytes.
    pub fn from_base64(s: &str) -> Option<Self> {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD.decode(s).ok()?;
        bytes.as_slice().try_into().ok().map(Self)
    }
}

impl std::fmt::Debug for Digest32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Digest32({})", self.to_base64())
    }
}

impl Serialize for Digest32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Digest32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        bytes32(deserializer).map(Self)
    }
}
