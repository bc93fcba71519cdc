//! # Leaf Sealing (AES-256-GCM)
//!
//! Encrypted bundles commit to sealed content hashes instead of the hashes
//! themselves. Each hash is sealed under a fresh random 96-bit nonce; the
//! Merkle leaf is `hex(nonce || ciphertext)`. The nonce is fixed-width, so the
//! leaf splits back into its parts without a separator.

use rand_core::{OsRng, RngCore};
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const TAG_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Key
// ---------------------------------------------------------------------------

/// A 256-bit symmetric key. Zeroized on drop; `Debug` never prints it.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Wrap raw key bytes; must be exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Parse a 64-character hex key.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let mut bytes = hex::decode(s.trim()).map_err(|_| CryptoError::InvalidKeyLength(s.len() / 2))?;
        let key = Self::from_bytes(&bytes);
        bytes.zeroize();
        key
    }

    /// Generate a random key from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    fn cipher(&self) -> Result<LessSafeKey, CryptoError> {
        let unbound = UnboundKey::new(&aead::AES_256_GCM, &self.0)
            .map_err(|_| CryptoError::InvalidKeyLength(KEY_LEN))?;
        Ok(LessSafeKey::new(unbound))
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Sealed hash
// ---------------------------------------------------------------------------

/// A content hash sealed with AES-256-GCM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedHash {
    /// 96-bit nonce, unique per seal.
    #[serde(serialize_with = "ser_hex", deserialize_with = "de_nonce")]
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext with the 16-byte authentication tag appended.
    #[serde(serialize_with = "ser_hex", deserialize_with = "de_bytes")]
    pub ciphertext: Vec<u8>,
}

impl SealedHash {
    /// Merkle leaf form: `hex(nonce || ciphertext)`.
    pub fn to_leaf(&self) -> String {
        let mut buf = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        buf.extend_from_slice(&self.nonce);
        buf.extend_from_slice(&self.ciphertext);
        hex::encode(buf)
    }

    /// Split a leaf back into nonce and ciphertext.
    pub fn from_leaf(leaf: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(leaf)
            .map_err(|e| CryptoError::MalformedSealedLeaf(format!("not hex: {e}")))?;
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::MalformedSealedLeaf(format!(
                "{} bytes is shorter than nonce and tag",
                bytes.len()
            )));
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[..NONCE_LEN]);
        Ok(Self {
            nonce,
            ciphertext: bytes[NONCE_LEN..].to_vec(),
        })
    }
}

/// Seal a hex content hash under `key` with a fresh random nonce.
pub fn seal_hash(key: &EncryptionKey, plaintext_hash: &str) -> Result<SealedHash, CryptoError> {
    let cipher = key.cipher()?;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = plaintext_hash.as_bytes().to_vec();
    in_out.reserve(TAG_LEN);
    cipher
        .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::SealFailed)?;

    Ok(SealedHash {
        nonce: nonce_bytes,
        ciphertext: in_out,
    })
}

/// Open a sealed hash, returning the plaintext hex hash.
pub fn open_hash(key: &EncryptionKey, sealed: &SealedHash) -> Result<String, CryptoError> {
    let cipher = key.cipher()?;
    let nonce = Nonce::assume_unique_for_key(sealed.nonce);
    let mut in_out = sealed.ciphertext.clone();
    let plain = cipher
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::OpenFailed)?;
    String::from_utf8(plain.to_vec()).map_err(|_| CryptoError::OpenFailed)
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

fn ser_hex<S: Serializer, T: AsRef<[u8]>>(bytes: &T, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(bytes))
}

fn de_bytes<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(d)?;
    hex::decode(s).map_err(serde::de::Error::custom)
}

fn de_nonce<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; NONCE_LEN], D::Error> {
    let bytes = de_bytes(d)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| serde::de::Error::custom(format!("nonce must be {NONCE_LEN} bytes")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH_A: &str = "ca978112ca1bbdcafac231b39a23dc4da786eff8147c4e72b9807785afee48bb";

    #[test]
    fn test_seal_then_open_recovers_hash() {
        let key = EncryptionKey::generate();
        let sealed = seal_hash(&key, HASH_A).unwrap();
        assert_eq!(sealed.ciphertext.len(), HASH_A.len() + TAG_LEN);
        assert_eq!(open_hash(&key, &sealed).unwrap(), HASH_A);
    }

    #[test]
    fn test_fresh_nonce_per_seal() {
        let key = EncryptionKey::generate();
        let a = seal_hash(&key, HASH_A).unwrap();
        let b = seal_hash(&key, HASH_A).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.to_leaf(), b.to_leaf());
    }

    #[test]
    fn test_wrong_key_fails_to_open() {
        let sealed = seal_hash(&EncryptionKey::generate(), HASH_A).unwrap();
        let err = open_hash(&EncryptionKey::generate(), &sealed).unwrap_err();
        assert!(matches!(err, CryptoError::OpenFailed));
    }

    #[test]
    fn test_tampered_ciphertext_fails_to_open() {
        let key = EncryptionKey::generate();
        let mut sealed = seal_hash(&key, HASH_A).unwrap();
        sealed.ciphertext[0] ^= 0x01;
        assert!(open_hash(&key, &sealed).is_err());
    }

    #[test]
    fn test_leaf_splits_back_into_parts() {
        let key = EncryptionKey::generate();
        let sealed = seal_hash(&key, HASH_A).unwrap();
        let leaf = sealed.to_leaf();
        assert!(leaf.starts_with(&hex::encode(sealed.nonce)));
        assert_eq!(SealedHash::from_leaf(&leaf).unwrap(), sealed);
    }

    #[test]
    fn test_short_leaf_is_malformed() {
        let err = SealedHash::from_leaf("abcd").unwrap_err();
        assert!(matches!(err, CryptoError::MalformedSealedLeaf(_)));
    }

    #[test]
    fn test_key_length_is_checked() {
        assert!(matches!(
            EncryptionKey::from_bytes(&[0u8; 16]),
            Err(CryptoError::InvalidKeyLength(16))
        ));
        assert!(EncryptionKey::from_hex(&"11".repeat(32)).is_ok());
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = EncryptionKey::from_bytes(&[7u8; 32]).unwrap();
        let dbg = format!("{key:?}");
        assert!(dbg.contains("redacted"));
        assert!(!dbg.contains("07"));
    }

    #[test]
    fn test_sealed_hash_json_is_hex() {
        let key = EncryptionKey::generate();
        let sealed = seal_hash(&key, HASH_A).unwrap();
        let json = serde_json::to_value(&sealed).unwrap();
        assert_eq!(json["nonce"].as_str().unwrap().len(), NONCE_LEN * 2);
        let back: SealedHash = serde_json::from_value(json).unwrap();
        assert_eq!(back, sealed);
    }
}
