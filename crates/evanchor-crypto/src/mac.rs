//! # Bundle Integrity Tags
//!
//! An encrypted commitment stores only sealed leaves, so comparing it with a
//! live evidence list can at best compare counts. The integrity tag closes
//! that gap: HMAC-SHA-256 over the plaintext hash list, keyed by a subkey of
//! the encryption key. Anyone holding the key can check the exact list;
//! nobody without it learns anything from the tag.
//!
//! Message layout: for each hash in order, `u32_be(len) || utf8(hash)`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::CryptoError;
use crate::seal::EncryptionKey;

type HmacSha256 = Hmac<Sha256>;

const MAC_KEY_LABEL: &[u8] = b"evanchor/bundle-mac/v1";

fn keyed(key: &[u8]) -> Result<HmacSha256, CryptoError> {
    HmacSha256::new_from_slice(key).map_err(|e| CryptoError::MacKey(e.to_string()))
}

fn compute(key: &EncryptionKey, hashes: &[String]) -> Result<Vec<u8>, CryptoError> {
    let mut derive = keyed(key.as_bytes())?;
    derive.update(MAC_KEY_LABEL);
    let subkey = derive.finalize().into_bytes();

    let mut mac = keyed(&subkey)?;
    for h in hashes {
        mac.update(&(h.len() as u32).to_be_bytes());
        mac.update(h.as_bytes());
    }
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Integrity tag over an ordered list of plaintext hashes, as lowercase hex.
pub fn integrity_mac(key: &EncryptionKey, hashes: &[String]) -> Result<String, CryptoError> {
    compute(key, hashes).map(hex::encode)
}

/// Constant-time check of a tag produced by [`integrity_mac`].
///
/// A tag that is not hex is a mismatch, not an error.
pub fn verify_integrity_mac(
    key: &EncryptionKey,
    hashes: &[String],
    tag_hex: &str,
) -> Result<bool, CryptoError> {
    let Ok(tag) = hex::decode(tag_hex) else {
        return Ok(false);
    };
    let expected = compute(key, hashes)?;
    Ok(expected.len() == tag.len() && bool::from(expected.ct_eq(&tag)))
}
