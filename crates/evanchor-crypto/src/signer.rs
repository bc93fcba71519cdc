//! # Custodial Signing Key
//!
//! Ed25519 key held by the service to sign ledger transactions on behalf of
//! callers who do not bring their own wallet.
//!
//! ## Security Invariant
//!
//! - The key is never serialized or logged. [`CustodialKey`] does not
//!   implement `Serialize`, and its `Debug` prints no key material.
//! - The underlying `ed25519_dalek::SigningKey` zeroizes on drop.
//! - The key is passed explicitly (typically as `Arc<CustodialKey>`), never
//!   stored in a global.

use ed25519_dalek::{Signer, Verifier};
use rand_core::OsRng;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Custodial Ed25519 signing key.
pub struct CustodialKey {
    signing_key: ed25519_dalek::SigningKey,
}

impl CustodialKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let signing_key = ed25519_dalek::SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Create a key from a raw 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = ed25519_dalek::SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// Create a key from a 64-character hex seed.
    pub fn from_seed_hex(seed_hex: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(
            hex::decode(seed_hex.trim())
                .map_err(|_| CryptoError::InvalidSeed("seed is not hex".into()))?,
        );
        let seed: Zeroizing<[u8; 32]> = Zeroizing::new(
            bytes.as_slice().try_into().map_err(|_| {
                CryptoError::InvalidSeed(format!("expected 32 bytes, got {}", bytes.len()))
            })?,
        );
        Ok(Self::from_seed(&seed))
    }

    /// Raw 32-byte public key.
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Sign `message`, returning the 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for CustodialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CustodialKey(<private>)")
    }
}

/// Verify an Ed25519 signature against a raw public key.
pub fn verify_signature(
    public_key: &[u8; 32],
    message: &[u8],
    signature: &[u8; 64],
) -> Result<(), CryptoError> {
    let vk = ed25519_dalek::VerifyingKey::from_bytes(public_key)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    let sig = ed25519_dalek::Signature::from_bytes(signature);
    vk.verify(message, &sig)
        .map_err(|e| CryptoError::VerificationFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let key = CustodialKey::generate();
        let sig = key.sign(b"TXpayload");
        verify_signature(&key.public_key(), b"TXpayload", &sig).unwrap();
    }

    #[test]
    fn test_verify_rejects_other_message() {
        let key = CustodialKey::from_seed(&[9u8; 32]);
        let sig = key.sign(b"one");
        assert!(matches!(
            verify_signature(&key.public_key(), b"two", &sig),
            Err(CryptoError::VerificationFailed(_))
        ));
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = CustodialKey::from_seed(&[1u8; 32]);
        let b = CustodialKey::from_seed_hex(&"01".repeat(32)).unwrap();
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.sign(b"m"), b.sign(b"m"));
    }

    #[test]
    fn test_bad_seed_hex_rejected() {
        assert!(matches!(
            CustodialKey::from_seed_hex("abcd"),
            Err(CryptoError::InvalidSeed(_))
        ));
        assert!(matches!(
            CustodialKey::from_seed_hex("not-hex"),
            Err(CryptoError::InvalidSeed(_))
        ));
    }

    #[test]
    fn test_debug_does_not_leak_private_key() {
        let key = CustodialKey::from_seed(&[0xab; 32]);
        let debug = format!("{key:?}");
        assert_eq!(debug, "CustodialKey(<private>)");
    }
}
