//! # Hash Algorithms and Hex Digests
//!
//! [`HashAlgorithm`] is the configurable hashing primitive used for Merkle
//! leaves and parents. SHA-256 is the default; SHA-224, SHA-384 and SHA-512
//! are available for bundles that were committed with them.
//!
//! Digests travel through the system as lowercase hex strings. [`Hash32`] is
//! the raw 32-byte form required on-chain (package hash and Merkle root).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use crate::error::ValidationError;

/// Sixty-four zero characters: the default Merkle root of an anchor request
/// that carries no commitment.
pub const ZERO_HASH_HEX: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Hash function used to compute leaves and interior nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA-224 (56 hex characters).
    #[serde(rename = "SHA224")]
    Sha224,
    /// SHA-256 (64 hex characters). Default.
    #[default]
    #[serde(rename = "SHA256")]
    Sha256,
    /// SHA-384 (96 hex characters).
    #[serde(rename = "SHA384")]
    Sha384,
    /// SHA-512 (128 hex characters).
    #[serde(rename = "SHA512")]
    Sha512,
}

impl HashAlgorithm {
    /// Hash `data` and return the lowercase hex digest.
    pub fn digest_hex(&self, data: &[u8]) -> String {
        match self {
            Self::Sha224 => hex::encode(Sha224::digest(data)),
            Self::Sha256 => hex::encode(Sha256::digest(data)),
            Self::Sha384 => hex::encode(Sha384::digest(data)),
            Self::Sha512 => hex::encode(Sha512::digest(data)),
        }
    }

    /// Canonical upper-case name, e.g. `"SHA256"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha224 => "SHA224",
            Self::Sha256 => "SHA256",
            Self::Sha384 => "SHA384",
            Self::Sha512 => "SHA512",
        }
    }

    /// Length of a hex digest produced by this algorithm.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Sha224 => 56,
            Self::Sha256 => 64,
            Self::Sha384 => 96,
            Self::Sha512 => 128,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = ValidationError;

    /// Accepts `SHA256`, `sha256`, `sha-256` and the like.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "SHA224" => Ok(Self::Sha224),
            "SHA256" => Ok(Self::Sha256),
            "SHA384" => Ok(Self::Sha384),
            "SHA512" => Ok(Self::Sha512),
            _ => Err(ValidationError::UnsupportedHashAlgorithm(s.to_string())),
        }
    }
}

/// SHA-256 of `data` as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    HashAlgorithm::Sha256.digest_hex(data)
}

/// True when `s` is exactly 64 hex characters (either case).
pub fn is_hex64(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// A raw 32-byte digest, as stored on-chain.
///
/// Serializes as a lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    /// Parse a 64-character hex string. `field` names the input in errors.
    pub fn from_hex(field: &'static str, s: &str) -> Result<Self, ValidationError> {
        if s.len() != 64 {
            return Err(ValidationError::InvalidHashLength {
                field,
                len: s.len(),
            });
        }
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out).map_err(|_| ValidationError::InvalidHex { field })?;
        Ok(Self(out))
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Hash32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash32::from_hex("hash", &s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA256_A: &str = "ca978112ca1bbdcafac231b39a23dc4da786eff8147c4e72b9807785afee48bb";

    #[test]
    fn test_sha256_of_a() {
        assert_eq!(sha256_hex(b"a"), SHA256_A);
    }

    #[test]
    fn test_digest_lengths_match_algorithm() {
        for alg in [
            HashAlgorithm::Sha224,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha384,
            HashAlgorithm::Sha512,
        ] {
            assert_eq!(alg.digest_hex(b"x").len(), alg.hex_len(), "{alg}");
        }
    }

    #[test]
    fn test_default_is_sha256() {
        assert_eq!(HashAlgorithm::default(), HashAlgorithm::Sha256);
    }

    #[test]
    fn test_parse_accepts_common_spellings() {
        assert_eq!("SHA256".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Sha256));
        assert_eq!("sha-384".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Sha384));
        assert_eq!("sha_512".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Sha512));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = "MD5".parse::<HashAlgorithm>().unwrap_err();
        assert_eq!(err, ValidationError::UnsupportedHashAlgorithm("MD5".into()));
    }

    #[test]
    fn test_serde_uses_upper_case_names() {
        let json = serde_json::to_string(&HashAlgorithm::Sha256).unwrap();
        assert_eq!(json, "\"SHA256\"");
        let back: HashAlgorithm = serde_json::from_str("\"SHA224\"").unwrap();
        assert_eq!(back, HashAlgorithm::Sha224);
    }

    #[test]
    fn test_is_hex64_checks_length_and_charset() {
        assert!(is_hex64(SHA256_A));
        assert!(is_hex64(&SHA256_A.to_uppercase()));
        assert!(!is_hex64(&SHA256_A[..63]));
        assert!(!is_hex64(&format!("{}z", &SHA256_A[..63])));
        assert!(is_hex64(ZERO_HASH_HEX));
    }

    #[test]
    fn test_hash32_rejects_wrong_length() {
        let err = Hash32::from_hex("merkle_root", "abcd").unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidHashLength {
                field: "merkle_root",
                len: 4
            }
        );
    }

    #[test]
    fn test_hash32_rejects_non_hex() {
        let bad = "g".repeat(64);
        let err = Hash32::from_hex("package_hash", &bad).unwrap_err();
        assert_eq!(err, ValidationError::InvalidHex { field: "package_hash" });
    }

    #[test]
    fn test_hash32_hex_serde() {
        let h = Hash32::from_hex("h", SHA256_A).unwrap();
        assert_eq!(h.0[0], 0xca);
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{SHA256_A}\""));
        let back: Hash32 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn test_hash32_uppercase_input_normalizes() {
        let h = Hash32::from_hex("h", &SHA256_A.to_uppercase()).unwrap();
        assert_eq!(h.to_hex(), SHA256_A);
    }
}
