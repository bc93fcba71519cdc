//! # Identity Newtypes
//!
//! [`PackageId`] names an attestation package and doubles as the on-chain
//! box name, so it is validated against the box-name limit when built.
//! [`BundleId`] names an evidence bundle and is free-form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Maximum UTF-8 byte length of a package identifier (box-name limit).
pub const MAX_PACKAGE_ID_LEN: usize = 64;

// ---------------------------------------------------------------------------
// PackageId
// ---------------------------------------------------------------------------

/// Identifier of an attestation package.
///
/// # Validation
///
/// - Must be non-empty
/// - Must be at most [`MAX_PACKAGE_ID_LEN`] bytes of UTF-8
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageId(String);

impl PackageId {
    /// Create a package identifier, validating its length.
    ///
    /// # Errors
    ///
    /// [`ValidationError::EmptyPackageId`] or
    /// [`ValidationError::PackageIdTooLong`].
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        if s.is_empty() {
            return Err(ValidationError::EmptyPackageId);
        }
        if s.len() > MAX_PACKAGE_ID_LEN {
            return Err(ValidationError::PackageIdTooLong {
                len: s.len(),
                max: MAX_PACKAGE_ID_LEN,
            });
        }
        Ok(Self(s))
    }

    /// Access the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// UTF-8 bytes, i.e. the on-chain box name.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl TryFrom<String> for PackageId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PackageId> for String {
    fn from(id: PackageId) -> Self {
        id.0
    }
}

impl std::fmt::Display for PackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// BundleId
// ---------------------------------------------------------------------------

/// Identifier of an evidence bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleId(String);

impl BundleId {
    /// Wrap an existing bundle identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Derive `bundle_{tenant}_{claim}_{YYYYmmddHHMMSS}`.
    pub fn generate(tenant_id: &str, claim_id: &str, at: DateTime<Utc>) -> Self {
        Self(format!(
            "bundle_{tenant_id}_{claim_id}_{}",
            at.format("%Y%m%d%H%M%S")
        ))
    }

    /// Access the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key identifier recorded for encrypted commitments of this bundle.
    pub fn encryption_key_id(&self) -> String {
        format!("key_{}", self.0)
    }
}

impl std::fmt::Display for BundleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_package_id_accepts_64_bytes() {
        let id = PackageId::new("p".repeat(64)).unwrap();
        assert_eq!(id.as_bytes().len(), 64);
    }

    #[test]
    fn test_package_id_rejects_65_bytes() {
        let err = PackageId::new("p".repeat(65)).unwrap_err();
        assert_eq!(err, ValidationError::PackageIdTooLong { len: 65, max: 64 });
    }

    #[test]
    fn test_package_id_counts_utf8_bytes_not_chars() {
        // 22 three-byte characters = 66 bytes.
        let err = PackageId::new("€".repeat(22)).unwrap_err();
        assert!(matches!(err, ValidationError::PackageIdTooLong { len: 66, .. }));
    }

    #[test]
    fn test_package_id_rejects_empty() {
        assert_eq!(PackageId::new("").unwrap_err(), ValidationError::EmptyPackageId);
    }

    #[test]
    fn test_package_id_deserialization_validates() {
        let ok: PackageId = serde_json::from_str("\"pkg_demo_001\"").unwrap();
        assert_eq!(ok.as_str(), "pkg_demo_001");
        let bad = serde_json::from_str::<PackageId>("\"\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_bundle_id_generate_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        let id = BundleId::generate("acme", "soc2", at);
        assert_eq!(id.as_str(), "bundle_acme_soc2_20240305070809");
        assert_eq!(id.encryption_key_id(), "key_bundle_acme_soc2_20240305070809");
    }

    #[test]
    fn test_bundle_id_serializes_as_plain_string() {
        let id = BundleId::new("b1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"b1\"");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn package_id_valid_iff_byte_length_in_range(s in "\\PC{0,40}") {
                let result = PackageId::new(s.clone());
                let ok = !s.is_empty() && s.len() <= MAX_PACKAGE_ID_LEN;
                prop_assert_eq!(result.is_ok(), ok);
                if let Ok(id) = result {
                    prop_assert_eq!(id.as_bytes(), s.as_bytes());
                }
            }
        }
    }
}
