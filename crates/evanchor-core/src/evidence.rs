//! # Evidence Items
//!
//! An [`EvidenceItem`] is the normalized, read-only input to commitment:
//! a content hash plus descriptive fields. Producers upstream collect and
//! normalize evidence; this crate only needs the hash to be well formed.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::digest::{is_hex64, sha256_hex};
use crate::error::ValidationError;

/// A primitive metadata value.
///
/// Metadata is deliberately flat: nested documents are flattened by the
/// producer before they reach commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Free-form string.
    String(String),
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Ordered metadata map. Key order is stable across serializations.
pub type Metadata = BTreeMap<String, MetadataValue>;

fn lowercase<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    String::deserialize(deserializer).map(|s| s.to_ascii_lowercase())
}

/// A single piece of normalized evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Stable identifier assigned by the producer.
    pub id: String,
    /// Lowercase hex SHA-256 of the evidence content. Lowercased on load.
    #[serde(deserialize_with = "lowercase")]
    pub content_hash: String,
    /// Evidence category (log, scan_result, certificate, ...).
    #[serde(rename = "type")]
    pub evidence_type: String,
    /// System that produced the evidence.
    pub source: String,
    /// Content size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Additional primitive metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

impl EvidenceItem {
    /// Build an item from an already-computed content hash.
    ///
    /// The hash must be 64 hex characters; it is stored lowercase.
    pub fn new(
        id: impl Into<String>,
        content_hash: &str,
        evidence_type: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        if content_hash.len() != 64 {
            return Err(ValidationError::InvalidHashLength {
                field: "content_hash",
                len: content_hash.len(),
            });
        }
        if !is_hex64(content_hash) {
            return Err(ValidationError::InvalidHex {
                field: "content_hash",
            });
        }
        Ok(Self {
            id: id.into(),
            content_hash: content_hash.to_ascii_lowercase(),
            evidence_type: evidence_type.into(),
            source: source.into(),
            size: 0,
            metadata: Metadata::new(),
        })
    }

    /// Normalize raw content into an item.
    ///
    /// `content_hash = sha256(content)`, `size = content.len()` and
    /// `id = "{source}:{type}:{first 16 hash chars}"`.
    pub fn from_content(
        content: &[u8],
        evidence_type: impl Into<String>,
        source: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        let evidence_type = evidence_type.into();
        let source = source.into();
        let content_hash = sha256_hex(content);
        Self {
            id: format!("{source}:{evidence_type}:{}", &content_hash[..16]),
            content_hash,
            evidence_type,
            source,
            size: content.len() as u64,
            metadata,
        }
    }

    /// Attach a metadata entry, builder style.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The content hash as committed: lowercase hex.
    pub fn leaf_hash(&self) -> String {
        self.content_hash.to_ascii_lowercase()
    }

    /// Check that the content hash is usable as a Merkle leaf.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !is_hex64(&self.content_hash) {
            return Err(ValidationError::InvalidEvidence(format!(
                "item \"{}\" has malformed content_hash",
                self.id
            )));
        }
        Ok(())
    }
}
