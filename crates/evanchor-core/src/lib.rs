#![deny(missing_docs)]

//! # evanchor-core: Foundational Types for evanchor
//!
//! Every other crate in the workspace depends on this one. It has no
//! internal crate dependencies: only `serde`, `thiserror`, `chrono`, `sha2`
//! and `hex` from the external ecosystem.
//!
//! ## Design Principles
//!
//! 1. **Hex digests are the commitment currency.** Merkle leaves, parents and
//!    roots are lowercase hex strings; [`HashAlgorithm`] is the single place
//!    that turns bytes into such a string.
//!
//! 2. **Newtype wrappers for identifiers.** A [`PackageId`] is validated
//!    against the on-chain box-name limit at construction, so an oversized
//!    identifier can never reach transaction building.
//!
//! 3. **Typed metadata.** Evidence metadata is a map of primitives
//!    ([`MetadataValue`]), not an arbitrary nested document.
//!
//! 4. **Structured errors.** [`ValidationError`] for malformed input,
//!    [`IntegrityError`] for corrupted data. No `.unwrap()` outside tests.

pub mod digest;
pub mod error;
pub mod evidence;
pub mod identity;

pub use digest::{is_hex64, sha256_hex, Hash32, HashAlgorithm, ZERO_HASH_HEX};
pub use error::{IntegrityError, ValidationError};
pub use evidence::{EvidenceItem, Metadata, MetadataValue};
pub use identity::{BundleId, PackageId, MAX_PACKAGE_ID_LEN};
