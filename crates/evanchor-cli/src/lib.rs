//! # evanchor-cli: Command-Line Interface for evanchor
//!
//! Provides the `evanchor` binary.
//!
//! ## Subcommands
//!
//! - `evanchor commit`: Build, update, summarize and prove evidence
//!   commitments; check a bundle against a commitment.
//! - `evanchor anchor`: Deploy the anchor program, anchor packages, read and
//!   verify boxes, wallet prepare/submit, status and cost.
//!
//! ```bash
//! evanchor commit build --content report.pdf scan.json --out commitment.json
//! evanchor commit prove --commitment commitment.json --index 1 --out proof.json
//! evanchor commit verify-proof proof.json
//! EVANCHOR_APP_ID=1234 evanchor anchor package --package-id pkg_001 \
//!     --package-file package.zip --commitment commitment.json --out record.json
//! evanchor anchor verify record.json
//! ```
//!
//! Every handler returns the process exit code: `0` on success, `1` when a
//! verification does not hold. Errors propagate as [`anyhow::Error`].

pub mod anchor;
pub mod commit;

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Read and parse a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

/// Write `value` as pretty JSON to `out`, or to stdout when `out` is `None`.
pub fn emit<T: Serialize>(value: &T, out: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
