//! # Commit Subcommand
//!
//! Evidence commitment operations on local JSON files.
//!
//! ## Subcommands
//!
//! - `build`: Commit to an evidence bundle.
//! - `update`: Append evidence to an existing commitment.
//! - `summary`: Print `{merkle_root, evidence_count, bundle_id}`.
//! - `prove`: Inclusion proof for one leaf.
//! - `verify-proof`: Replay a proof against its root.
//! - `check`: Compare a bundle with what a commitment committed to.
//!
//! Evidence comes either from a JSON array of evidence items (`--evidence`)
//! or from raw files hashed on the spot (`--content`).

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use evanchor_commit::{CommitmentGenerator, EvidenceCommitment, EvidenceProof};
use evanchor_core::{BundleId, EvidenceItem, HashAlgorithm, Metadata};
use evanchor_crypto::EncryptionKey;

use crate::{emit, read_json};

/// Arguments for the `evanchor commit` subcommand.
#[derive(Args, Debug)]
pub struct CommitArgs {
    #[command(subcommand)]
    pub command: CommitCommand,
}

/// Where a bundle's evidence items come from.
#[derive(Args, Debug, Clone, Default)]
pub struct EvidenceInput {
    /// JSON file holding an array of evidence items.
    #[arg(long)]
    pub evidence: Option<PathBuf>,
    /// Raw evidence files, hashed in the order given.
    #[arg(long, num_args = 1..)]
    pub content: Vec<PathBuf>,
    /// Evidence type recorded for `--content` files.
    #[arg(long, default_value = "file")]
    pub evidence_type: String,
    /// Source recorded for `--content` files.
    #[arg(long, default_value = "evanchor-cli")]
    pub source: String,
}

impl EvidenceInput {
    /// Load the items, JSON list first, then content files.
    pub fn load(&self) -> Result<Vec<EvidenceItem>> {
        let mut items: Vec<EvidenceItem> = match &self.evidence {
            Some(path) => read_json(path)?,
            None => Vec::new(),
        };
        for path in &self.content {
            let bytes = std::fs::read(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let mut metadata = Metadata::new();
            if let Some(name) = path.file_name() {
                metadata.insert("file_name".into(), name.to_string_lossy().into_owned().into());
            }
            items.push(EvidenceItem::from_content(
                &bytes,
                self.evidence_type.as_str(),
                self.source.as_str(),
                metadata,
            ));
        }
        if items.is_empty() {
            bail!("no evidence given; pass --evidence <items.json> or --content <files>");
        }
        Ok(items)
    }
}

/// Commit subcommands.
#[derive(Subcommand, Debug)]
pub enum CommitCommand {
    /// Commit to an evidence bundle.
    Build {
        #[command(flatten)]
        input: EvidenceInput,
        /// Explicit bundle identifier. Generated from tenant and claim otherwise.
        #[arg(long)]
        bundle_id: Option<String>,
        /// Tenant used for a generated bundle id.
        #[arg(long, default_value = "default")]
        tenant: String,
        /// Claim used for a generated bundle id.
        #[arg(long, default_value = "claim")]
        claim: String,
        /// Hash algorithm of the tree.
        #[arg(long, env = "EVANCHOR_HASH_ALGORITHM", default_value = "SHA256")]
        hash_algorithm: String,
        /// Seal content hashes before committing. Requires `--key-file`.
        #[arg(long)]
        encrypt: bool,
        /// File containing the 32-byte sealing key as hex.
        #[arg(long)]
        key_file: Option<PathBuf>,
        /// Write the commitment here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Append evidence to an existing commitment.
    Update {
        /// Existing commitment JSON.
        #[arg(long)]
        commitment: PathBuf,
        #[command(flatten)]
        input: EvidenceInput,
        /// Sealing key of an encrypted commitment.
        #[arg(long)]
        key_file: Option<PathBuf>,
        /// Write the new version here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Print the summary of a commitment.
    Summary {
        /// Commitment JSON.
        commitment: PathBuf,
    },

    /// Generate an inclusion proof for the leaf at `--index`.
    Prove {
        /// Commitment JSON.
        #[arg(long)]
        commitment: PathBuf,
        /// Leaf position.
        #[arg(long)]
        index: usize,
        /// Write the proof here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Replay a proof against its recorded root.
    VerifyProof {
        /// Proof JSON.
        proof: PathBuf,
        /// Expected root; defaults to the root recorded in the proof.
        #[arg(long)]
        root: Option<String>,
    },

    /// Check a bundle against a commitment.
    Check {
        /// Commitment JSON.
        #[arg(long)]
        commitment: PathBuf,
        #[command(flatten)]
        input: EvidenceInput,
        /// Sealing key, for an exact check of an encrypted commitment.
        #[arg(long)]
        key_file: Option<PathBuf>,
    },
}

/// Execute the commit subcommand.
pub fn run_commit(args: &CommitArgs) -> Result<u8> {
    match &args.command {
        CommitCommand::Build {
            input,
            bundle_id,
            tenant,
            claim,
            hash_algorithm,
            encrypt,
            key_file,
            out,
        } => {
            let algorithm = HashAlgorithm::from_str(hash_algorithm)?;
            let bundle_id = match bundle_id {
                Some(id) => BundleId::new(id.as_str()),
                None => CommitmentGenerator::generate_bundle_id(tenant, claim, None),
            };
            let key = key_file.as_deref().map(load_key).transpose()?;
            cmd_build(
                input,
                bundle_id,
                algorithm,
                *encrypt,
                key.as_ref(),
                out.as_deref(),
            )
        }
        CommitCommand::Update {
            commitment,
            input,
            key_file,
            out,
        } => {
            let key = key_file.as_deref().map(load_key).transpose()?;
            cmd_update(commitment, input, key.as_ref(), out.as_deref())
        }
        CommitCommand::Summary { commitment } => {
            let commitment = load_commitment(commitment)?;
            emit(&commitment.summary(), None)?;
            Ok(0)
        }
        CommitCommand::Prove {
            commitment,
            index,
            out,
        } => cmd_prove(commitment, *index, out.as_deref()),
        CommitCommand::VerifyProof { proof, root } => cmd_verify_proof(proof, root.as_deref()),
        CommitCommand::Check {
            commitment,
            input,
            key_file,
        } => {
            let key = key_file.as_deref().map(load_key).transpose()?;
            cmd_check(commitment, input, key.as_ref())
        }
    }
}

fn load_key(path: &Path) -> Result<EncryptionKey> {
    let hex = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read key file {}", path.display()))?;
    EncryptionKey::from_hex(hex.trim())
        .with_context(|| format!("invalid key in {}", path.display()))
}

/// Load a commitment and re-check its invariants.
pub fn load_commitment(path: &Path) -> Result<EvidenceCommitment> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    CommitmentGenerator::default()
        .deserialize_commitment(&json)
        .with_context(|| format!("invalid commitment in {}", path.display()))
}

fn cmd_build(
    input: &EvidenceInput,
    bundle_id: BundleId,
    algorithm: HashAlgorithm,
    encrypt: bool,
    key: Option<&EncryptionKey>,
    out: Option<&Path>,
) -> Result<u8> {
    let items = input.load()?;
    let commitment = CommitmentGenerator::new(algorithm)
        .generate_commitment(&items, bundle_id, encrypt, key)?;
    emit(&commitment, out)?;
    Ok(0)
}

fn cmd_update(
    path: &Path,
    input: &EvidenceInput,
    key: Option<&EncryptionKey>,
    out: Option<&Path>,
) -> Result<u8> {
    let existing = load_commitment(path)?;
    let items = input.load()?;
    let generator = CommitmentGenerator::new(existing.hash_algorithm);
    let updated = match key {
        Some(key) => generator.update_sealed_commitment(&existing, &items, key)?,
        None => generator.update_commitment(&existing, &items)?,
    };
    emit(&updated, out)?;
    Ok(0)
}

fn cmd_prove(path: &Path, index: usize, out: Option<&Path>) -> Result<u8> {
    let commitment = load_commitment(path)?;
    let proof = CommitmentGenerator::new(commitment.hash_algorithm)
        .generate_proof(&commitment, index)?;
    emit(&proof, out)?;
    Ok(0)
}

fn cmd_verify_proof(path: &Path, root: Option<&str>) -> Result<u8> {
    let mut proof: EvidenceProof = read_json(path)?;
    if let Some(root) = root {
        proof.merkle_root = root.to_ascii_lowercase();
    }
    if proof.verify() {
        println!(
            "OK: leaf {} is included under {}",
            proof.evidence_index, proof.merkle_root
        );
        Ok(0)
    } else {
        println!(
            "FAIL: leaf {} does not resolve to {}",
            proof.evidence_index, proof.merkle_root
        );
        Ok(1)
    }
}

fn cmd_check(path: &Path, input: &EvidenceInput, key: Option<&EncryptionKey>) -> Result<u8> {
    let commitment = load_commitment(path)?;
    let items = input.load()?;
    let generator = CommitmentGenerator::new(commitment.hash_algorithm);
    let intact = match key {
        Some(key) => generator.verify_sealed_bundle_integrity(&items, &commitment, key)?,
        None => {
            if commitment.is_encrypted {
                tracing::warn!(
                    bundle_id = %commitment.bundle_id,
                    "encrypted commitment checked without key; comparing counts only"
                );
            }
            generator.verify_bundle_integrity(&items, &commitment)
        }
    };
    if intact {
        println!("OK: bundle {} matches its commitment", commitment.bundle_id);
        Ok(0)
    } else {
        println!("FAIL: bundle {} differs from its commitment", commitment.bundle_id);
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT_ABC: &str = "0bdf27bf7ec894ca7cadfe491ec1a3ece840f117989e8c5e9bd7086467bf6c38";

    fn write_files(dir: &Path, contents: &[&str]) -> Vec<PathBuf> {
        contents
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let path = dir.join(format!("evidence_{i}.txt"));
                std::fs::write(&path, c).unwrap();
                path
            })
            .collect()
    }

    fn content_input(files: Vec<PathBuf>) -> EvidenceInput {
        EvidenceInput {
            content: files,
            evidence_type: "log".into(),
            source: "test".into(),
            ..Default::default()
        }
    }

    fn build(dir: &Path, contents: &[&str], out: &Path) {
        let args = CommitArgs {
            command: CommitCommand::Build {
                input: content_input(write_files(dir, contents)),
                bundle_id: Some("bundle_t_c_20240101000000".into()),
                tenant: "default".into(),
                claim: "claim".into(),
                hash_algorithm: "SHA256".into(),
                encrypt: false,
                key_file: None,
                out: Some(out.to_path_buf()),
            },
        };
        assert_eq!(run_commit(&args).unwrap(), 0);
    }

    #[test]
    fn test_build_from_content_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("commitment.json");
        build(dir.path(), &["a", "b", "c"], &out);

        let commitment = load_commitment(&out).unwrap();
        assert_eq!(commitment.merkle_root, ROOT_ABC);
        assert_eq!(commitment.evidence_count, 3);
        assert_eq!(commitment.bundle_id.as_str(), "bundle_t_c_20240101000000");
    }

    #[test]
    fn test_build_from_evidence_json() {
        let dir = tempfile::tempdir().unwrap();
        let items: Vec<EvidenceItem> = ["a", "b", "c"]
            .iter()
            .map(|c| EvidenceItem::from_content(c.as_bytes(), "log", "siem", Metadata::new()))
            .collect();
        let evidence = dir.path().join("items.json");
        emit(&items, Some(&evidence)).unwrap();

        let out = dir.path().join("commitment.json");
        let args = CommitArgs {
            command: CommitCommand::Build {
                input: EvidenceInput {
                    evidence: Some(evidence),
                    ..Default::default()
                },
                bundle_id: None,
                tenant: "acme".into(),
                claim: "c1".into(),
                hash_algorithm: "sha-256".into(),
                encrypt: false,
                key_file: None,
                out: Some(out.clone()),
            },
        };
        assert_eq!(run_commit(&args).unwrap(), 0);
        let commitment = load_commitment(&out).unwrap();
        assert_eq!(commitment.merkle_root, ROOT_ABC);
        assert!(commitment.bundle_id.as_str().starts_with("bundle_acme_c1_"));
    }

    #[test]
    fn test_build_without_evidence_fails() {
        let args = CommitArgs {
            command: CommitCommand::Build {
                input: EvidenceInput::default(),
                bundle_id: None,
                tenant: "t".into(),
                claim: "c".into(),
                hash_algorithm: "SHA256".into(),
                encrypt: false,
                key_file: None,
                out: None,
            },
        };
        assert!(run_commit(&args).is_err());
    }

    #[test]
    fn test_encrypt_without_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let args = CommitArgs {
            command: CommitCommand::Build {
                input: content_input(write_files(dir.path(), &["a"])),
                bundle_id: None,
                tenant: "t".into(),
                claim: "c".into(),
                hash_algorithm: "SHA256".into(),
                encrypt: true,
                key_file: None,
                out: None,
            },
        };
        assert!(run_commit(&args).is_err());
    }

    #[test]
    fn test_prove_then_verify_proof() {
        let dir = tempfile::tempdir().unwrap();
        let commitment = dir.path().join("commitment.json");
        build(dir.path(), &["a", "b", "c"], &commitment);

        let proof = dir.path().join("proof.json");
        let prove = CommitArgs {
            command: CommitCommand::Prove {
                commitment,
                index: 2,
                out: Some(proof.clone()),
            },
        };
        assert_eq!(run_commit(&prove).unwrap(), 0);

        let verify = CommitArgs {
            command: CommitCommand::VerifyProof {
                proof: proof.clone(),
                root: None,
            },
        };
        assert_eq!(run_commit(&verify).unwrap(), 0);

        let wrong_root = CommitArgs {
            command: CommitCommand::VerifyProof {
                proof,
                root: Some("00".repeat(32)),
            },
        };
        assert_eq!(run_commit(&wrong_root).unwrap(), 1);
    }

    #[test]
    fn test_prove_out_of_range_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let commitment = dir.path().join("commitment.json");
        build(dir.path(), &["a", "b"], &commitment);
        let prove = CommitArgs {
            command: CommitCommand::Prove {
                commitment,
                index: 2,
                out: None,
            },
        };
        assert!(run_commit(&prove).is_err());
    }

    #[test]
    fn test_update_appends_and_bumps_version() {
        let dir = tempfile::tempdir().unwrap();
        let commitment = dir.path().join("commitment.json");
        build(dir.path(), &["a", "b", "c"], &commitment);

        let extra = dir.path().join("d.txt");
        std::fs::write(&extra, "d").unwrap();
        let out = dir.path().join("v2.json");
        let update = CommitArgs {
            command: CommitCommand::Update {
                commitment,
                input: content_input(vec![extra]),
                key_file: None,
                out: Some(out.clone()),
            },
        };
        assert_eq!(run_commit(&update).unwrap(), 0);
        let v2 = load_commitment(&out).unwrap();
        assert_eq!(v2.version, 2);
        assert_eq!(
            v2.merkle_root,
            "58c89d709329eb37285837b042ab6ff72c7c8f74de0446b091b6a0131c102cfd"
        );
    }

    #[test]
    fn test_check_detects_changed_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let commitment = dir.path().join("commitment.json");
        let files = write_files(dir.path(), &["a", "b"]);
        let build = CommitArgs {
            command: CommitCommand::Build {
                input: content_input(files.clone()),
                bundle_id: None,
                tenant: "t".into(),
                claim: "c".into(),
                hash_algorithm: "SHA256".into(),
                encrypt: false,
                key_file: None,
                out: Some(commitment.clone()),
            },
        };
        run_commit(&build).unwrap();

        let same = CommitArgs {
            command: CommitCommand::Check {
                commitment: commitment.clone(),
                input: content_input(files.clone()),
                key_file: None,
            },
        };
        assert_eq!(run_commit(&same).unwrap(), 0);

        std::fs::write(&files[1], "tampered").unwrap();
        let changed = CommitArgs {
            command: CommitCommand::Check {
                commitment,
                input: content_input(files),
                key_file: None,
            },
        };
        assert_eq!(run_commit(&changed).unwrap(), 1);
    }

    #[test]
    fn test_encrypted_round_trip_with_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let key_file = dir.path().join("seal.key");
        std::fs::write(&key_file, format!("{}\n", "11".repeat(32))).unwrap();
        let files = write_files(dir.path(), &["a", "b", "c"]);
        let commitment = dir.path().join("sealed.json");

        let build = CommitArgs {
            command: CommitCommand::Build {
                input: content_input(files.clone()),
                bundle_id: None,
                tenant: "t".into(),
                claim: "c".into(),
                hash_algorithm: "SHA256".into(),
                encrypt: true,
                key_file: Some(key_file.clone()),
                out: Some(commitment.clone()),
            },
        };
        assert_eq!(run_commit(&build).unwrap(), 0);
        let sealed = load_commitment(&commitment).unwrap();
        assert!(sealed.is_encrypted);
        assert_ne!(sealed.merkle_root, ROOT_ABC);

        let check = CommitArgs {
            command: CommitCommand::Check {
                commitment,
                input: content_input(files),
                key_file: Some(key_file),
            },
        };
        assert_eq!(run_commit(&check).unwrap(), 0);
    }

    #[test]
    fn test_tampered_commitment_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let commitment = dir.path().join("commitment.json");
        build(dir.path(), &["a", "b", "c"], &commitment);

        let mut value: serde_json::Value = read_json(&commitment).unwrap();
        value["evidence_count"] = serde_json::json!(4);
        emit(&value, Some(&commitment)).unwrap();
        assert!(load_commitment(&commitment).is_err());
    }
}
