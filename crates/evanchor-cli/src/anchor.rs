//! # Anchor Subcommand
//!
//! Ledger operations through [`AnchorService`]. The node, network,
//! application id and custodial signer come from `EVANCHOR_*` environment
//! variables (see [`AnchorConfig::from_env`]).
//!
//! ## Subcommands
//!
//! - `deploy`: Create the anchor application with the custodial signer.
//! - `package`: Anchor a package hash and Merkle root.
//! - `batch`: Anchor many packages under one Merkle root.
//! - `verify`: Compare an anchor record with its on-chain box.
//! - `read`: Print the box stored for a package id.
//! - `prepare` / `submit`: Wallet flow: unsigned transaction out, signed
//!   transaction in.
//! - `status`: Confirmation depth of a transaction.
//! - `cost`: Fees and box minimum balance of one anchor.
//! - `program`: Print the TEAL source of the anchor program.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use evanchor_chain::program::{approval_teal, clear_teal};
use evanchor_chain::{
    Address, Algod, AnchorArgs, AnchorConfig, AnchorPackageRequest, AnchorRecord, AnchorService,
    BatchPackage, HttpAlgod, ReanchorPolicy,
};
use evanchor_core::{sha256_hex, PackageId};

use crate::commit::load_commitment;
use crate::{emit, read_json};

/// Arguments for the `evanchor anchor` subcommand.
#[derive(Args, Debug)]
pub struct AnchorCmdArgs {
    #[command(subcommand)]
    pub command: AnchorCommand,
}

/// Anchor subcommands.
#[derive(Subcommand, Debug)]
pub enum AnchorCommand {
    /// Deploy the anchor program with the custodial signer.
    Deploy,

    /// Anchor one package and wait for confirmation.
    Package {
        /// Package identifier, used as the box name (1 to 64 bytes).
        #[arg(long)]
        package_id: String,
        /// SHA-256 of the package, hex.
        #[arg(long, required_unless_present = "package_file", conflicts_with = "package_file")]
        package_hash: Option<String>,
        /// Package file to hash instead of `--package-hash`.
        #[arg(long)]
        package_file: Option<PathBuf>,
        /// Evidence Merkle root, hex. All zeros when neither this nor
        /// `--commitment` is given.
        #[arg(long, conflicts_with = "commitment")]
        merkle_root: Option<String>,
        /// Commitment JSON whose root is anchored.
        #[arg(long)]
        commitment: Option<PathBuf>,
        /// Who requested the anchor.
        #[arg(long, default_value = "evanchor-cli")]
        anchored_by: String,
        /// Write the full anchor record here.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Anchor many packages in one transaction group.
    Batch {
        /// JSON list of `{"package_id", "package_hash"}` objects.
        packages: PathBuf,
        /// Who requested the anchor.
        #[arg(long, default_value = "evanchor-cli")]
        anchored_by: String,
        /// Directory receiving one `<package_id>.json` record per package.
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Compare an anchor record with the on-chain box.
    Verify {
        /// Anchor record JSON written by `package --out`.
        record: PathBuf,
    },

    /// Print the box stored for a package.
    Read {
        /// Package identifier.
        #[arg(long)]
        package_id: String,
        /// Application id; defaults to `EVANCHOR_APP_ID`.
        #[arg(long)]
        app_id: Option<u64>,
    },

    /// Build an unsigned anchor call for an external wallet (base64 msgpack).
    Prepare {
        /// Wallet address that will sign.
        #[arg(long)]
        sender: String,
        /// Package identifier.
        #[arg(long)]
        package_id: String,
        /// Package hash, hex.
        #[arg(long)]
        package_hash: String,
        /// Merkle root, hex. All zeros when omitted.
        #[arg(long)]
        merkle_root: Option<String>,
        /// Unix seconds stored in the box; defaults to now.
        #[arg(long)]
        timestamp: Option<u64>,
    },

    /// Submit a wallet-signed transaction (base64 msgpack) and wait.
    Submit {
        /// Signed transaction, base64.
        #[arg(required_unless_present = "signed_file")]
        signed: Option<String>,
        /// File containing the signed transaction, base64.
        #[arg(long, conflicts_with = "signed")]
        signed_file: Option<PathBuf>,
    },

    /// Confirmation depth of a transaction.
    Status {
        /// Transaction id.
        txid: String,
    },

    /// Estimate fees and box minimum balance for anchoring a package.
    Cost {
        /// Package identifier.
        #[arg(long)]
        package_id: String,
    },

    /// Print the anchor program.
    Program {
        /// Re-anchor policy compiled into the program.
        #[arg(long, default_value = "overwrite")]
        policy: ReanchorPolicy,
        /// Print the clear-state program instead.
        #[arg(long)]
        clear: bool,
    },
}

/// Execute the anchor subcommand against the node configured in the environment.
pub async fn run_anchor_from_env(args: &AnchorCmdArgs) -> Result<u8> {
    if let AnchorCommand::Program { policy, clear } = &args.command {
        return cmd_program(*policy, *clear);
    }
    let config = AnchorConfig::from_env().context("invalid EVANCHOR_* configuration")?;
    tracing::debug!(?config, "loaded anchor configuration");
    let algod = Arc::new(HttpAlgod::from_config(&config)?);
    let service = AnchorService::from_config(algod, &config)?;
    run_anchor(args, &service).await
}

/// Execute the anchor subcommand against `service`.
pub async fn run_anchor<A: Algod>(args: &AnchorCmdArgs, service: &AnchorService<A>) -> Result<u8> {
    match &args.command {
        AnchorCommand::Deploy => {
            let deployed = service.deploy_contract().await?;
            emit(&deployed, None)?;
            eprintln!("set EVANCHOR_APP_ID={} to anchor against it", deployed.app_id);
            Ok(0)
        }
        AnchorCommand::Package {
            package_id,
            package_hash,
            package_file,
            merkle_root,
            commitment,
            anchored_by,
            out,
        } => {
            let package_hash = match (package_hash, package_file) {
                (Some(hash), _) => hash.clone(),
                (None, Some(path)) => hash_file(path)?,
                (None, None) => anyhow::bail!("pass --package-hash or --package-file"),
            };
            let merkle_root = match commitment {
                Some(path) => Some(load_commitment(path)?.merkle_root),
                None => merkle_root.clone(),
            };
            let request = AnchorPackageRequest {
                package_id: PackageId::new(package_id.as_str())?,
                package_hash,
                merkle_root,
                anchored_by: anchored_by.clone(),
            };
            let record = service.anchor_package(request).await?;
            if let Some(path) = out {
                emit(&record, Some(path))?;
            }
            emit(&record.output(), None)?;
            Ok(0)
        }
        AnchorCommand::Batch {
            packages,
            anchored_by,
            out_dir,
        } => {
            let packages: Vec<BatchPackage> = read_json(packages)?;
            let records = service.batch_anchor(&packages, anchored_by).await?;
            if let Some(dir) = out_dir {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
                for record in &records {
                    emit(record, Some(&dir.join(format!("{}.json", record.package_id))))?;
                }
            }
            let outputs: Vec<_> = records.iter().map(AnchorRecord::output).collect();
            emit(&outputs, None)?;
            Ok(0)
        }
        AnchorCommand::Verify { record } => cmd_verify(service, record).await,
        AnchorCommand::Read { package_id, app_id } => {
            let app_id = app_id
                .or_else(|| service.app_id())
                .context("no application id; pass --app-id or set EVANCHOR_APP_ID")?;
            let anchor = service.client().read_anchor_box(app_id, package_id).await?;
            emit(
                &serde_json::json!({
                    "app_id": app_id,
                    "package_id": package_id,
                    "package_hash": anchor.package_hash_hex(),
                    "merkle_root": anchor.merkle_root_hex(),
                    "timestamp": anchor.timestamp,
                    "anchored_by": anchor.anchored_by.encode(),
                }),
                None,
            )?;
            Ok(0)
        }
        AnchorCommand::Prepare {
            sender,
            package_id,
            package_hash,
            merkle_root,
            timestamp,
        } => {
            let app_id = service
                .app_id()
                .context("no application id; set EVANCHOR_APP_ID")?;
            let sender = Address::decode(sender)?;
            let args = AnchorArgs::with_default_root(
                package_id,
                package_hash,
                merkle_root.as_deref(),
                *timestamp,
            )?;
            let unsigned = service
                .client()
                .prepare_unsigned_txn(sender, app_id, &args)
                .await?;
            println!("{unsigned}");
            Ok(0)
        }
        AnchorCommand::Submit {
            signed,
            signed_file,
        } => {
            let signed = match (signed, signed_file) {
                (Some(s), _) => s.clone(),
                (None, Some(path)) => std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, None) => anyhow::bail!("pass the signed transaction or --signed-file"),
            };
            let confirmation = service.client().submit_signed_txn(&signed).await?;
            emit(&confirmation, None)?;
            Ok(0)
        }
        AnchorCommand::Status { txid } => {
            emit(&service.anchor_status(txid).await?, None)?;
            Ok(0)
        }
        AnchorCommand::Cost { package_id } => {
            emit(&service.estimate_cost(package_id).await?, None)?;
            Ok(0)
        }
        AnchorCommand::Program { policy, clear } => cmd_program(*policy, *clear),
    }
}

fn hash_file(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(sha256_hex(&bytes))
}

fn cmd_program(policy: ReanchorPolicy, clear: bool) -> Result<u8> {
    if clear {
        print!("{}", clear_teal());
    } else {
        print!("{}", approval_teal(policy));
    }
    Ok(0)
}

async fn cmd_verify<A: Algod>(service: &AnchorService<A>, path: &Path) -> Result<u8> {
    let record: AnchorRecord = read_json(path)?;
    let verification = service.verify_anchor(&record).await?;
    emit(&verification, None)?;
    if verification.is_valid() {
        println!("OK: {} is anchored as recorded", record.package_id);
        Ok(0)
    } else {
        println!("FAIL: on-chain anchor for {} differs from the record", record.package_id);
        Ok(1)
    }
}
