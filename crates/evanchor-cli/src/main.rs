//! # evanchor CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use evanchor_cli::anchor::{run_anchor_from_env, AnchorCmdArgs};
use evanchor_cli::commit::{run_commit, CommitArgs};

/// evanchor: evidence commitments and ledger anchoring.
///
/// Builds Merkle commitments over evidence bundles, produces and checks
/// inclusion proofs, and anchors package hashes and roots in Algorand
/// application boxes.
#[derive(Parser, Debug)]
#[command(name = "evanchor", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build, update and prove evidence commitments.
    Commit(CommitArgs),

    /// Deploy the anchor program, anchor packages and verify anchors.
    Anchor(AnchorCmdArgs),
}

fn filter_for(verbose: u8) -> EnvFilter {
    match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = filter_for(cli.verbose);
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let result = match &cli.command {
        Commands::Commit(args) => run_commit(args),
        Commands::Anchor(args) => run_anchor_from_env(args).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evanchor_chain::ReanchorPolicy;
    use evanchor_cli::anchor::AnchorCommand;
    use evanchor_cli::commit::CommitCommand;
    use std::path::PathBuf;

    #[test]
    fn test_cli_parse_commit_build_content() {
        let cli = Cli::try_parse_from([
            "evanchor", "commit", "build", "--content", "a.txt", "b.txt", "--out", "c.json",
        ])
        .unwrap();
        let Commands::Commit(args) = cli.command else {
            panic!("expected commit");
        };
        let CommitCommand::Build { input, out, encrypt, .. } = args.command else {
            panic!("expected build");
        };
        assert_eq!(input.content, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
        assert_eq!(out, Some(PathBuf::from("c.json")));
        assert!(!encrypt);
    }

    #[test]
    fn test_cli_parse_commit_prove() {
        let cli = Cli::try_parse_from([
            "evanchor",
            "commit",
            "prove",
            "--commitment",
            "c.json",
            "--index",
            "3",
        ])
        .unwrap();
        let Commands::Commit(args) = cli.command else {
            panic!("expected commit");
        };
        assert!(matches!(args.command, CommitCommand::Prove { index: 3, .. }));
    }

    #[test]
    fn test_cli_parse_anchor_package_requires_hash_or_file() {
        let missing = Cli::try_parse_from(["evanchor", "anchor", "package", "--package-id", "p"]);
        assert!(missing.is_err());

        let both = Cli::try_parse_from([
            "evanchor",
            "anchor",
            "package",
            "--package-id",
            "p",
            "--package-hash",
            "ab",
            "--package-file",
            "p.zip",
        ]);
        assert!(both.is_err());

        let ok = Cli::try_parse_from([
            "evanchor",
            "anchor",
            "package",
            "--package-id",
            "p",
            "--package-file",
            "p.zip",
        ]);
        assert!(ok.is_ok());
    }

    #[test]
    fn test_cli_parse_anchor_program_policy() {
        let cli = Cli::try_parse_from([
            "evanchor",
            "anchor",
            "program",
            "--policy",
            "reject-existing",
        ])
        .unwrap();
        let Commands::Anchor(args) = cli.command else {
            panic!("expected anchor");
        };
        assert!(matches!(
            args.command,
            AnchorCommand::Program {
                policy: ReanchorPolicy::RejectExisting,
                clear: false
            }
        ));
    }

    #[test]
    fn test_cli_parse_verbose_levels() {
        let cli0 = Cli::try_parse_from(["evanchor", "anchor", "deploy"]).unwrap();
        assert_eq!(cli0.verbose, 0);
        let cli2 = Cli::try_parse_from(["evanchor", "-vv", "anchor", "deploy"]).unwrap();
        assert_eq!(cli2.verbose, 2);
        let cli_json = Cli::try_parse_from(["evanchor", "anchor", "deploy", "--log-json"]).unwrap();
        assert!(cli_json.log_json);
    }

    #[test]
    fn test_cli_parse_no_subcommand_errors() {
        assert!(Cli::try_parse_from(["evanchor"]).is_err());
        assert!(Cli::try_parse_from(["evanchor", "nonexistent"]).is_err());
    }
}
