//! Anchoring configuration.
//!
//! Defaults target the public testnet node. Override via environment
//! variables or explicit construction for other networks and tests.

use std::sync::Arc;

use url::Url;
use zeroize::Zeroizing;

use evanchor_crypto::CustodialKey;

use crate::program::ReanchorPolicy;
use crate::record::Network;

/// Default algod endpoint.
pub const DEFAULT_ALGOD_URL: &str = "https://testnet-api.algonode.cloud";

/// Default amount sent to the application account with each anchor.
pub const DEFAULT_FUNDING_MICROALGOS: u64 = 300_000;

/// Default number of rounds to wait for confirmation.
pub const DEFAULT_WAIT_ROUNDS: u64 = 8;

/// Configuration for the anchor service.
///
/// Custom `Debug` redacts the API token and the signer seed.
#[derive(Clone)]
pub struct AnchorConfig {
    /// algod base URL.
    pub algod_url: Url,
    /// algod API token; may be empty for public nodes.
    pub algod_token: Zeroizing<String>,
    /// Network the node belongs to (explorer links).
    pub network: Network,
    /// Deployed anchor application, if any.
    pub app_id: Option<u64>,
    /// Hex Ed25519 seed of the custodial signer, if any.
    pub signer_seed: Option<Zeroizing<String>>,
    /// Microalgos sent to the application account with each anchor.
    pub funding_microalgos: u64,
    /// Rounds to wait for confirmation.
    pub wait_rounds: u64,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
    /// Re-anchor behaviour of newly deployed programs.
    pub reanchor_policy: ReanchorPolicy,
}

impl std::fmt::Debug for AnchorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorConfig")
            .field("algod_url", &self.algod_url)
            .field("algod_token", &"[REDACTED]")
            .field("network", &self.network)
            .field("app_id", &self.app_id)
            .field(
                "signer_seed",
                &self.signer_seed.as_ref().map(|_| "[REDACTED]"),
            )
            .field("funding_microalgos", &self.funding_microalgos)
            .field("wait_rounds", &self.wait_rounds)
            .field("timeout_secs", &self.timeout_secs)
            .field("reanchor_policy", &self.reanchor_policy)
            .finish()
    }
}

impl AnchorConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `EVANCHOR_ALGOD_URL` (default: `https://testnet-api.algonode.cloud`)
    /// - `EVANCHOR_ALGOD_TOKEN` (default: empty)
    /// - `EVANCHOR_NETWORK` (default: `testnet`)
    /// - `EVANCHOR_APP_ID`
    /// - `EVANCHOR_SIGNER_SEED` (hex, 32 bytes)
    /// - `EVANCHOR_FUNDING_MICROALGOS` (default: 300000)
    /// - `EVANCHOR_WAIT_ROUNDS` (default: 8)
    /// - `EVANCHOR_TIMEOUT_SECS` (default: 30)
    /// - `EVANCHOR_REANCHOR_POLICY` (`overwrite` or `reject-existing`, default: `overwrite`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let network = match get("EVANCHOR_NETWORK") {
            Some(v) => v.parse().map_err(|reason| ConfigError::InvalidValue {
                var: "EVANCHOR_NETWORK".into(),
                value: v.clone(),
                reason,
            })?,
            None => Network::Testnet,
        };
        let raw_url =
            get("EVANCHOR_ALGOD_URL").unwrap_or_else(|| network.default_algod_url().to_string());
        let algod_url = Url::parse(&raw_url)
            .map_err(|e| ConfigError::InvalidUrl("EVANCHOR_ALGOD_URL".into(), e.to_string()))?;
        let reanchor_policy = match get("EVANCHOR_REANCHOR_POLICY") {
            Some(v) => v.parse().map_err(|reason| ConfigError::InvalidValue {
                var: "EVANCHOR_REANCHOR_POLICY".into(),
                value: v.clone(),
                reason,
            })?,
            None => ReanchorPolicy::Overwrite,
        };

        Ok(Self {
            algod_url,
            algod_token: Zeroizing::new(get("EVANCHOR_ALGOD_TOKEN").unwrap_or_default()),
            network,
            app_id: parse_opt(&get, "EVANCHOR_APP_ID")?,
            signer_seed: get("EVANCHOR_SIGNER_SEED").map(Zeroizing::new),
            funding_microalgos: parse_opt(&get, "EVANCHOR_FUNDING_MICROALGOS")?
                .unwrap_or(DEFAULT_FUNDING_MICROALGOS),
            wait_rounds: parse_opt(&get, "EVANCHOR_WAIT_ROUNDS")?.unwrap_or(DEFAULT_WAIT_ROUNDS),
            timeout_secs: parse_opt(&get, "EVANCHOR_TIMEOUT_SECS")?.unwrap_or(30),
            reanchor_policy,
        })
    }

    /// Configuration pointing at a local node (for testing).
    pub fn local(port: u16) -> Result<Self, ConfigError> {
        let algod_url = Url::parse(&format!("http://127.0.0.1:{port}"))
            .map_err(|e| ConfigError::InvalidUrl("localhost".to_string(), e.to_string()))?;
        Ok(Self {
            algod_url,
            algod_token: Zeroizing::new(String::new()),
            network: Network::Localnet,
            app_id: None,
            signer_seed: None,
            funding_microalgos: DEFAULT_FUNDING_MICROALGOS,
            wait_rounds: DEFAULT_WAIT_ROUNDS,
            timeout_secs: 5,
            reanchor_policy: ReanchorPolicy::Overwrite,
        })
    }

    /// Parse the configured signer seed, if any.
    pub fn signer(&self) -> Result<Option<Arc<CustodialKey>>, ConfigError> {
        self.signer_seed
            .as_ref()
            .map(|seed| {
                CustodialKey::from_seed_hex(seed).map(Arc::new).map_err(|e| {
                    ConfigError::InvalidValue {
                        var: "EVANCHOR_SIGNER_SEED".into(),
                        value: "[REDACTED]".into(),
                        reason: e.to_string(),
                    }
                })
            })
            .transpose()
    }
}

fn parse_opt(
    get: &impl Fn(&str) -> Option<String>,
    var: &str,
) -> Result<Option<u64>, ConfigError> {
    get(var)
        .map(|v| {
            v.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                var: var.to_string(),
                value: v.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A URL variable does not parse.
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    /// A variable holds an unusable value.
    #[error("invalid value \"{value}\" for {var}: {reason}")]
    InvalidValue {
        /// Variable name.
        var: String,
        /// Offending value (redacted for secrets).
        value: String,
        /// Parse failure.
        reason: String,
    },
}
