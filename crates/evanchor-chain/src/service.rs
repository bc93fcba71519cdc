//! # Anchor Service
//!
//! Package-level anchoring on top of [`AnchorClient`]: validates a request,
//! submits the funded anchor group with the custodial signer, and returns an
//! [`AnchorRecord`]. [`AnchorService::batch_anchor`] commits many packages
//! under one Merkle root in a single box and hands out an inclusion proof
//! per package. Verification reads the box back and compares it with the
//! record.
//!
//! The service is cheap to share behind an `Arc`. The application id can be
//! set after construction (by [`AnchorService::deploy_contract`]); everything
//! else is fixed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use evanchor_core::{Hash32, HashAlgorithm, PackageId, ValidationError};
use evanchor_crypto::{verify_proof, CustodialKey, MerkleTree};

use crate::address::Address;
use crate::algod::Algod;
use crate::client::{build_funded_anchor_group, AnchorArgs, AnchorClient, DeployResult};
use crate::config::{AnchorConfig, DEFAULT_FUNDING_MICROALGOS};
use crate::error::AnchoringError;
use crate::program::{box_min_balance, ReanchorPolicy};
use crate::record::{
    anchor_id, batch_box_id, batch_manifest_hash, AnchorPackageRequest, AnchorRecord,
    AnchorStatus, AnchorStatusReport, BatchPackage, CostEstimate, Network, BLOCKCHAIN,
};

/// A confirmed anchor group.
struct Submission {
    app_id: u64,
    sender: Address,
    txid: String,
    confirmed_round: u64,
    transaction_fee: u64,
    anchored_at: DateTime<Utc>,
}

/// Outcome of comparing an on-chain box with a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorVerification {
    /// Box package hash equals the record's.
    pub package_hash_matches: bool,
    /// Box merkle root equals the record's.
    pub merkle_root_matches: bool,
    /// Box sender equals the record's signer.
    pub signer_matches: bool,
    /// Timestamp stored in the box.
    pub on_chain_timestamp: u64,
}

impl AnchorVerification {
    /// All fields match.
    pub fn is_valid(&self) -> bool {
        self.package_hash_matches && self.merkle_root_matches && self.signer_matches
    }
}

/// Anchors packages with a custodial signer.
#[derive(Debug)]
pub struct AnchorService<A> {
    client: AnchorClient<A>,
    network: Network,
    app_id: RwLock<Option<u64>>,
    signer: Option<Arc<CustodialKey>>,
    funding_microalgos: u64,
    policy: ReanchorPolicy,
}

impl<A: Algod> AnchorService<A> {
    /// Service with no application and no signer configured.
    pub fn new(client: AnchorClient<A>, network: Network) -> Self {
        Self {
            client,
            network,
            app_id: RwLock::new(None),
            signer: None,
            funding_microalgos: DEFAULT_FUNDING_MICROALGOS,
            policy: ReanchorPolicy::Overwrite,
        }
    }

    /// Service configured from [`AnchorConfig`] over the given backend.
    pub fn from_config(algod: Arc<A>, config: &AnchorConfig) -> Result<Self, AnchoringError> {
        let client = AnchorClient::new(algod).with_wait_rounds(config.wait_rounds);
        let mut service = Self::new(client, config.network)
            .with_funding(config.funding_microalgos)
            .with_policy(config.reanchor_policy);
        if let Some(app_id) = config.app_id {
            service = service.with_app_id(app_id);
        }
        if let Some(signer) = config.signer()? {
            service = service.with_signer(signer);
        }
        Ok(service)
    }

    /// Use an already deployed application.
    pub fn with_app_id(self, app_id: u64) -> Self {
        *self.app_id.write() = Some(app_id);
        self
    }

    /// Sign with `signer`.
    pub fn with_signer(mut self, signer: Arc<CustodialKey>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Amount sent to the application account with each anchor.
    pub fn with_funding(mut self, microalgos: u64) -> Self {
        self.funding_microalgos = microalgos;
        self
    }

    /// Re-anchor policy used by [`deploy_contract`](Self::deploy_contract).
    pub fn with_policy(mut self, policy: ReanchorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Underlying client.
    pub fn client(&self) -> &AnchorClient<A> {
        &self.client
    }

    /// Configured application, if any.
    pub fn app_id(&self) -> Option<u64> {
        *self.app_id.read()
    }

    /// Network of this service.
    pub fn network(&self) -> Network {
        self.network
    }

    /// Address of the custodial signer, if any.
    pub fn signer_address(&self) -> Option<Address> {
        self.signer
            .as_ref()
            .map(|k| Address::from_public_key(k.public_key()))
    }

    fn require_signer(&self) -> Result<&Arc<CustodialKey>, AnchoringError> {
        self.signer.as_ref().ok_or(AnchoringError::MissingSigner)
    }

    fn require_app_id(&self) -> Result<u64, AnchoringError> {
        self.app_id().ok_or(AnchoringError::MissingAppId)
    }

    /// Explorer link for a transaction on this network.
    pub fn explorer_url(&self, txid: &str) -> String {
        self.network.explorer_url(txid)
    }

    /// Deploy the anchor program with the custodial signer and remember its id.
    pub async fn deploy_contract(&self) -> Result<DeployResult, AnchoringError> {
        let signer = self.require_signer()?;
        let result = self.client.deploy(signer, self.policy).await?;
        *self.app_id.write() = Some(result.app_id);
        Ok(result)
    }

    /// Anchor one package and wait for confirmation.
    pub async fn anchor_package(
        &self,
        request: AnchorPackageRequest,
    ) -> Result<AnchorRecord, AnchoringError> {
        let args = AnchorArgs::with_default_root(
            request.package_id.as_str(),
            &request.package_hash,
            request.merkle_root.as_deref(),
            None,
        )?;
        let sub = self.submit(&args).await?;
        Ok(AnchorRecord {
            anchor_id: anchor_id(&args.package_id, &sub.txid),
            package_id: args.package_id.clone(),
            blockchain: BLOCKCHAIN.into(),
            package_hash: args.package_hash.to_hex(),
            merkle_root: args.merkle_root.to_hex(),
            transaction_hash: sub.txid,
            block_number: Some(sub.confirmed_round),
            app_id: sub.app_id,
            network: self.network,
            status: AnchorStatus::Confirmed,
            anchored_by: request.anchored_by,
            signer_address: sub.sender.encode(),
            anchor_timestamp: args.timestamp,
            anchored_at: sub.anchored_at,
            confirmed_at: Some(Utc::now()),
            transaction_fee: sub.transaction_fee,
            batch_id: None,
            inclusion_proof: Vec::new(),
        })
    }

    /// Anchor many packages with one transaction group.
    ///
    /// The package hashes, in order, are the leaves of a SHA-256 Merkle tree.
    /// Its root is written to a box named by [`batch_box_id`] together with
    /// [`batch_manifest_hash`] of the package ids. Each returned record
    /// carries the batch root and the package's inclusion proof.
    pub async fn batch_anchor(
        &self,
        packages: &[BatchPackage],
        anchored_by: &str,
    ) -> Result<Vec<AnchorRecord>, AnchoringError> {
        if packages.is_empty() {
            return Err(ValidationError::EmptyLeafSet.into());
        }
        let leaves = packages
            .iter()
            .map(|p| Hash32::from_hex("package_hash", &p.package_hash).map(|h| h.to_hex()))
            .collect::<Result<Vec<_>, _>>()?;
        let mut tree = MerkleTree::from_leaf_hashes(leaves.iter().cloned(), HashAlgorithm::Sha256);
        let root = tree.build()?;
        let batch_id = batch_box_id(&root)?;
        let args = AnchorArgs::new(
            batch_id.as_str(),
            &batch_manifest_hash(packages),
            &root,
            None,
        )?;

        tracing::info!(batch_id = %batch_id, packages = packages.len(), "anchoring batch");
        let sub = self.submit(&args).await?;
        let confirmed_at = Utc::now();

        packages
            .iter()
            .zip(leaves)
            .enumerate()
            .map(|(i, (p, leaf))| {
                Ok(AnchorRecord {
                    anchor_id: anchor_id(&p.package_id, &sub.txid),
                    package_id: p.package_id.clone(),
                    blockchain: BLOCKCHAIN.into(),
                    package_hash: leaf,
                    merkle_root: root.clone(),
                    transaction_hash: sub.txid.clone(),
                    block_number: Some(sub.confirmed_round),
                    app_id: sub.app_id,
                    network: self.network,
                    status: AnchorStatus::Confirmed,
                    anchored_by: anchored_by.to_string(),
                    signer_address: sub.sender.encode(),
                    anchor_timestamp: args.timestamp,
                    anchored_at: sub.anchored_at,
                    confirmed_at: Some(confirmed_at),
                    transaction_fee: sub.transaction_fee,
                    batch_id: Some(batch_id.clone()),
                    inclusion_proof: tree.get_proof(i)?,
                })
            })
            .collect()
    }

    async fn submit(&self, args: &AnchorArgs) -> Result<Submission, AnchoringError> {
        let app_id = self.require_app_id()?;
        let signer = self.require_signer()?;
        let sender = Address::from_public_key(signer.public_key());

        let params = self.client.suggested_params().await?;
        let group = build_funded_anchor_group(
            &params,
            sender,
            app_id,
            args,
            self.funding_microalgos,
        )?;
        let transaction_fee: u64 = group.iter().map(|t| t.fee).sum();
        let anchored_at = Utc::now();

        tracing::info!(
            package_id = %args.package_id,
            app_id,
            funding = self.funding_microalgos,
            "anchoring package"
        );
        let confirmation = self.client.sign_and_send_group(group, signer).await?;
        Ok(Submission {
            app_id,
            sender,
            txid: confirmation.last_txid().to_string(),
            confirmed_round: confirmation.confirmed_round,
            transaction_fee,
            anchored_at,
        })
    }

    /// Read the record's box and compare it with `record`.
    ///
    /// For batch records the package hash is checked through the inclusion
    /// proof against the on-chain root.
    pub async fn verify_anchor(
        &self,
        record: &AnchorRecord,
    ) -> Result<AnchorVerification, AnchoringError> {
        let anchor = self
            .client
            .read_anchor_box(record.app_id, record.box_name().as_str())
            .await?;
        let package_hash = record.package_hash.to_ascii_lowercase();
        let package_hash_matches = if record.batch_id.is_some() {
            verify_proof(
                HashAlgorithm::Sha256,
                &package_hash,
                &record.inclusion_proof,
                &anchor.merkle_root_hex(),
            )
        } else {
            anchor.package_hash_hex() == package_hash
        };
        let verification = AnchorVerification {
            package_hash_matches,
            merkle_root_matches: anchor.merkle_root_hex() == record.merkle_root.to_ascii_lowercase(),
            signer_matches: anchor.anchored_by.encode() == record.signer_address,
            on_chain_timestamp: anchor.timestamp,
        };
        if !verification.is_valid() {
            tracing::warn!(
                package_id = %record.package_id,
                ?verification,
                "on-chain anchor does not match record"
            );
        }
        Ok(verification)
    }

    /// Confirmation depth of `txid`.
    pub async fn anchor_status(&self, txid: &str) -> Result<AnchorStatusReport, AnchoringError> {
        let pending = self.client.algod().pending_transaction(txid).await?;
        if !pending.pool_error.is_empty() {
            return Ok(AnchorStatusReport {
                transaction_hash: txid.to_string(),
                status: AnchorStatus::Failed,
                block_number: None,
                confirmations: 0,
            });
        }
        let last_round = self.client.algod().status().await?.last_round;
        Ok(AnchorStatusReport::from_rounds(
            txid,
            pending.confirmed_round,
            last_round,
        ))
    }

    /// Fees and box minimum balance of anchoring `package_id`.
    pub async fn estimate_cost(&self, package_id: &str) -> Result<CostEstimate, AnchoringError> {
        let id = PackageId::new(package_id)?;
        let params = self.client.suggested_params().await?;
        let transaction_fee = params.fee * 2;
        let box_min_balance = box_min_balance(id.as_bytes().len());
        Ok(CostEstimate {
            transaction_fee,
            box_min_balance,
            total: transaction_fee + box_min_balance,
        })
    }
}

impl<A: Algod + 'static> AnchorService<A> {
    /// Run [`anchor_package`](Self::anchor_package) on a tokio worker task.
    ///
    /// Aborting the handle stops observing the confirmation; a submitted
    /// group may still land.
    pub fn spawn_anchor(
        self: &Arc<Self>,
        request: AnchorPackageRequest,
    ) -> JoinHandle<Result<AnchorRecord, AnchoringError>> {
        let service = Arc::clone(self);
        tokio::spawn(async move { service.anchor_package(request).await })
    }
}

/// Await a spawned anchor, folding task failures into [`AnchoringError::Task`].
pub async fn join_anchor(
    handle: JoinHandle<Result<AnchorRecord, AnchoringError>>,
) -> Result<AnchorRecord, AnchoringError> {
    handle
        .await
        .map_err(|e| AnchoringError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedLedger;

    fn service() -> AnchorService<SimulatedLedger> {
        AnchorService::new(
            AnchorClient::new(Arc::new(SimulatedLedger::new())),
            Network::Testnet,
        )
    }

    fn request() -> AnchorPackageRequest {
        AnchorPackageRequest {
            package_id: PackageId::new("pkg").unwrap(),
            package_hash: "ab".repeat(32),
            merkle_root: None,
            anchored_by: "user".into(),
        }
    }

    #[tokio::test]
    async fn test_missing_app_id_reported_before_network() {
        let err = service().anchor_package(request()).await.unwrap_err();
        assert!(matches!(err, AnchoringError::MissingAppId));
    }

    #[tokio::test]
    async fn test_missing_signer_reported() {
        let svc = service().with_app_id(1);
        let err = svc.anchor_package(request()).await.unwrap_err();
        assert!(matches!(err, AnchoringError::MissingSigner));
        assert!(matches!(
            svc.deploy_contract().await.unwrap_err(),
            AnchoringError::MissingSigner
        ));
    }

    #[tokio::test]
    async fn test_invalid_hash_is_validation_error() {
        let svc = service().with_app_id(1);
        let mut req = request();
        req.package_hash = "abc".into();
        let err = svc.anchor_package(req).await.unwrap_err();
        assert!(matches!(err, AnchoringError::Validation(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let svc = service().with_app_id(1);
        let err = svc.batch_anchor(&[], "user").await.unwrap_err();
        assert!(matches!(
            err,
            AnchoringError::Validation(ValidationError::EmptyLeafSet)
        ));
    }

    #[tokio::test]
    async fn test_batch_with_bad_hash_is_validation_error() {
        let svc = service().with_app_id(1);
        let packages = [BatchPackage {
            package_id: PackageId::new("pkg").unwrap(),
            package_hash: "xyz".into(),
        }];
        let err = svc.batch_anchor(&packages, "user").await.unwrap_err();
        assert!(matches!(err, AnchoringError::Validation(_)));
    }

    #[tokio::test]
    async fn test_cost_estimate_uses_min_fee_and_box_size() {
        let cost = service().estimate_cost("pkg_demo_001").await.unwrap();
        assert_eq!(cost.transaction_fee, 2_000);
        assert_eq!(cost.box_min_balance, 2_500 + 400 * (12 + 104));
        assert_eq!(cost.total, cost.transaction_fee + cost.box_min_balance);
    }

    #[test]
    fn test_explorer_url_follows_network() {
        let svc = AnchorService::new(
            AnchorClient::new(Arc::new(SimulatedLedger::new())),
            Network::Mainnet,
        );
        assert_eq!(svc.explorer_url("X"), "https://algoexplorer.io/tx/X");
    }
}
