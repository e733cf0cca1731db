//! Deployment manifest.
//!
//! A JSON record of what a run confirmed, keyed by a hash of the plan that produced it.

use std::{collections::BTreeMap, path::Path};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{DeployedContract, DeploymentLog, DeploymentPlan};

/// Inputs that determine what a run deploys.
#[derive(Serialize)]
struct PlanFingerprint<'a> {
    plan: &'a DeploymentPlan,
    constants: &'a BTreeMap<String, Address>,
}

/// Compute a SHA-256 hash of a plan and the constants it is resolved against.
///
/// The same plan with the same constants always produces the same hash, so two manifests
/// with equal hashes describe the same intended deployment.
pub fn plan_hash(plan: &DeploymentPlan, constants: &BTreeMap<String, Address>) -> Result<String> {
    let json = serde_json::to_string(&PlanFingerprint { plan, constants })
        .context("Failed to serialize deployment plan")?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Record of a run, written after the pipeline stops.
///
/// Only confirmed contracts are listed. `complete` is false when the run stopped early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentManifest {
    /// SHA-256 hash of the plan and constants
    pub plan_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Unix timestamp of the run
    pub deployed_at: i64,
    pub dapploy_version: String,
    pub complete: bool,
    pub contracts: Vec<DeployedContract>,
}

impl DeploymentManifest {
    pub fn new(
        plan: &DeploymentPlan,
        constants: &BTreeMap<String, Address>,
        log: &DeploymentLog,
        chain_id: Option<u64>,
    ) -> Result<Self> {
        let contracts: Vec<DeployedContract> = log.confirmed().cloned().collect();
        let complete = plan
            .iter()
            .all(|target| contracts.iter().any(|c| c.name == target.name));

        Ok(Self {
            plan_hash: plan_hash(plan, constants)?,
            chain_id,
            deployed_at: chrono::Utc::now().timestamp(),
            dapploy_version: env!("CARGO_PKG_VERSION").to_string(),
            complete,
            contracts,
        })
    }

    /// Address of a confirmed contract.
    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.contracts
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.address)
    }

    /// Save the manifest as formatted JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize deployment manifest")?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        std::fs::write(path, json).with_context(|| {
            format!("Failed to write deployment manifest to {}", path.display())
        })?;

        tracing::info!(
            path = %path.display(),
            contracts = self.contracts.len(),
            "Deployment manifest written"
        );
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Deployment manifest does not exist: {}", path.display());
        }

        let content = std::fs::read_to_string(path).with_context(|| {
            format!("Failed to read deployment manifest from {}", path.display())
        })?;

        serde_json::from_str(&content).context("Failed to parse deployment manifest JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        FundingAmount,
        plan::{DAO_CONTRACT, MARKETPLACE_CONTRACT, NFT_CONSTANT_KEY},
    };
    use alloy_core::primitives::address;
    use tempdir::TempDir;

    const NFT: Address = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");

    fn plan(funding: &str) -> DeploymentPlan {
        DeploymentPlan::marketplace_dao(FundingAmount::from_ether(funding).unwrap())
    }

    fn constants() -> BTreeMap<String, Address> {
        BTreeMap::from([(NFT_CONSTANT_KEY.to_string(), NFT)])
    }

    fn confirm(log: &mut DeploymentLog, name: &str, address: Address) {
        log.begin(name).unwrap();
        log.record_pending(name, address, None).unwrap();
        log.confirm(name, address).unwrap();
    }

    #[test]
    fn test_plan_hash_determinism() {
        let hash = plan_hash(&plan("1"), &constants()).unwrap();
        assert_eq!(hash, plan_hash(&plan("1"), &constants()).unwrap());
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_plan_hash_changes_with_inputs() {
        let base = plan_hash(&plan("1"), &constants()).unwrap();

        assert_ne!(base, plan_hash(&plan("2"), &constants()).unwrap());
        assert_ne!(base, plan_hash(&plan("1"), &BTreeMap::new()).unwrap());
    }

    #[test]
    fn test_partial_run_is_incomplete() {
        let marketplace = address!("0x5FbDB2315678afecb367f032d93F642f64180aa3");
        let mut log = DeploymentLog::default();
        confirm(&mut log, MARKETPLACE_CONTRACT, marketplace);
        log.begin(DAO_CONTRACT).unwrap();
        log.fail(DAO_CONTRACT).unwrap();

        let manifest =
            DeploymentManifest::new(&plan("1"), &constants(), &log, Some(31337)).unwrap();

        assert!(!manifest.complete);
        assert_eq!(manifest.contracts.len(), 1);
        assert_eq!(manifest.address_of(MARKETPLACE_CONTRACT), Some(marketplace));
        assert_eq!(manifest.address_of(DAO_CONTRACT), None);
    }

    #[test]
    fn test_manifest_save_and_load() {
        let temp_dir = TempDir::new("dapploy-test").unwrap();
        let path = temp_dir.path().join("deployments/localhost.json");

        let mut log = DeploymentLog::default();
        let marketplace = address!("0x5FbDB2315678afecb367f032d93F642f64180aa3");
        let dao = address!("0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512");
        confirm(&mut log, MARKETPLACE_CONTRACT, marketplace);
        confirm(&mut log, DAO_CONTRACT, dao);

        let manifest =
            DeploymentManifest::new(&plan("1"), &constants(), &log, Some(31337)).unwrap();
        assert!(manifest.complete);

        manifest.save_to_file(&path).unwrap();
        let loaded = DeploymentManifest::load_from_file(&path).unwrap();

        assert_eq!(manifest, loaded);
    }

    #[test]
    fn test_manifest_load_missing_or_corrupted() {
        let temp_dir = TempDir::new("dapploy-test").unwrap();
        let path = temp_dir.path().join("manifest.json");
        assert!(DeploymentManifest::load_from_file(&path).is_err());

        std::fs::write(&path, "{ invalid json }").unwrap();
        assert!(DeploymentManifest::load_from_file(&path).is_err());
    }
}
