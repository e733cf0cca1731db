//! Layered deployment configuration.
//!
//! Values come from, in increasing priority: built-in defaults, a TOML file
//! (`Dapploy.toml` by default), and `DAPPLOY_*` environment variables. The binary applies
//! CLI flags on top.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{DeployError, DeploymentPlan, DeploymentTarget, FundingAmount};

/// The default name of the configuration file.
pub const CONFIG_FILENAME: &str = "Dapploy.toml";

/// Prefix of the environment variables read by [`DeployConfig::load`].
pub const ENV_PREFIX: &str = "DAPPLOY_";

/// Default JSON-RPC endpoint (local Hardhat node or Anvil).
pub const DEFAULT_RPC_URL: &str = "http://localhost:8545/";

/// Default upper bound on a single confirmation wait.
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 300;

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Everything a run needs from the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// JSON-RPC endpoint of the node that signs and broadcasts deployments.
    pub rpc_url: Url,
    /// Account deployments are sent from. Defaults to the node's first account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployer: Option<Address>,
    /// Directory holding the compiled artifacts.
    pub artifacts_dir: PathBuf,
    /// Upper bound on each confirmation wait, in seconds. `0` waits forever.
    pub confirmation_timeout_secs: u64,
    /// Interval between receipt polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Pre-existing contract addresses, by key.
    #[serde(default)]
    pub constants: BTreeMap<String, Address>,
    /// Ether sent to the DAO with its deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dao_funding: Option<FundingAmount>,
    /// Where to write the deployment manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PathBuf>,
    /// Custom plan. Empty means the built-in marketplace/DAO plan.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<DeploymentTarget>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            rpc_url: Url::parse(DEFAULT_RPC_URL).expect("default RPC URL is valid"),
            deployer: None,
            artifacts_dir: PathBuf::from("artifacts"),
            confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            constants: BTreeMap::new(),
            dao_funding: Some(FundingAmount::ONE_ETHER),
            manifest: None,
            targets: Vec::new(),
        }
    }
}

impl DeployConfig {
    /// Load the configuration.
    ///
    /// With `path`, the file (or `Dapploy.toml` inside the directory) must exist. Without it,
    /// `./Dapploy.toml` is read if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!(
                        "Configuration file or directory not found: {}",
                        path.display()
                    );
                }
                if path.is_dir() {
                    path.join(CONFIG_FILENAME)
                } else {
                    path.to_path_buf()
                }
            }
            None => PathBuf::from(CONFIG_FILENAME),
        };

        let config: Self = Self::figment(&file)
            .extract()
            .context("Failed to load deployment configuration")?;

        tracing::debug!(path = %file.display(), rpc_url = %config.rpc_url, "Configuration loaded");
        Ok(config)
    }

    /// The figment [`load`](Self::load) extracts from.
    pub fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize deployment config to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// `None` when the wait is unbounded.
    pub fn confirmation_timeout(&self) -> Option<Duration> {
        (self.confirmation_timeout_secs > 0)
            .then(|| Duration::from_secs(self.confirmation_timeout_secs))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// The DAO funding, or [`DeployError::ConfigurationMissing`] when it was unset.
    pub fn dao_funding(&self) -> Result<FundingAmount, DeployError> {
        self.dao_funding
            .ok_or_else(|| DeployError::ConfigurationMissing("dao_funding".to_string()))
    }

    /// The plan to run: the configured targets, or the built-in marketplace/DAO plan.
    pub fn plan(&self) -> Result<DeploymentPlan, DeployError> {
        if self.targets.is_empty() {
            Ok(DeploymentPlan::marketplace_dao(self.dao_funding()?))
        } else {
            Ok(DeploymentPlan::new(self.targets.clone()))
        }
    }
}
