use std::path::PathBuf;

use alloy_core::primitives::Address;
use clap::Parser;
use dapploy_deploy::{DeployConfig, FundingAmount};
use tracing::level_filters::LevelFilter;
use url::Url;

/// Parse a `KEY=ADDRESS` constant.
fn parse_constant(s: &str) -> Result<(String, Address), String> {
    let (key, address) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=ADDRESS, got `{s}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty constant key in `{s}`"));
    }
    let address = address
        .trim()
        .parse::<Address>()
        .map_err(|e| format!("invalid address for {key}: {e}"))?;
    Ok((key.to_string(), address))
}

#[derive(Parser, Debug)]
#[command(
    name = "dapploy",
    version,
    about = "Deploy the NFT marketplace and the DAO that trades through it"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "DAPPLOY_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a Dapploy.toml file, or a directory containing one.
    ///
    /// If not provided, ./Dapploy.toml is read when it exists.
    #[arg(short, long, alias = "conf")]
    pub config: Option<PathBuf>,

    /// JSON-RPC endpoint of the node that signs and broadcasts the deployments.
    #[arg(long, alias = "rpc")]
    pub rpc_url: Option<Url>,

    /// Account the deployments are sent from. Defaults to the node's first account.
    #[arg(long)]
    pub deployer: Option<Address>,

    /// Directory holding the compiled contract artifacts.
    #[arg(long, alias = "artifacts")]
    pub artifacts_dir: Option<PathBuf>,

    /// Pre-existing contract address, as KEY=ADDRESS. Repeatable.
    ///
    /// The DAO needs `crypto_devs_nft`.
    #[arg(long = "constant", value_name = "KEY=ADDRESS", value_parser = parse_constant)]
    pub constants: Vec<(String, Address)>,

    /// Ether sent to the DAO with its deployment.
    #[arg(long, alias = "dao-funding")]
    pub funding: Option<FundingAmount>,

    /// Upper bound on each confirmation wait, in seconds. 0 waits forever.
    #[arg(long = "timeout", value_name = "SECS")]
    pub confirmation_timeout_secs: Option<u64>,

    /// Write a JSON manifest of the deployed contracts to this path.
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Save the resolved configuration to this TOML file before deploying.
    #[arg(long)]
    pub save_config: Option<PathBuf>,

    /// Run the pipeline against an in-memory chain instead of a node.
    #[arg(long)]
    pub dry_run: bool,

    /// Make the in-memory chain reject the deployment of this contract. Repeatable.
    #[arg(long, value_name = "NAME", requires = "dry_run", hide = true)]
    pub dry_run_reject: Vec<String>,
}

impl Cli {
    /// Apply the command line on top of the loaded configuration.
    pub fn apply(&self, mut config: DeployConfig) -> DeployConfig {
        if let Some(rpc_url) = &self.rpc_url {
            config.rpc_url = rpc_url.clone();
        }
        if let Some(deployer) = self.deployer {
            config.deployer = Some(deployer);
        }
        if let Some(artifacts_dir) = &self.artifacts_dir {
            config.artifacts_dir = artifacts_dir.clone();
        }
        config.constants.extend(self.constants.iter().cloned());
        if let Some(funding) = self.funding {
            config.dao_funding = Some(funding);
        }
        if let Some(timeout) = self.confirmation_timeout_secs {
            config.confirmation_timeout_secs = timeout;
        }
        if let Some(manifest) = &self.manifest {
            config.manifest = Some(manifest.clone());
        }
        config
    }
}
