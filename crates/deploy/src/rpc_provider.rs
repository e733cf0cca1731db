//! Contract factory provider backed by a JSON-RPC node.
//!
//! The node holds the deployer account unlocked (Hardhat node, Anvil, or any dev node), so
//! transactions go out through `eth_sendTransaction` and no key material is handled here.

use std::{sync::Arc, time::Duration};

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, Bytes, U64, U256},
};
use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

use crate::{
    ArtifactStore, ContractFactory, ContractFactoryProvider, DeployConfig, PendingDeployment, rpc,
};

/// Subset of a transaction receipt needed to confirm a deployment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    #[serde(default)]
    contract_address: Option<Address>,
    /// Absent on pre-Byzantium chains.
    #[serde(default)]
    status: Option<U64>,
}

#[derive(Debug)]
struct RpcInner {
    client: reqwest::Client,
    url: Url,
    deployer: Address,
    artifacts: ArtifactStore,
    poll_interval: Duration,
}

/// Provider that deploys through a JSON-RPC node.
#[derive(Debug, Clone)]
pub struct RpcProvider {
    inner: Arc<RpcInner>,
}

impl RpcProvider {
    /// Connect to the configured node and settle the deployer account.
    pub async fn connect(config: &DeployConfig) -> Result<Self> {
        let client = rpc::create_client()?;

        let deployer = match config.deployer {
            Some(deployer) => deployer,
            None => {
                let accounts: Vec<Address> =
                    rpc::json_rpc_call(&client, config.rpc_url.as_str(), "eth_accounts", vec![])
                        .await
                        .context("Failed to list node accounts")?;
                accounts.first().copied().with_context(|| {
                    format!(
                        "Node at {} exposes no unlocked account; set `deployer`",
                        config.rpc_url
                    )
                })?
            }
        };

        tracing::info!(
            rpc_url = %config.rpc_url,
            deployer = %deployer,
            artifacts_dir = %config.artifacts_dir.display(),
            "Connected to JSON-RPC provider"
        );

        Ok(Self {
            inner: Arc::new(RpcInner {
                client,
                url: config.rpc_url.clone(),
                deployer,
                artifacts: ArtifactStore::new(&config.artifacts_dir),
                poll_interval: config.poll_interval(),
            }),
        })
    }

    pub fn deployer(&self) -> Address {
        self.inner.deployer
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let chain_id: String = self.call("eth_chainId", vec![]).await?;
        rpc::parse_quantity(&chain_id)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<T> {
        rpc::json_rpc_call(&self.inner.client, self.inner.url.as_str(), method, params).await
    }

    async fn pending_nonce(&self) -> Result<u64> {
        let nonce: String = self
            .call(
                "eth_getTransactionCount",
                vec![
                    serde_json::json!(self.inner.deployer),
                    serde_json::json!("pending"),
                ],
            )
            .await
            .context("Failed to fetch deployer nonce")?;
        rpc::parse_quantity(&nonce)
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<TransactionReceipt>> {
        self.call("eth_getTransactionReceipt", vec![serde_json::json!(tx_hash)])
            .await
    }
}

impl ContractFactoryProvider for RpcProvider {
    type Factory = RpcFactory;

    async fn resolve(&self, name: &str) -> Result<RpcFactory> {
        let artifact = self.inner.artifacts.load(name)?;
        Ok(RpcFactory {
            name: artifact.contract_name,
            bytecode: artifact.bytecode,
            provider: self.clone(),
        })
    }
}

/// Creation code followed by the ABI-encoded constructor arguments.
pub fn creation_data(bytecode: &Bytes, args: &[DynSolValue]) -> Bytes {
    let mut data = bytecode.to_vec();
    if !args.is_empty() {
        data.extend(DynSolValue::Tuple(args.to_vec()).abi_encode_params());
    }
    Bytes::from(data)
}

/// Factory for one compiled contract.
#[derive(Debug, Clone)]
pub struct RpcFactory {
    name: String,
    bytecode: Bytes,
    provider: RpcProvider,
}

impl ContractFactory for RpcFactory {
    type Pending = RpcPendingDeployment;

    async fn deploy(
        &self,
        args: Vec<DynSolValue>,
        funding: Option<U256>,
    ) -> Result<RpcPendingDeployment> {
        let deployer = self.provider.inner.deployer;
        let nonce = self.provider.pending_nonce().await?;

        let mut tx = serde_json::json!({
            "from": deployer,
            "data": creation_data(&self.bytecode, &args),
        });
        if let Some(value) = funding {
            tx["value"] = serde_json::json!(format!("{:#x}", value));
        }

        let tx_hash: B256 = self
            .provider
            .call("eth_sendTransaction", vec![tx])
            .await
            .with_context(|| format!("Failed to send deployment transaction for {}", self.name))?;

        let predicted = deployer.create(nonce);
        tracing::info!(
            name = %self.name,
            tx_hash = %tx_hash,
            predicted_address = %predicted,
            "Deployment transaction sent"
        );

        Ok(RpcPendingDeployment {
            name: self.name.clone(),
            tx_hash,
            predicted,
            provider: self.provider.clone(),
        })
    }
}

/// Deployment transaction awaiting its receipt.
#[derive(Debug)]
pub struct RpcPendingDeployment {
    name: String,
    tx_hash: B256,
    predicted: Address,
    provider: RpcProvider,
}

impl PendingDeployment for RpcPendingDeployment {
    fn address(&self) -> Address {
        self.predicted
    }

    fn tx_hash(&self) -> Option<B256> {
        Some(self.tx_hash)
    }

    async fn confirmed(self) -> Result<Address> {
        let provider = &self.provider;
        let tx_hash = self.tx_hash;

        let receipt = rpc::poll_until(
            &format!("{} receipt", self.name),
            provider.inner.poll_interval,
            move || provider.receipt(tx_hash),
        )
        .await;

        if receipt.status == Some(U64::ZERO) {
            anyhow::bail!("Deployment transaction {} reverted", tx_hash);
        }

        receipt
            .contract_address
            .with_context(|| format!("Receipt of {} has no contract address", tx_hash))
    }
}
