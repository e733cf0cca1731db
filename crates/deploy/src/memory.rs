//! In-memory contract factory provider.
//!
//! Addresses follow the CREATE rule from a fixed deployer account, so a run is fully
//! deterministic. Failures can be scripted per contract name.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
};

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, U256, address, keccak256},
};
use anyhow::Result;

use crate::{ContractFactory, ContractFactoryProvider, PendingDeployment};

/// Default deployer account (first Hardhat/Anvil development account).
pub const DEFAULT_DEPLOYER: Address = address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

/// A deployment submitted to an [`InMemoryProvider`].
#[derive(Debug, Clone, PartialEq)]
pub struct DeployCall {
    pub name: String,
    pub args: Vec<DynSolValue>,
    pub funding: Option<U256>,
    pub address: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Confirm,
    Revert,
    Hang,
}

#[derive(Debug, Default)]
struct State {
    nonce: u64,
    missing: HashSet<String>,
    rejected: HashSet<String>,
    reverted: HashSet<String>,
    hanging: HashSet<String>,
    calls: Vec<DeployCall>,
    confirmations: Vec<String>,
}

/// Deterministic provider that never touches a network.
#[derive(Debug, Clone)]
pub struct InMemoryProvider {
    deployer: Address,
    state: Arc<Mutex<State>>,
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new(DEFAULT_DEPLOYER)
    }
}

impl InMemoryProvider {
    pub fn new(deployer: Address) -> Self {
        Self {
            deployer,
            state: Arc::default(),
        }
    }

    /// Fail factory resolution for `name`, as if its artifact were missing.
    pub fn missing_artifact(self, name: impl Into<String>) -> Self {
        self.lock().missing.insert(name.into());
        self
    }

    /// Reject the deployment transaction of `name` at submission.
    pub fn reject(self, name: impl Into<String>) -> Self {
        self.lock().rejected.insert(name.into());
        self
    }

    /// Accept the deployment of `name` but revert it on-chain.
    pub fn revert(self, name: impl Into<String>) -> Self {
        self.lock().reverted.insert(name.into());
        self
    }

    /// Accept the deployment of `name` and never confirm it.
    pub fn hang(self, name: impl Into<String>) -> Self {
        self.lock().hanging.insert(name.into());
        self
    }

    pub fn deployer(&self) -> Address {
        self.deployer
    }

    /// Deployments accepted so far, in submission order.
    pub fn calls(&self) -> Vec<DeployCall> {
        self.lock().calls.clone()
    }

    /// Names confirmed so far, in confirmation order.
    pub fn confirmations(&self) -> Vec<String> {
        self.lock().confirmations.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked while holding it.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ContractFactoryProvider for InMemoryProvider {
    type Factory = InMemoryFactory;

    async fn resolve(&self, name: &str) -> Result<InMemoryFactory> {
        if self.lock().missing.contains(name) {
            anyhow::bail!("no artifact found for contract {name}");
        }

        Ok(InMemoryFactory {
            name: name.to_string(),
            provider: self.clone(),
        })
    }
}

/// Factory handed out by [`InMemoryProvider`].
#[derive(Debug, Clone)]
pub struct InMemoryFactory {
    name: String,
    provider: InMemoryProvider,
}

impl ContractFactory for InMemoryFactory {
    type Pending = InMemoryPending;

    async fn deploy(
        &self,
        args: Vec<DynSolValue>,
        funding: Option<U256>,
    ) -> Result<InMemoryPending> {
        let mut state = self.provider.lock();

        if state.rejected.contains(&self.name) {
            anyhow::bail!("transaction rejected by the network: deployment of {}", self.name);
        }

        let nonce = state.nonce;
        state.nonce += 1;

        let address = self.provider.deployer.create(nonce);
        let tx_hash = keccak256(format!("{}:{}:{}", self.provider.deployer, nonce, self.name));
        let outcome = if state.reverted.contains(&self.name) {
            Outcome::Revert
        } else if state.hanging.contains(&self.name) {
            Outcome::Hang
        } else {
            Outcome::Confirm
        };

        state.calls.push(DeployCall {
            name: self.name.clone(),
            args,
            funding,
            address,
        });

        Ok(InMemoryPending {
            name: self.name.clone(),
            address,
            tx_hash,
            outcome,
            provider: self.provider.clone(),
        })
    }
}

/// Pending deployment handed out by [`InMemoryFactory`].
#[derive(Debug)]
pub struct InMemoryPending {
    name: String,
    address: Address,
    tx_hash: B256,
    outcome: Outcome,
    provider: InMemoryProvider,
}

impl PendingDeployment for InMemoryPending {
    fn address(&self) -> Address {
        self.address
    }

    fn tx_hash(&self) -> Option<B256> {
        Some(self.tx_hash)
    }

    async fn confirmed(self) -> Result<Address> {
        match self.outcome {
            Outcome::Confirm => {
                self.provider.lock().confirmations.push(self.name);
                Ok(self.address)
            }
            Outcome::Revert => anyhow::bail!("transaction {} reverted", self.tx_hash),
            Outcome::Hang => std::future::pending().await,
        }
    }
}
