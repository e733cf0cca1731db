//! Contract factory abstraction consumed by the orchestrator.
//!
//! A provider resolves a contract name into a factory, a factory submits a deployment
//! transaction, and the returned pending deployment resolves once the network confirms it.
//! [`RpcProvider`](crate::RpcProvider) talks to a JSON-RPC node;
//! [`InMemoryProvider`](crate::InMemoryProvider) is a deterministic stand-in.

use std::future::Future;

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, U256},
};
use anyhow::Result;

/// Resolves named contracts into factories.
pub trait ContractFactoryProvider: Send + Sync {
    type Factory: ContractFactory;

    /// Look up the compiled contract called `name`.
    fn resolve(&self, name: &str) -> impl Future<Output = Result<Self::Factory>> + Send;
}

/// Submits deployments of one contract.
pub trait ContractFactory: Send + Sync {
    type Pending: PendingDeployment;

    /// Submit a deployment transaction with ABI constructor `args` and an optional `funding`
    /// value in wei. Resolves once the transaction is accepted, not once it is confirmed.
    fn deploy(
        &self,
        args: Vec<DynSolValue>,
        funding: Option<U256>,
    ) -> impl Future<Output = Result<Self::Pending>> + Send;
}

/// A submitted deployment awaiting confirmation.
pub trait PendingDeployment: Send {
    /// Address the contract will have once confirmed.
    fn address(&self) -> Address;

    /// Hash of the deployment transaction, when the provider exposes one.
    fn tx_hash(&self) -> Option<B256>;

    /// Wait for confirmation and return the authoritative contract address.
    fn confirmed(self) -> impl Future<Output = Result<Address>> + Send;
}
