//! dapploy-deploy - Ordered smart contract deployment.
//!
//! This crate deploys a marketplace contract and then a DAO contract that is wired to the
//! marketplace's confirmed address, funded with ether at construction. The pipeline is
//! generic over a [`ContractFactoryProvider`], with a JSON-RPC implementation for real
//! nodes and a deterministic in-memory one for dry runs and tests.

mod artifacts;
pub use artifacts::{Artifact, ArtifactStore};

mod config;
pub use config::{
    CONFIG_FILENAME, DEFAULT_CONFIRMATION_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_RPC_URL, DeployConfig, ENV_PREFIX,
};

mod error;
pub use error::DeployError;

mod log;
pub use log::{ConfirmationStatus, DeployedContract, DeploymentLog, TargetState};

mod manifest;
pub use manifest::{DeploymentManifest, plan_hash};

pub mod memory;
pub use memory::{DeployCall, InMemoryProvider};

mod orchestrator;
pub use orchestrator::Orchestrator;

pub mod plan;
pub use plan::{ConstructorArg, DeploymentPlan, DeploymentTarget, FundingAmount};

mod provider;
pub use provider::{ContractFactory, ContractFactoryProvider, PendingDeployment};

pub mod rpc;

mod rpc_provider;
pub use rpc_provider::{RpcFactory, RpcPendingDeployment, RpcProvider, creation_data};
