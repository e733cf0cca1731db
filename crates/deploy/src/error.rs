//! Error taxonomy for a deployment run.

use thiserror::Error;

/// Errors that abort a deployment pipeline.
///
/// None of these are retried. A run that fails after some targets were confirmed leaves
/// those contracts on-chain; the caller's [`DeploymentLog`](crate::DeploymentLog) still
/// holds them.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The provider could not produce a factory for the named contract
    /// (missing or unreadable artifact, empty bytecode).
    #[error("failed to resolve contract factory for {name}")]
    FactoryResolutionFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// The deployment transaction was rejected, reverted, or never confirmed.
    #[error("deployment of {name} failed")]
    DeploymentFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// A required configuration value is absent.
    #[error("missing configuration value: {0}")]
    ConfigurationMissing(String),

    /// The plan cannot be executed as written.
    #[error("invalid deployment plan: {0}")]
    InvalidPlan(String),

    /// A shutdown was requested before the next submission.
    #[error("deployment cancelled before {before} was submitted")]
    Cancelled { before: String },

    /// An illegal state transition was attempted on the deployment log.
    #[error("deployment log: {0}")]
    Ledger(String),
}

impl DeployError {
    /// The name of the target the error is attached to, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::FactoryResolutionFailed { name, .. } | Self::DeploymentFailed { name, .. } => {
                Some(name)
            }
            Self::Cancelled { before } => Some(before),
            _ => None,
        }
    }
}
