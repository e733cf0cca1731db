//! Sequential deployment pipeline.
//!
//! Targets are deployed strictly in plan order with one outstanding deployment at a time.
//! Each step waits for the previous confirmation, so a target's constructor can reference
//! any earlier target's address.

use std::{collections::BTreeMap, time::Duration};

use alloy_core::primitives::Address;
use tokio::sync::watch;

use crate::{
    ContractFactory, ContractFactoryProvider, DeployError, DeployedContract, DeploymentLog,
    DeploymentPlan, DeploymentTarget, PendingDeployment,
};

type Reporter = Box<dyn Fn(&DeployedContract) + Send + Sync>;

/// Runs a [`DeploymentPlan`] against a [`ContractFactoryProvider`].
pub struct Orchestrator<P> {
    provider: P,
    constants: BTreeMap<String, Address>,
    confirmation_timeout: Option<Duration>,
    shutdown: Option<watch::Receiver<bool>>,
    reporter: Reporter,
}

impl<P: ContractFactoryProvider> Orchestrator<P> {
    /// Create an orchestrator that prints one line per confirmed contract to stdout.
    pub fn new(provider: P, constants: BTreeMap<String, Address>) -> Self {
        Self {
            provider,
            constants,
            confirmation_timeout: None,
            shutdown: None,
            reporter: Box::new(|contract| {
                println!("{} deployed to {}", contract.name, contract.address)
            }),
        }
    }

    /// Bound each confirmation wait. `None` waits forever.
    pub fn with_confirmation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Stop before the next submission once `shutdown` turns `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Replace the stdout reporter.
    pub fn with_reporter(
        mut self,
        reporter: impl Fn(&DeployedContract) + Send + Sync + 'static,
    ) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Deploy every target of `plan` in order, appending to `log`.
    ///
    /// The first failure ends the run. Targets confirmed before it stay in `log`, and no
    /// later target is submitted.
    pub async fn run(
        &self,
        plan: &DeploymentPlan,
        log: &mut DeploymentLog,
    ) -> Result<(), DeployError> {
        plan.validate(&self.constants)?;

        tracing::info!(
            targets = plan.len(),
            order = ?plan.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "Starting deployment pipeline..."
        );

        for target in plan.iter() {
            self.ensure_not_cancelled(&target.name)?;
            self.deploy_target(target, log).await?;
        }

        tracing::info!(deployed = log.confirmed().count(), "Deployment pipeline complete");
        Ok(())
    }

    fn ensure_not_cancelled(&self, next: &str) -> Result<(), DeployError> {
        match &self.shutdown {
            Some(shutdown) if *shutdown.borrow() => {
                tracing::warn!(
                    next = %next,
                    "Shutdown requested, not submitting further deployments"
                );
                Err(DeployError::Cancelled {
                    before: next.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    async fn deploy_target(
        &self,
        target: &DeploymentTarget,
        log: &mut DeploymentLog,
    ) -> Result<(), DeployError> {
        let name = target.name.as_str();
        log.begin(name)?;

        let factory = match self.provider.resolve(name).await {
            Ok(factory) => factory,
            Err(source) => {
                log.fail(name)?;
                return Err(DeployError::FactoryResolutionFailed {
                    name: name.to_string(),
                    source,
                });
            }
        };

        let args = match target
            .args
            .iter()
            .map(|arg| arg.resolve(log, &self.constants))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(args) => args,
            Err(err) => {
                log.fail(name)?;
                return Err(err);
            }
        };
        let funding = target.funding.map(|funding| funding.wei());

        tracing::info!(
            name = %name,
            args = args.len(),
            funding_wei = ?funding,
            "Submitting deployment..."
        );

        let pending = match factory.deploy(args, funding).await {
            Ok(pending) => pending,
            Err(source) => {
                log.fail(name)?;
                return Err(DeployError::DeploymentFailed {
                    name: name.to_string(),
                    source,
                });
            }
        };
        log.record_pending(name, pending.address(), pending.tx_hash())?;

        tracing::info!(name = %name, address = %pending.address(), "Waiting for confirmation...");

        let confirmation = match self.confirmation_timeout {
            Some(limit) => tokio::time::timeout(limit, pending.confirmed())
                .await
                .unwrap_or_else(|_| {
                    Err(anyhow::anyhow!(
                        "confirmation not observed within {}s",
                        limit.as_secs_f64()
                    ))
                }),
            None => pending.confirmed().await,
        };

        match confirmation {
            Ok(address) => {
                let contract = log.confirm(name, address)?;
                tracing::info!(name = %name, address = %contract.address, "Contract confirmed");
                (self.reporter)(contract);
                Ok(())
            }
            Err(source) => {
                log.fail(name)?;
                Err(DeployError::DeploymentFailed {
                    name: name.to_string(),
                    source,
                })
            }
        }
    }
}
