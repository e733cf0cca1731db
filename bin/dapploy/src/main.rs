//! dapploy deploys the Crypto Devs NFT marketplace and the DAO wired to it.

mod cli;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;

use cli::Cli;
use dapploy_deploy::{
    ContractFactoryProvider, DeployConfig, DeploymentLog, DeploymentManifest, DeploymentPlan,
    InMemoryProvider, Orchestrator, RpcProvider,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger. Stdout carries only the deployed addresses.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.apply(DeployConfig::load(cli.config.as_deref())?);

    if let Some(path) = &cli.save_config {
        config.save_to_file(path)?;
    }

    let plan = config.plan()?;

    // Stop submitting new deployments on Ctrl-C. An in-flight one still runs to completion.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received, stopping after the current deployment...");
            let _ = shutdown_tx.send(true);
        }
    });

    if cli.dry_run {
        let provider = cli
            .dry_run_reject
            .iter()
            .fold(InMemoryProvider::default(), |provider, name| provider.reject(name.clone()));

        tracing::info!(deployer = %provider.deployer(), "Dry run against an in-memory chain");
        return run_pipeline(provider, &config, &plan, None, shutdown_rx).await;
    }

    let provider = RpcProvider::connect(&config).await?;
    let chain_id = provider.chain_id().await?;
    tracing::info!(chain_id, deployer = %provider.deployer(), "Deploying...");

    run_pipeline(provider, &config, &plan, Some(chain_id), shutdown_rx).await
}

async fn run_pipeline<P: ContractFactoryProvider>(
    provider: P,
    config: &DeployConfig,
    plan: &DeploymentPlan,
    chain_id: Option<u64>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let orchestrator = Orchestrator::new(provider, config.constants.clone())
        .with_confirmation_timeout(config.confirmation_timeout())
        .with_shutdown(shutdown);

    let mut log = DeploymentLog::default();
    let result = orchestrator.run(plan, &mut log).await;

    // Contracts confirmed before a failure are on-chain, so the manifest is written either way.
    if let Some(path) = &config.manifest {
        DeploymentManifest::new(plan, &config.constants, &log, chain_id)?.save_to_file(path)?;
    }

    if let Err(err) = &result {
        tracing::error!(
            error = ?err,
            deployed = log.confirmed().count(),
            "Deployment pipeline failed"
        );
    }

    Ok(result?)
}
