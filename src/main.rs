//! L2 Bridge Deployer
//!
//! Deploys the root/child token pair and exercises the standard bridge in
//! both directions:
//!
//! 1. Deploy the root token on L1 and the child token on L2
//! 2. Approve the L1 bridge and deposit
//! 3. Wait for the deposit to be relayed to L2
//! 4. Withdraw and wait for the relay back to L1
//!
//! `--mode` stops the run early (`tokens`, `deposit`, `deposit-relay`).
//! Configuration is read from the environment and an optional `.env` file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bridge_deployer::artifacts::ArtifactDirectory;
use bridge_deployer::evm::EvmChainClient;
use bridge_deployer::{DeployerConfig, Layer, Orchestrator, RunMode, RunReport};
use clap::Parser;
use eyre::{Result, WrapErr};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "l2-bridge-deployer")]
#[command(about = "Deploy a bridged token pair and run an L1 <-> L2 round trip", long_about = None)]
struct Cli {
    /// How far to run: tokens, deposit, deposit-relay or full
    #[arg(short, long)]
    mode: Option<RunMode>,

    /// Load environment variables from this file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Directory holding compiled contract artifacts
    #[arg(long, env = "ARTIFACTS_DIR")]
    artifacts: Option<PathBuf>,

    /// Write the run report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    json_logs: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    info!("Starting L2 bridge deployer");

    let mut config = match &cli.env_file {
        Some(path) => DeployerConfig::from_env_file(path)?,
        None => DeployerConfig::from_env()?,
    };
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }
    if let Some(dir) = &cli.artifacts {
        config.contracts.artifacts_dir = dir.clone();
    }
    info!(
        mode = %config.mode,
        l1_rpc = %config.l1_rpc_url.host_str().unwrap_or_default(),
        l2_rpc = %config.l2_rpc_url.host_str().unwrap_or_default(),
        artifacts = %config.contracts.artifacts_dir.display(),
        "Configuration loaded"
    );

    let key = *config.private_key.expose();
    let l1 = EvmChainClient::new(
        Layer::L1,
        config.l1_rpc_url.clone(),
        &key,
        config.confirmation_timeout,
    )?;
    let l2 = EvmChainClient::new(
        Layer::L2,
        config.l2_rpc_url.clone(),
        &key,
        config.confirmation_timeout,
    )?;
    let artifacts = ArtifactDirectory::new(config.contracts.artifacts_dir.clone());

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            cancel.cancel();
        });
    }

    let mut orchestrator = Orchestrator::new(
        Arc::new(l1),
        Arc::new(l2),
        Arc::new(artifacts),
        config,
        cancel,
    );

    let outcome = orchestrator.run().await;

    if let Some(path) = &cli.report {
        write_report(path, orchestrator.report())?;
    }

    match outcome {
        Ok(report) => {
            if let (Some(root), Some(child)) = (report.root_token, report.child_token) {
                info!(root_token = %root, child_token = %child, "Token pair deployed");
            }
            info!(steps = report.completed_steps.len(), "L2 bridge deployer finished");
            Ok(())
        }
        Err(e) => {
            error!(
                kind = %e.kind(),
                step = ?e.failed_step(),
                error = %e,
                "Deployment run failed"
            );
            Err(e.into())
        }
    }
}

fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)
        .wrap_err_with(|| format!("Failed to write report to {}", path.display()))?;
    info!(path = %path.display(), "Run report written");
    Ok(())
}

fn init_logging(verbose: bool, json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose {
        "debug"
    } else {
        "info,bridge_deployer=debug"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling relay waits");
        }
        _ = terminate => {
            info!("Received SIGTERM, cancelling relay waits");
        }
    }
}
