//! strkloop-submitter - submit a Starknet contract invocation and report its status
//!
//! Reads the chain, account and call from a TOML file, guards the fee cap
//! against a node estimate, broadcasts and checks the transaction status once
//! the network has had time to index it.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use strkloop_submitter::account::{Account, LocalKeystore};
use strkloop_submitter::chain::ChainProvider;
use strkloop_submitter::config::Settings;
use strkloop_submitter::tx::{
    parse_felt, CallDescriptor, PipelineConfig, StatusReport, SubmissionPipeline,
};

#[derive(Parser)]
#[command(name = "strkloop-submitter")]
#[command(about = "Submit a Starknet invoke transaction with fee guarding", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "STRKLOOP_CONFIG", default_value = "config/default.toml")]
    config: PathBuf,

    /// Contract to call, overrides [call].contract_address
    #[arg(long)]
    contract: Option<String>,

    /// Entry point name, overrides [call].entry_point
    #[arg(long)]
    entry_point: Option<String>,

    /// Calldata value (hex or decimal); repeat for several, overrides [call].calldata
    #[arg(long = "arg")]
    args: Vec<String>,

    /// Estimate and fee-check only, do not broadcast
    #[arg(long)]
    dry_run: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.log_json);

    info!("Starting strkloop-submitter v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load(&cli.config)?;
    info!(
        "Loaded configuration for {} at {}",
        settings.chain.chain_id, settings.chain.rpc_url
    );

    let call = resolve_call(&cli, &settings)?;

    let provider = Arc::new(ChainProvider::new(settings.chain.clone())?);

    let account = Account::new(
        settings.account_address()?,
        settings.public_key()?,
        settings.account.cairo_version,
    );
    let keystore = Arc::new(LocalKeystore::from_env(account, &settings.account.private_key_env)?);
    info!("Account {} loaded", settings.account.address);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let pipeline = SubmissionPipeline::new(
        provider,
        keystore,
        settings.chain_id()?,
        PipelineConfig::from(&settings.submission),
    )
    .with_cancellation(cancel_rx);

    // Cancel pending waits on shutdown
    let signal_handle = tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown signal received, cancelling pending waits");
        let _ = cancel_tx.send(true);
    });

    let outcome = if cli.dry_run {
        pipeline.estimate(&call).await.map(|report| {
            info!(
                "Estimated fee {} (cap {}{})",
                report.estimated_fee,
                report.final_cap,
                if report.corrected() { ", corrected" } else { "" }
            );
        })
    } else {
        pipeline.submit(&call).await.map(|result| {
            info!("Transaction hash: {}", result.transaction_hash.to_hex_string());
            match &result.status {
                StatusReport::Observed(status) => {
                    info!(
                        "Transaction execution status: {}",
                        status
                            .execution_status
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| "not executed yet".to_string())
                    );
                    info!("Transaction finality status: {}", status.finality_status);
                }
                StatusReport::Unknown(reason) => {
                    warn!("Transaction status unknown ({}); query it again later", reason);
                }
            }
        })
    };

    signal_handle.abort();

    if settings.metrics.enabled {
        match strkloop_submitter::metrics::render() {
            Ok(text) => info!("Metrics:\n{}", text),
            Err(e) => warn!("Failed to render metrics: {}", e),
        }
    }

    if let Err(e) = &outcome {
        error!(
            stage = %e.stage(),
            retryable = e.is_retryable(),
            "Submission failed: {}",
            e
        );
    }

    outcome.context("Submission failed")
}

/// Combine the `[call]` section with command-line overrides
fn resolve_call(cli: &Cli, settings: &Settings) -> Result<CallDescriptor> {
    let configured = settings.call.as_ref();

    let contract = cli
        .contract
        .clone()
        .or_else(|| configured.map(|c| c.contract_address.clone()))
        .context("No contract address given (use --contract or [call].contract_address)")?;
    let entry_point = cli
        .entry_point
        .clone()
        .or_else(|| configured.map(|c| c.entry_point.clone()))
        .context("No entry point given (use --entry-point or [call].entry_point)")?;

    let raw_args = if cli.args.is_empty() {
        configured.map(|c| c.calldata.clone()).unwrap_or_default()
    } else {
        cli.args.clone()
    };
    let args = raw_args
        .iter()
        .map(|v| parse_felt(v))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CallDescriptor::new(&contract, &entry_point, args)?)
}

fn init_logging(json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,strkloop_submitter=debug,reqwest=warn,hyper=warn")
    });

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
