//! batsrv - battery chain supervisor service.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use batsrv::api::create_router;
use batsrv::chain::{build_adapter, ChainSupervisor};
use batsrv::config::AppConfig;
use batsrv::services::Scheduler;
use batsrv::{logging, AppState, SERVICE_NAME, SERVICE_VERSION};

#[derive(Debug, Parser)]
#[command(name = "batsrv", version, about = "Battery chain supervisor service")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config/batsrv.yaml", env = "BATSRV_CONFIG")]
    config: String,

    /// Override the HTTP bind address
    #[arg(long, env = "BATSRV_BIND")]
    bind: Option<String>,

    /// Override the log level
    #[arg(long, env = "BATSRV_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config))?;
    if let Some(bind) = args.bind {
        config.service.bind = bind;
    }
    if let Some(level) = args.log_level {
        config.service.log_level = level;
    }
    config.validate().context("validating configuration")?;

    // Keep the guard alive or file logging stops flushing.
    let _log_guard = logging::init(&config.service)?;

    info!("Starting {} v{}", SERVICE_NAME, SERVICE_VERSION);
    info!(
        "Chain driver: {}, poll interval: {}s, max chain length: {}",
        config.chain.driver, config.chain.poll_interval_secs, config.chain.max_chain_length
    );

    let adapter = build_adapter(&config.chain)?;
    let supervisor = Arc::new(ChainSupervisor::new(adapter, &config.chain, config.aux));

    let token = CancellationToken::new();
    let scheduler_handle = Scheduler::new(Arc::clone(&supervisor), &config.chain, token.clone()).spawn();

    let state = Arc::new(AppState::new(supervisor));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.service.bind)
        .await
        .with_context(|| format!("binding to {}", config.service.bind))?;
    info!("API server listening on http://{}", config.service.bind);
    info!("Health check: http://{}/health", config.service.bind);

    let signal_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        signal_token.cancel();
    });

    let serve_token = token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { serve_token.cancelled().await })
        .await
        .context("HTTP server error")?;

    // The server is down, either from a signal or because the scheduler
    // cancelled the token after a fatal fault. Collect the scheduler's
    // verdict so init failures surface as a nonzero exit.
    token.cancel();
    match scheduler_handle.await {
        Ok(Ok(())) => {},
        Ok(Err(e)) => return Err(e).context("chain supervisor terminated"),
        Err(e) => return Err(e).context("scheduler task panicked"),
    }

    info!("{} stopped", SERVICE_NAME);
    Ok(())
}
