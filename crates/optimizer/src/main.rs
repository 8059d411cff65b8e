//! k8s-optimizer - Kubernetes resource right-sizing
//!
//! Reads container usage history from Prometheus and rewrites CPU and
//! memory requests/limits of the selected deployments.

use anyhow::{Context, Result};
use clap::Parser;
use optimizer_lib::{
    KubeWorkloadStore, NameFilter, OptimizerMetrics, PrometheusClient, Runner, StructuredLogger,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod cli;
mod config;

use cli::{Cli, LogFormat};

const OPTIMIZER_VERSION: &str = env!("CARGO_PKG_VERSION");

fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.default_log_filter()));
    let registry = tracing_subscriber::registry().with(filter);

    match cli.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let policy = config::load_policy(cli.config.as_deref())?;
    let filter = cli.name_filter()?;

    let logger = StructuredLogger::new(cli.dry_run);
    logger.log_startup(OPTIMIZER_VERSION, &cli.prometheus_url);

    let mut prometheus = PrometheusClient::new(&cli.prometheus_url)?;
    if let Some(user) = &cli.prometheus_user {
        prometheus = prometheus.with_basic_auth(user.clone(), cli.prometheus_password.clone());
    }
    prometheus
        .verify_connection()
        .await
        .with_context(|| format!("cannot reach Prometheus at {}", cli.prometheus_url))?;

    let store = KubeWorkloadStore::try_default()
        .await
        .context("failed to build Kubernetes client")?;
    let server_version = store
        .verify_connection()
        .await
        .context("cannot reach the Kubernetes API server")?;
    info!(server_version = %server_version, "Connected to Kubernetes");

    let runner = Runner::new(policy, Arc::new(prometheus), Arc::new(store))
        .with_only_running(!cli.include_idle);

    match cli.interval_secs {
        None => {
            runner.run(&filter, cli.dry_run).await?;
            logger.log_shutdown("run complete");
        }
        Some(secs) => run_periodic(&cli, &runner, &filter, &logger, secs).await?,
    }

    Ok(())
}

/// Repeat runs until SIGINT, serving health and metrics in between
async fn run_periodic(
    cli: &Cli,
    runner: &Runner,
    filter: &NameFilter,
    logger: &StructuredLogger,
    interval_secs: u64,
) -> Result<()> {
    let app_state = Arc::new(api::AppState::new(OptimizerMetrics::new()));
    let api_handle = tokio::spawn(api::serve(cli.listen_port, app_state.clone()));

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let status = match runner.run(filter, cli.dry_run).await {
                    Ok(report) => api::RunStatus::from_report(&report),
                    Err(e) => {
                        error!(error = %e, "Run failed");
                        api::RunStatus::from_error(e, cli.dry_run)
                    }
                };
                app_state.record(status).await;
            }
            _ = tokio::signal::ctrl_c() => {
                logger.log_shutdown("SIGINT received");
                break;
            }
        }
    }

    api_handle.abort();
    Ok(())
}
