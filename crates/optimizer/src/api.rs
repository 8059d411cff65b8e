//! HTTP API for health checks and Prometheus metrics (periodic mode)

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use optimizer_lib::{OptimizerMetrics, RunReport};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Outcome of the most recent run
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Set when the run itself could not complete
    pub error: Option<String>,
}

impl RunStatus {
    pub fn from_report(report: &RunReport) -> Self {
        Self {
            finished_at: report.finished_at,
            dry_run: report.dry_run,
            updated: report.updated(),
            unchanged: report.unchanged(),
            skipped: report.skipped(),
            failed: report.failed(),
            error: None,
        }
    }

    pub fn from_error(error: impl ToString, dry_run: bool) -> Self {
        Self {
            finished_at: Utc::now(),
            dry_run,
            updated: 0,
            unchanged: 0,
            skipped: 0,
            failed: 0,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    last_run: Option<RunStatus>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub last_run: Arc<RwLock<Option<RunStatus>>>,
    pub metrics: OptimizerMetrics,
}

impl AppState {
    pub fn new(metrics: OptimizerMetrics) -> Self {
        Self {
            last_run: Arc::new(RwLock::new(None)),
            metrics,
        }
    }

    pub async fn record(&self, status: RunStatus) {
        *self.last_run.write().await = Some(status);
    }
}

/// 200 before the first run and after successful runs, 503 after a failed run
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let last_run = state.last_run.read().await.clone();

    let (status_code, status) = match &last_run {
        None => (StatusCode::OK, "starting"),
        Some(run) if run.error.is_some() => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
        Some(_) => (StatusCode::OK, "healthy"),
    };

    (status_code, Json(Health { status, last_run }))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    match encoder.encode(&prometheus::gather(), &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            e.to_string().into_bytes(),
        ),
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
