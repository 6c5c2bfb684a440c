//! Ops HTTP surface for 24/7 production monitoring.
//!
//! Liveness and readiness probes for process supervision, a JSON health
//! summary over the job registry, the SyncStatus table for external health
//! dashboards, and the unacknowledged-alert feed that downstream notification
//! systems poll.

use crate::adapters::PostgresStore;
use crate::scheduler::{JobRegistry, RunOutcome};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

const ALERT_FEED_LIMIT: i64 = 100;

/// Overall service health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
struct JobStatusResponse {
    name: String,
    period_secs: u64,
    runs: u64,
    failures: u64,
    consecutive_failures: u32,
    degraded: bool,
    last_started: Option<DateTime<Utc>>,
    last_finished: Option<DateTime<Utc>>,
    last_outcome: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: HealthStatus,
    timestamp: DateTime<Utc>,
    uptime_seconds: u64,
    database_connected: bool,
    jobs: Vec<JobStatusResponse>,
}

/// Shared state for the ops server
pub struct OpsState {
    started_at: DateTime<Utc>,
    store: PostgresStore,
    registry: JobRegistry,
}

impl OpsState {
    pub fn new(store: PostgresStore, registry: JobRegistry) -> Self {
        Self {
            started_at: Utc::now(),
            store,
            registry,
        }
    }

    async fn health(&self) -> HealthResponse {
        let db_connected = self.store.ping().await.is_ok();
        let records = self.registry.snapshot().await;

        let any_degraded = records.iter().any(|r| r.degraded);
        let status = if !db_connected {
            HealthStatus::Unhealthy
        } else if any_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        let jobs = records
            .into_iter()
            .map(|r| JobStatusResponse {
                name: r.name,
                period_secs: r.period.as_secs(),
                runs: r.runs,
                failures: r.failures,
                consecutive_failures: r.consecutive_failures,
                degraded: r.degraded,
                last_started: r.last_started,
                last_finished: r.last_finished,
                last_outcome: r.last_outcome.map(|o| match o {
                    RunOutcome::Success { records } => format!("ok ({records} records)"),
                    RunOutcome::Failed { error } => error,
                }),
            })
            .collect();

        HealthResponse {
            status,
            timestamp: Utc::now(),
            uptime_seconds: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
            database_connected: db_connected,
            jobs,
        }
    }
}

/// Ops HTTP server
pub struct OpsServer {
    state: Arc<OpsState>,
    port: u16,
}

impl OpsServer {
    pub fn new(state: Arc<OpsState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Start the server. Runs until the process exits.
    pub async fn run(&self) -> crate::Result<()> {
        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/sync-status", get(sync_status_handler))
            .route("/alerts", get(alerts_handler))
            .route("/alerts/:id/ack", post(ack_handler))
            .with_state(Arc::clone(&self.state));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting ops server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .await
            .map_err(|e| crate::KlaxonError::Internal(format!("Ops server error: {}", e)))?;

        Ok(())
    }
}

/// Full health summary
async fn health_handler(State(state): State<Arc<OpsState>>) -> impl IntoResponse {
    let health = state.health().await;
    let status_code = match health.status {
        // Degraded still serves traffic
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(health))
}

/// Liveness probe: is the process alive?
async fn liveness_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe: can we reach the store?
async fn readiness_handler(State(state): State<Arc<OpsState>>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// One row per sync handler, for external health dashboards
async fn sync_status_handler(State(state): State<Arc<OpsState>>) -> impl IntoResponse {
    match state.store.get_sync_statuses().await {
        Ok(statuses) => (StatusCode::OK, Json(statuses)).into_response(),
        Err(e) => {
            error!("Failed to read sync status: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Unacknowledged alerts, newest first
async fn alerts_handler(State(state): State<Arc<OpsState>>) -> impl IntoResponse {
    match state.store.unacknowledged_alerts(ALERT_FEED_LIMIT).await {
        Ok(alerts) => (StatusCode::OK, Json(alerts)).into_response(),
        Err(e) => {
            error!("Failed to read alert feed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Acknowledge one alert
async fn ack_handler(
    State(state): State<Arc<OpsState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.store.acknowledge_alert(id).await {
        Ok(true) => StatusCode::NO_CONTENT,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(e) => {
            error!("Failed to acknowledge alert {}: {}", id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
