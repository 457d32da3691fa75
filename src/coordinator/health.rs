//! Health check endpoints
//!
//! - `/health/live`: the process is up
//! - `/health/ready`: the coordinator is accepting workers and submissions
//! - `/health`: component-level detail
//!
//! ```yaml
//! livenessProbe:
//!   httpGet:
//!     path: /health/live
//!     port: 8766
//! readinessProbe:
//!   httpGet:
//!     path: /health/ready
//!     port: 8766
//! ```

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::server::AppState;

/// Uptime below which readiness reports degraded
const WARMUP_SECS: u64 = 10;

// ============================================================================
// Health Status Types
// ============================================================================

/// Overall health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// The worse of two statuses
    fn worst(self, other: HealthStatus) -> HealthStatus {
        match (self, other) {
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }
}

/// Component health check result
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: HealthStatus,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: HealthStatus,
    pub timestamp: String,
    pub checks: Vec<ComponentHealth>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_secs: u64,
    pub timestamp: String,
    pub checks: Vec<ComponentHealth>,
}

// ============================================================================
// Health Checker
// ============================================================================

/// Readiness flag flipped by the server lifecycle
#[derive(Clone)]
pub struct HealthChecker {
    ready: Arc<AtomicBool>,
    start_time: Instant,
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            start_time: Instant::now(),
        }
    }

    /// Mark the coordinator as accepting traffic
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
        tracing::info!("Health check: coordinator marked as ready");
    }

    /// Mark the coordinator as draining
    pub fn mark_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
        tracing::warn!("Health check: coordinator marked as not ready");
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

// ============================================================================
// Health Check Router
// ============================================================================

/// Create health check router
pub fn create_health_router(state: AppState) -> Router {
    Router::new()
        .route("/health/live", get(liveness_probe))
        .route("/health/ready", get(readiness_probe))
        .route("/health", get(health_check))
        .with_state(state)
}

// ============================================================================
// Health Check Handlers
// ============================================================================

async fn liveness_probe() -> impl IntoResponse {
    let response = LivenessResponse {
        status: HealthStatus::Healthy,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(response))
}

/// Ready once listeners are up; degraded while warming up
async fn readiness_probe(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = vec![registry_check(&state).await, store_check(&state).await];
    let mut overall_status = HealthStatus::Healthy;

    if !state.health.is_ready() {
        overall_status = HealthStatus::Unhealthy;
        checks.push(ComponentHealth {
            name: "lifecycle".to_string(),
            status: HealthStatus::Unhealthy,
            message: Some("not accepting connections".to_string()),
            latency_ms: None,
        });
    }

    let uptime = state.health.uptime_secs();
    if uptime < WARMUP_SECS {
        overall_status = overall_status.worst(HealthStatus::Degraded);
        checks.push(ComponentHealth {
            name: "startup".to_string(),
            status: HealthStatus::Degraded,
            message: Some(format!("warming up ({uptime}s uptime)")),
            latency_ms: None,
        });
    }

    let response = ReadinessResponse {
        status: overall_status,
        timestamp: chrono::Utc::now().to_rfc3339(),
        checks,
    };

    (overall_status.status_code(), Json(response))
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let checks = vec![
        registry_check(&state).await,
        store_check(&state).await,
        ComponentHealth {
            name: "liveness_monitor".to_string(),
            status: HealthStatus::Healthy,
            message: Some(format!(
                "sweeping every {}s",
                state.monitor.policy().sweep_interval.as_secs()
            )),
            latency_ms: None,
        },
    ];

    let overall_status = checks
        .iter()
        .fold(HealthStatus::Healthy, |acc, check| acc.worst(check.status));

    let response = HealthResponse {
        status: overall_status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.uptime_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        checks,
    };

    (overall_status.status_code(), Json(response))
}

/// Degraded when nodes are known but none is connected
async fn registry_check(state: &AppState) -> ComponentHealth {
    let start = Instant::now();
    let stats = state.registry.stats().await;
    let latency = start.elapsed().as_millis() as u64;

    let status = if stats.connected > 0 || stats.total_nodes == 0 {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    ComponentHealth {
        name: "node_registry".to_string(),
        status,
        message: Some(format!(
            "{} total, {} connected, {} busy",
            stats.total_nodes, stats.connected, stats.busy
        )),
        latency_ms: Some(latency),
    }
}

/// Degraded when tasks are queued but no worker is connected to take them
async fn store_check(state: &AppState) -> ComponentHealth {
    let start = Instant::now();
    let counts = state.store.counts().await;
    let latency = start.elapsed().as_millis() as u64;
    let connected = state.registry.stats().await.connected;

    let (status, message) = if counts.pending > 0 && connected == 0 {
        (
            HealthStatus::Degraded,
            format!("{} pending with no connected worker", counts.pending),
        )
    } else {
        (
            HealthStatus::Healthy,
            format!(
                "{} tasks, {} pending, {} assigned",
                counts.total, counts.pending, counts.assigned
            ),
        )
    };

    ComponentHealth {
        name: "task_store".to_string(),
        status,
        message: Some(message),
        latency_ms: Some(latency),
    }
}

// ============================================================================
// Tests
// ============================================================================
