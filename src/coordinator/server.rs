//! Coordinator server implementation
//!
//! Builds the shared state once, then serves the HTTP API (with `/ws`) and
//! the optional dedicated worker listener until shutdown.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use serde_json::json;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::metrics;
use crate::models::{NewTask, Task};

use super::api::{create_router, create_worker_router};
use super::assignment::AssignmentEngine;
use super::config::CoordinatorConfig;
use super::health::HealthChecker;
use super::liveness::{LivenessMonitor, LivenessPolicy};
use super::registry::NodeRegistry;
use super::session::SessionManager;
use super::store::TaskStore;

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Worker registry
    pub registry: Arc<NodeRegistry>,

    /// Task map and dispatch queue
    pub store: Arc<TaskStore>,

    pub engine: Arc<AssignmentEngine>,

    pub monitor: Arc<LivenessMonitor>,

    /// Live worker connections
    pub sessions: Arc<SessionManager>,

    pub health: HealthChecker,

    /// Configuration
    pub config: Arc<CoordinatorConfig>,
}

impl AppState {
    /// Wire up every component from one config
    pub fn new(config: CoordinatorConfig) -> Self {
        let store = Arc::new(TaskStore::new());
        let registry = Arc::new(NodeRegistry::new(config.max_nodes));
        let engine = Arc::new(AssignmentEngine::new(
            store.clone(),
            registry.clone(),
            config.max_assignment_attempts,
        ));
        let monitor = Arc::new(LivenessMonitor::new(
            store.clone(),
            registry.clone(),
            LivenessPolicy::from_config(&config),
        ));
        let sessions = Arc::new(SessionManager::new(
            registry.clone(),
            store.clone(),
            engine.clone(),
            monitor.clone(),
            config.heartbeat_interval_secs,
            config.outbound_queue_capacity,
        ));

        Self {
            registry,
            store,
            engine,
            monitor,
            sessions,
            health: HealthChecker::new(),
            config: Arc::new(config),
        }
    }
}

/// Demo tasks queued when `seed_sample_tasks` is set
pub fn sample_tasks() -> Vec<NewTask> {
    vec![
        NewTask::new("prime_calculation", json!({"start": 1, "end": 10000}), 2),
        NewTask::new("matrix_multiplication", json!({"size": 100}), 1),
        NewTask::new("hash_computation", json!({"iterations": 1000}), 1),
    ]
}

// ============================================================================
// Coordinator Server
// ============================================================================

/// Main coordinator server
pub struct CoordinatorServer {
    config: CoordinatorConfig,
    state: AppState,
}

impl CoordinatorServer {
    /// Create a new coordinator server
    pub fn new(config: CoordinatorConfig) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::ConfigError(e.to_string()))?;

        let state = AppState::new(config.clone());
        Ok(Self { config, state })
    }

    /// Get the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the HTTP router with all routes
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        if self.config.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Build the router for the dedicated worker listener
    pub fn build_worker_router(&self) -> Router {
        let router = create_worker_router(self.state.clone());
        if self.config.enable_request_logging {
            router.layer(TraceLayer::new_for_http())
        } else {
            router
        }
    }

    /// Queue the demo tasks
    pub async fn seed_sample_tasks(&self) -> Vec<Task> {
        let mut seeded = Vec::new();
        for task in sample_tasks() {
            let task = self.state.store.insert(task).await;
            tracing::info!(task_id = %task.id, kind = %task.kind, "Seeded sample task");
            seeded.push(task);
        }
        metrics::set_queue_depth(self.state.store.queue_len().await);
        seeded
    }

    /// Serve until `shutdown` flips to true or its sender is dropped
    pub async fn start_with_shutdown(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), ServerError> {
        if self.config.seed_sample_tasks {
            self.seed_sample_tasks().await;
        }

        let http_listener = bind(self.config.bind_address).await?;
        let worker_listener = match self.config.worker_bind_address {
            Some(addr) => Some(bind(addr).await?),
            None => None,
        };

        let monitor = self.state.monitor.clone().spawn(shutdown.clone());

        tracing::info!(
            bind_address = %self.config.bind_address,
            worker_bind_address = ?self.config.worker_bind_address,
            "Starting coordinator server (with graceful shutdown)"
        );
        self.state.health.mark_ready();

        let http = axum::serve(http_listener, self.build_router())
            .with_graceful_shutdown(wait_for_shutdown(shutdown.clone()))
            .into_future();

        let served = match worker_listener {
            Some(listener) => {
                let workers = axum::serve(listener, self.build_worker_router())
                    .with_graceful_shutdown(wait_for_shutdown(shutdown.clone()))
                    .into_future();
                tokio::try_join!(http, workers).map(|_| ())
            }
            None => http.await,
        };

        self.state.health.mark_not_ready();
        served.map_err(|e| ServerError::ServeError(e.to_string()))?;

        if let Err(e) = monitor.await {
            tracing::warn!(error = %e, "Liveness monitor task failed");
        }

        tracing::info!("Coordinator server shutdown complete");
        Ok(())
    }

    /// Get server info
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            bind_address: self.config.bind_address,
            worker_bind_address: self.config.worker_bind_address,
            liveness_timeout_secs: self.config.liveness_timeout_secs,
            assignment_timeout_secs: self.config.assignment_timeout_secs,
            max_nodes: self.config.max_nodes,
            push_on_submit: self.config.push_on_submit,
            cors_enabled: self.config.enable_cors,
            request_logging_enabled: self.config.enable_request_logging,
        }
    }
}

async fn bind(addr: SocketAddr) -> Result<tokio::net::TcpListener, ServerError> {
    tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::BindError(format!("{}: {}", addr, e)))
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}

/// Server information
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub bind_address: SocketAddr,
    pub worker_bind_address: Option<SocketAddr>,
    pub liveness_timeout_secs: u64,
    pub assignment_timeout_secs: u64,
    pub max_nodes: usize,
    pub push_on_submit: bool,
    pub cors_enabled: bool,
    pub request_logging_enabled: bool,
}

impl ServerInfo {
    /// Format as display string
    pub fn display(&self) -> String {
        let on_off = |flag: bool| if flag { "enabled" } else { "disabled" };
        let workers = match self.worker_bind_address {
            Some(addr) => format!("ws://{}/ and ws://{}/ws", addr, self.bind_address),
            None => format!("ws://{}/ws", self.bind_address),
        };

        format!(
            "Edgepool Coordinator\n\
             {:-<40}\n\
             HTTP API: http://{}\n\
             Workers: {}\n\
             Liveness Timeout: {}s\n\
             Assignment Timeout: {}s\n\
             Max Nodes: {}\n\
             Push On Submit: {}\n\
             CORS: {}\n\
             Request Logging: {}",
            "",
            self.bind_address,
            workers,
            self.liveness_timeout_secs,
            self.assignment_timeout_secs,
            self.max_nodes,
            on_off(self.push_on_submit),
            on_off(self.cors_enabled),
            on_off(self.request_logging_enabled)
        )
    }
}

// ============================================================================
// Server Errors
// ============================================================================

/// Server errors
#[derive(Debug, Clone)]
pub enum ServerError {
    /// Configuration error
    ConfigError(String),

    /// Failed to bind to address
    BindError(String),

    /// Server error
    ServeError(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Self::BindError(msg) => write!(f, "Failed to bind: {}", msg),
            Self::ServeError(msg) => write!(f, "Server error: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskStatus;

    #[test]
    fn test_server_creation() {
        let server = CoordinatorServer::new(CoordinatorConfig::default());
        assert!(server.is_ok());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = CoordinatorConfig {
            max_nodes: 0,
            ..Default::default()
        };
        assert!(matches!(
            CoordinatorServer::new(config),
            Err(ServerError::ConfigError(_))
        ));
    }

    #[test]
    fn test_server_info() {
        let config = CoordinatorConfig::builder()
            .max_nodes(5)
            .enable_cors(false)
            .push_on_submit(true)
            .build()
            .unwrap();

        let server = CoordinatorServer::new(config).unwrap();
        let info = server.info();

        assert_eq!(info.max_nodes, 5);
        assert!(!info.cors_enabled);
        assert!(info.display().contains("Push On Submit: enabled"));
    }

    #[tokio::test]
    async fn test_seed_sample_tasks() {
        let server = CoordinatorServer::new(CoordinatorConfig::default()).unwrap();
        let seeded = server.seed_sample_tasks().await;
        assert_eq!(seeded.len(), 3);

        let state = server.state();
        let queue = state.store.queue_order().await;
        // prime_calculation has the highest priority
        assert_eq!(queue[0], seeded[0].id);
        assert!(state
            .store
            .list()
            .await
            .iter()
            .all(|t| t.status == TaskStatus::Pending));
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let config = CoordinatorConfig::builder()
            .bind_address_str("127.0.0.1:0")
            .unwrap()
            .build()
            .unwrap();
        let server = CoordinatorServer::new(config).unwrap();
        let state = server.state();
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { server.start_with_shutdown(rx).await });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(state.health.is_ready());

        tx.send(true).unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());
        assert!(!state.health.is_ready());
    }
}
