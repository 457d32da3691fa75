//! HTTP handlers for the coordinator
//!
//! Submission API for clients plus the worker WebSocket upgrade.

use axum::{
    extract::{ws::WebSocketUpgrade, MatchedPath, Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use uuid::Uuid;

use crate::error::{Error, ErrorCategory};
use crate::metrics;
use crate::models::{NewTask, Node, Task, TaskCounts, TaskId};

use super::health::create_health_router;
use super::server::AppState;
use super::store::StoreError;

/// Priority given to submissions that do not name one
pub const DEFAULT_PRIORITY: i64 = 1;

// ============================================================================
// API Types
// ============================================================================

/// Simple error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
        }
    }
}

/// Body of `POST /submit_task`
///
/// `task_type` and `data` are accepted for `kind` and `payload`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitTaskRequest {
    #[serde(default, alias = "task_type")]
    pub kind: String,
    #[serde(default = "empty_payload", alias = "data")]
    pub payload: Value,
    #[serde(default = "default_priority")]
    pub priority: i64,
}

fn empty_payload() -> Value {
    Value::Object(Default::default())
}

fn default_priority() -> i64 {
    DEFAULT_PRIORITY
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitTaskResponse {
    pub task_id: TaskId,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct TasksResponse {
    /// Every task in submission order
    pub tasks: Vec<Task>,
    /// Pending task ids in dispatch order
    pub queue: Vec<TaskId>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub nodes: Vec<Node>,
    pub tasks: TaskCounts,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the HTTP router: submission API, worker endpoint, health and metrics
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/submit_task", post(submit_task))
        .route("/task/{task_id}", get(get_task))
        .route("/tasks", get(list_tasks))
        .route("/status", get(cluster_status))
        .route("/ws", get(worker_socket))
        .route("/metrics", get(prometheus_metrics))
        .route_layer(middleware::from_fn(track_requests))
        .with_state(state.clone())
        .merge(create_health_router(state))
}

/// Router for the dedicated worker listener
pub fn create_worker_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(worker_socket))
        .route("/ws", get(worker_socket))
        .with_state(state)
}

async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    metrics::record_api_request(
        &endpoint,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

// ============================================================================
// Submission Handlers
// ============================================================================

/// Accept a task into the queue
async fn submit_task(
    State(state): State<AppState>,
    Json(request): Json<SubmitTaskRequest>,
) -> Response {
    let kind = request.kind.trim();
    if kind.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Task kind must not be empty")),
        )
            .into_response();
    }

    let task = state
        .store
        .insert(NewTask::new(kind, request.payload, request.priority))
        .await;

    metrics::record_task_submitted(&task.kind);
    metrics::set_queue_depth(state.store.queue_len().await);
    tracing::info!(
        task_id = %task.id,
        kind = %task.kind,
        priority = task.priority,
        "Task submitted"
    );

    if state.config.push_on_submit {
        state.sessions.push_task(task.id).await;
    }

    let response = SubmitTaskResponse {
        task_id: task.id,
        status: "submitted".to_string(),
        message: format!("Task {} submitted successfully", task.id),
    };
    (StatusCode::OK, Json(response)).into_response()
}

/// Current record of one task
async fn get_task(State(state): State<AppState>, Path(task_id): Path<String>) -> Response {
    let id = match Uuid::parse_str(&task_id) {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(format!("Invalid task ID: {}", task_id))),
            )
                .into_response();
        }
    };

    match state.store.get(id).await {
        Some(task) => (StatusCode::OK, Json(task)).into_response(),
        None => error_response(StoreError::NotFound(id).into()),
    }
}

/// Render a crate error with the status its category maps to
fn error_response(error: Error) -> Response {
    let status = match error.category() {
        ErrorCategory::NotFound => StatusCode::NOT_FOUND,
        ErrorCategory::Conflict => StatusCode::CONFLICT,
        ErrorCategory::Protocol => StatusCode::BAD_REQUEST,
        ErrorCategory::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCategory::Config | ErrorCategory::Io => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse::new(error.to_string()))).into_response()
}

async fn list_tasks(State(state): State<AppState>) -> impl IntoResponse {
    Json(TasksResponse {
        tasks: state.store.list().await,
        queue: state.store.queue_order().await,
    })
}

async fn cluster_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        nodes: state.registry.list().await,
        tasks: state.store.counts().await,
        timestamp: Utc::now(),
    })
}

// ============================================================================
// Worker and Metrics Handlers
// ============================================================================

/// Upgrade to a worker session
async fn worker_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        let (sink, source) = socket.split();
        let summary = state.sessions.run(source, sink).await;
        tracing::debug!(
            connection_id = %summary.connection_id,
            node_id = ?summary.node_id,
            reason = ?summary.reason,
            "Worker session ended"
        );
    })
}

async fn prometheus_metrics() -> Response {
    match metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(format!("Failed to encode metrics: {}", e))),
        )
            .into_response(),
    }
}

// ============================================================================
// Tests
// ============================================================================
