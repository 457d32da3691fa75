//! Common test utilities

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower::ServiceExt;

use edgepool::coordinator::api::create_router;
use edgepool::coordinator::session::SessionSummary;
use edgepool::coordinator::transport::{memory_transport, WorkerEnd};
use edgepool::coordinator::{AppState, CoordinatorConfig, CoordinatorMessage, WorkerMessage};

/// How long a test waits for a coordinator reply
pub const WAIT: Duration = Duration::from_secs(2);

/// Fresh coordinator state with default settings
pub fn test_state() -> AppState {
    AppState::new(CoordinatorConfig::default())
}

pub fn test_state_with(config: CoordinatorConfig) -> AppState {
    AppState::new(config)
}

pub fn router(state: &AppState) -> Router {
    create_router(state.clone())
}

/// Send one request through the router and decode the JSON body
pub async fn call(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

pub async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    call(router, Method::GET, uri, None).await
}

pub async fn post(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    call(router, Method::POST, uri, Some(body)).await
}

/// Submit a task over HTTP and return its id
pub async fn submit(router: &Router, kind: &str, payload: Value, priority: i64) -> String {
    let (status, body) = post(
        router,
        "/submit_task",
        json!({"kind": kind, "payload": payload, "priority": priority}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "submit failed: {body}");
    body["task_id"].as_str().unwrap().to_string()
}

/// Open an in-memory worker connection served by the coordinator
pub fn connect(state: &AppState) -> (WorkerEnd, JoinHandle<SessionSummary>) {
    let (source, sink, worker) = memory_transport();
    let sessions = state.sessions.clone();
    let handle = tokio::spawn(async move { sessions.run(source, sink).await });
    (worker, handle)
}

pub fn register_message(node_id: &str, kinds: &[&str]) -> WorkerMessage {
    WorkerMessage::Register {
        node_id: node_id.to_string(),
        device_info: json!({"platform": "test", "cpu_count": 4}),
        capabilities: kinds.iter().map(|k| k.to_string()).collect::<BTreeSet<_>>(),
        performance_score: None,
    }
}

/// Connect and register, waiting for the welcome
pub async fn register_worker(
    state: &AppState,
    node_id: &str,
    kinds: &[&str],
) -> (WorkerEnd, JoinHandle<SessionSummary>) {
    let (mut worker, handle) = connect(state);
    assert!(worker.send(&register_message(node_id, kinds)));
    match worker.recv_timeout(WAIT).await {
        Some(CoordinatorMessage::Welcome { node_id: id, .. }) => assert_eq!(id, node_id),
        other => panic!("expected welcome for {node_id}, got {other:?}"),
    }
    (worker, handle)
}

/// Ask for work and return the reply
pub async fn request_task(worker: &mut WorkerEnd) -> CoordinatorMessage {
    assert!(worker.send(&WorkerMessage::RequestTask));
    worker
        .recv_timeout(WAIT)
        .await
        .expect("no reply to request_task")
}

pub fn completed(task_id: &str, result: Value) -> WorkerMessage {
    WorkerMessage::TaskResult {
        task_id: task_id.parse().unwrap(),
        status: Some(edgepool::coordinator::protocol::ResultStatus::Completed),
        success: None,
        result: Some(result),
        error: None,
    }
}
