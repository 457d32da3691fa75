//! Worker sessions
//!
//! One session per worker connection. The receive loop handles inbound
//! messages in order; replies and pushed assignments go through a bounded
//! outbound queue drained by a dedicated writer task, so a slow worker only
//! ever stalls its own connection.
//!
//! ```text
//! connecting ──register──▶ idle ◀──task_result── awaiting_result
//!                           │                          ▲
//!                           └──────request_task────────┘
//!        (any state) ──transport failure / protocol error──▶ closed
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::error::ErrorCategory;
use crate::metrics;
use crate::models::{Node, TaskId, TaskStatus};

use super::assignment::AssignmentEngine;
use super::liveness::LivenessMonitor;
use super::protocol::{
    parse_worker_message, AckStatus, CoordinatorMessage, ProtocolError, TaskOutcome, WorkerMessage,
};
use super::registry::{NodeRegistry, RegisterRequest, RegistryError};
use super::store::{TaskStore, Transition};
use super::transport::{Frame, FrameSink, FrameSource, TransportError};

const WELCOME_MESSAGE: &str = "Connected to edgepool coordinator";
const NO_TASKS_MESSAGE: &str = "No tasks available";
const BUSY_MESSAGE: &str = "Report the result of the current task first";

/// Per-connection protocol state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Idle,
    AwaitingResult(TaskId),
    Closed,
}

/// Errors that end a session
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SessionError {
    /// Metric label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Protocol(ProtocolError::Malformed(_)) => "malformed",
            Self::Protocol(ProtocolError::BinaryFrame) => "binary_frame",
            Self::Protocol(ProtocolError::InvalidNodeId(_)) => "invalid_node_id",
            Self::Protocol(ProtocolError::NotRegistered { .. }) => "not_registered",
            Self::Protocol(ProtocolError::AlreadyRegistered(_)) => "already_registered",
            Self::Protocol(ProtocolError::Encode(_)) => "encode",
            Self::Registry(RegistryError::Superseded(_)) => "superseded",
            Self::Registry(_) => "registry",
            Self::Transport(_) => "transport",
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum CloseReason {
    /// Worker closed the connection or it dropped
    PeerClosed,
    Transport(TransportError),
    Error(SessionError),
}

/// Final record of a finished session
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub connection_id: Uuid,
    pub node_id: Option<String>,
    pub reason: CloseReason,
}

/// Outbound queue registered for a node
struct Outbound {
    connection_id: Uuid,
    sender: mpsc::Sender<CoordinatorMessage>,
}

/// State of one live connection
struct Session {
    connection_id: Uuid,
    node_id: Option<String>,
    state: SessionState,
    outbound: mpsc::Sender<CoordinatorMessage>,
}

impl Session {
    fn node_id(&self, message: &'static str) -> Result<&str, ProtocolError> {
        self.node_id
            .as_deref()
            .ok_or(ProtocolError::NotRegistered { message })
    }

    async fn send(&self, message: CoordinatorMessage) -> Result<(), SessionError> {
        self.outbound
            .send(message)
            .await
            .map_err(|_| SessionError::Transport(TransportError::Closed))
    }
}

// ============================================================================
// Session Manager
// ============================================================================

/// Runs worker sessions and routes pushed messages to them
pub struct SessionManager {
    registry: Arc<NodeRegistry>,
    store: Arc<TaskStore>,
    engine: Arc<AssignmentEngine>,
    monitor: Arc<LivenessMonitor>,
    outbound: RwLock<HashMap<String, Outbound>>,
    heartbeat_interval_secs: u64,
    queue_capacity: usize,
}

impl SessionManager {
    pub fn new(
        registry: Arc<NodeRegistry>,
        store: Arc<TaskStore>,
        engine: Arc<AssignmentEngine>,
        monitor: Arc<LivenessMonitor>,
        heartbeat_interval_secs: u64,
        queue_capacity: usize,
    ) -> Self {
        Self {
            registry,
            store,
            engine,
            monitor,
            outbound: RwLock::new(HashMap::new()),
            heartbeat_interval_secs,
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Drive one connection until it closes
    pub async fn run<S, K>(&self, mut source: S, sink: K) -> SessionSummary
    where
        S: FrameSource,
        K: FrameSink + 'static,
    {
        let connection_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let writer = tokio::spawn(write_loop(sink, rx, connection_id));

        let mut session = Session {
            connection_id,
            node_id: None,
            state: SessionState::Connecting,
            outbound: tx,
        };

        tracing::debug!(connection_id = %connection_id, "Worker connection opened");

        let reason = loop {
            let frame = match source.next_frame().await {
                None => break CloseReason::PeerClosed,
                Some(Err(e)) => break CloseReason::Transport(e),
                Some(Ok(frame)) => frame,
            };

            let text = match frame {
                Frame::Text(text) => text,
                Frame::Control => continue,
                Frame::Close => break CloseReason::PeerClosed,
                Frame::Binary(_) => {
                    break self.reject(&session, ProtocolError::BinaryFrame.into());
                }
            };

            if let Err(e) = self.handle_frame(&mut session, &text).await {
                break self.reject(&session, e);
            }
        };

        self.close(&mut session).await;

        // the writer drains what is queued, then closes the sink
        drop(session.outbound);
        if let Err(e) = writer.await {
            tracing::warn!(connection_id = %connection_id, error = %e, "Session writer failed");
        }

        SessionSummary {
            connection_id,
            node_id: session.node_id,
            reason,
        }
    }

    /// Deliver a message to the connection that currently owns `node`
    ///
    /// Never waits: a full or missing queue returns false.
    pub async fn push(&self, node: &Node, message: CoordinatorMessage) -> bool {
        let outbound = self.outbound.read().await;
        match outbound.get(&node.node_id) {
            Some(entry) if entry.connection_id == node.connection_id => {
                entry.sender.try_send(message).is_ok()
            }
            _ => false,
        }
    }

    /// Claim a newly submitted task for an idle worker and push it
    ///
    /// Returns the node that received it. A failed delivery reverts the claim.
    pub async fn push_task(&self, task_id: TaskId) -> Option<String> {
        let (node, task) = self.engine.dispatch(task_id).await?;

        if self.push(&node, CoordinatorMessage::assignment(&task)).await {
            tracing::info!(node_id = %node.node_id, task_id = %task.id, "Task pushed");
            Some(node.node_id)
        } else {
            tracing::debug!(node_id = %node.node_id, task_id = %task.id, "Push delivery failed");
            self.engine.revert(&node.node_id, task.id).await;
            None
        }
    }

    /// Number of connections with a registered node
    pub async fn active_sessions(&self) -> usize {
        self.outbound.read().await.len()
    }

    async fn handle_frame(&self, session: &mut Session, text: &str) -> Result<(), SessionError> {
        match parse_worker_message(text)? {
            WorkerMessage::Register {
                node_id,
                device_info,
                capabilities,
                performance_score,
            } => {
                let request = RegisterRequest {
                    node_id,
                    device_info,
                    capabilities,
                    performance_score,
                };
                self.register(session, request).await
            }
            message => {
                let node_id = session.node_id(message.name())?.to_string();
                self.registry.touch(&node_id, session.connection_id).await?;
                self.handle_message(session, &node_id, message).await
            }
        }
    }

    async fn register(
        &self,
        session: &mut Session,
        request: RegisterRequest,
    ) -> Result<(), SessionError> {
        if let Some(existing) = &session.node_id {
            return Err(ProtocolError::AlreadyRegistered(existing.clone()).into());
        }

        let registration = self.registry.upsert(request, session.connection_id).await?;
        let node_id = registration.node.node_id.clone();

        self.outbound.write().await.insert(
            node_id.clone(),
            Outbound {
                connection_id: session.connection_id,
                sender: session.outbound.clone(),
            },
        );

        session.node_id = Some(node_id.clone());
        session.state = match registration.resumed_task {
            Some(task_id) => SessionState::AwaitingResult(task_id),
            None => SessionState::Idle,
        };

        tracing::info!(
            node_id = %node_id,
            connection_id = %session.connection_id,
            capabilities = ?registration.node.capabilities,
            fresh = registration.fresh,
            resumed_task = ?registration.resumed_task,
            "Node registered"
        );
        self.refresh_node_gauge().await;

        session
            .send(CoordinatorMessage::Welcome {
                node_id,
                message: WELCOME_MESSAGE.to_string(),
                heartbeat_interval_secs: self.heartbeat_interval_secs,
                resumed_task: registration.resumed_task,
            })
            .await
    }

    async fn handle_message(
        &self,
        session: &mut Session,
        node_id: &str,
        message: WorkerMessage,
    ) -> Result<(), SessionError> {
        match message {
            WorkerMessage::Register { .. } => {
                Err(ProtocolError::AlreadyRegistered(node_id.to_string()).into())
            }

            WorkerMessage::RequestTask => {
                match self.engine.request_task(node_id, session.connection_id).await {
                    Ok(Some(task)) => {
                        session.state = SessionState::AwaitingResult(task.id);
                        session.send(CoordinatorMessage::assignment(&task)).await
                    }
                    Ok(None) => {
                        session.state = SessionState::Idle;
                        session
                            .send(CoordinatorMessage::no_tasks(NO_TASKS_MESSAGE))
                            .await
                    }
                    Err(RegistryError::Busy { task_id, .. }) => {
                        session.state = SessionState::AwaitingResult(task_id);
                        session.send(CoordinatorMessage::no_tasks(BUSY_MESSAGE)).await
                    }
                    Err(e) => Err(e.into()),
                }
            }

            WorkerMessage::TaskResult {
                task_id,
                status,
                success,
                result,
                error,
            } => {
                let outcome = TaskOutcome::resolve(status, success, result, error);
                let ack = self.accept_result(node_id, task_id, outcome).await;
                if ack == AckStatus::Received
                    || session.state == SessionState::AwaitingResult(task_id)
                {
                    session.state = SessionState::Idle;
                }
                session
                    .send(CoordinatorMessage::TaskAck {
                        task_id,
                        status: ack,
                    })
                    .await
            }

            WorkerMessage::Heartbeat => session.send(CoordinatorMessage::HeartbeatAck).await,

            WorkerMessage::Capabilities { capabilities } => {
                tracing::info!(
                    node_id = %node_id,
                    capabilities = ?capabilities,
                    "Capabilities updated"
                );
                self.registry
                    .update_capabilities(node_id, session.connection_id, capabilities)
                    .await?;
                Ok(())
            }

            WorkerMessage::PerformanceUpdate { score } => {
                if !score.is_finite() {
                    return Err(ProtocolError::Malformed(format!(
                        "performance score must be finite, got {score}"
                    ))
                    .into());
                }
                self.registry
                    .update_performance(node_id, session.connection_id, score)
                    .await?;
                Ok(())
            }
        }
    }

    /// Apply a reported result if the task is still this node's
    async fn accept_result(
        &self,
        node_id: &str,
        task_id: TaskId,
        outcome: TaskOutcome,
    ) -> AckStatus {
        let label = outcome.label();
        let change = match outcome {
            TaskOutcome::Completed(result) => Transition::Complete {
                node_id: node_id.to_string(),
                result,
            },
            TaskOutcome::Failed(error) => Transition::Fail {
                node_id: node_id.to_string(),
                error,
            },
        };

        match self
            .store
            .transition(task_id, TaskStatus::Assigned, change)
            .await
        {
            Ok(task) => {
                self.registry.complete_task(node_id, task_id).await;
                metrics::record_task_result(label);
                tracing::info!(
                    node_id = %node_id,
                    task_id = %task_id,
                    kind = %task.kind,
                    outcome = label,
                    "Task result received"
                );
                AckStatus::Received
            }
            Err(e) => {
                metrics::record_stale_result();
                tracing::warn!(
                    node_id = %node_id,
                    task_id = %task_id,
                    error = %e,
                    "Rejected stale task result"
                );
                AckStatus::Rejected
            }
        }
    }

    fn reject(&self, session: &Session, error: SessionError) -> CloseReason {
        metrics::record_protocol_error(error.kind());
        let category = crate::error::Error::from(error.clone()).category();
        if category == ErrorCategory::Conflict {
            // replaced or over capacity, not a misbehaving worker
            tracing::info!(
                connection_id = %session.connection_id,
                node_id = ?session.node_id,
                category = category.as_str(),
                error = %error,
                "Dropping worker connection"
            );
        } else {
            tracing::warn!(
                connection_id = %session.connection_id,
                node_id = ?session.node_id,
                state = ?session.state,
                category = category.as_str(),
                error = %error,
                "Dropping worker connection"
            );
        }
        CloseReason::Error(error)
    }

    /// Release everything this connection owns
    async fn close(&self, session: &mut Session) {
        session.state = SessionState::Closed;

        let Some(node_id) = session.node_id.as_deref() else {
            tracing::debug!(
                connection_id = %session.connection_id,
                "Unregistered connection closed"
            );
            return;
        };

        {
            let mut outbound = self.outbound.write().await;
            if outbound
                .get(node_id)
                .is_some_and(|entry| entry.connection_id == session.connection_id)
            {
                outbound.remove(node_id);
            }
        }

        match self
            .registry
            .mark_disconnected(node_id, session.connection_id)
            .await
        {
            Ok(held) => self.monitor.handoff(node_id, held),
            Err(e) => {
                tracing::debug!(
                    node_id = %node_id,
                    error = %e,
                    "Closed connection no longer owned the node"
                );
            }
        }

        self.refresh_node_gauge().await;
    }

    async fn refresh_node_gauge(&self) {
        let stats = self.registry.stats().await;
        metrics::set_node_counts(stats.connected, stats.total_nodes);
    }
}

/// Drain the outbound queue into the transport
async fn write_loop<K: FrameSink>(
    mut sink: K,
    mut rx: mpsc::Receiver<CoordinatorMessage>,
    connection_id: Uuid,
) {
    while let Some(message) = rx.recv().await {
        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(
                    connection_id = %connection_id,
                    error = %e,
                    "Dropping unencodable message"
                );
                continue;
            }
        };
        if let Err(e) = sink.send_text(frame).await {
            tracing::debug!(connection_id = %connection_id, error = %e, "Worker write failed");
            break;
        }
    }

    if let Err(e) = sink.close().await {
        tracing::debug!(connection_id = %connection_id, error = %e, "Worker close failed");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::assignment::DEFAULT_MAX_ATTEMPTS;
    use crate::coordinator::liveness::LivenessPolicy;
    use crate::coordinator::transport::{memory_transport, WorkerEnd};
    use crate::models::NewTask;
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::time::Duration;
    use tokio::task::JoinHandle;

    const WAIT: Duration = Duration::from_secs(2);

    struct Harness {
        store: Arc<TaskStore>,
        registry: Arc<NodeRegistry>,
        sessions: Arc<SessionManager>,
    }

    fn harness() -> Harness {
        let store = Arc::new(TaskStore::new());
        let registry = Arc::new(NodeRegistry::new(16));
        let engine = Arc::new(AssignmentEngine::new(
            store.clone(),
            registry.clone(),
            DEFAULT_MAX_ATTEMPTS,
        ));
        let monitor = Arc::new(LivenessMonitor::new(
            store.clone(),
            registry.clone(),
            LivenessPolicy::default(),
        ));
        let sessions = Arc::new(SessionManager::new(
            registry.clone(),
            store.clone(),
            engine,
            monitor,
            30,
            8,
        ));
        Harness {
            store,
            registry,
            sessions,
        }
    }

    fn connect(h: &Harness) -> (WorkerEnd, JoinHandle<SessionSummary>) {
        let (source, sink, worker) = memory_transport();
        let sessions = h.sessions.clone();
        let handle = tokio::spawn(async move { sessions.run(source, sink).await });
        (worker, handle)
    }

    fn register(node_id: &str, kinds: &[&str]) -> WorkerMessage {
        WorkerMessage::Register {
            node_id: node_id.to_string(),
            device_info: json!({"model": "test"}),
            capabilities: kinds.iter().map(|k| k.to_string()).collect::<BTreeSet<_>>(),
            performance_score: None,
        }
    }

    async fn registered(
        h: &Harness,
        node_id: &str,
        kinds: &[&str],
    ) -> (WorkerEnd, JoinHandle<SessionSummary>) {
        let (mut worker, handle) = connect(h);
        worker.send(&register(node_id, kinds));
        match worker.recv_timeout(WAIT).await {
            Some(CoordinatorMessage::Welcome { node_id: id, .. }) => assert_eq!(id, node_id),
            other => panic!("expected welcome, got {other:?}"),
        }
        (worker, handle)
    }

    #[tokio::test]
    async fn test_register_heartbeat_and_no_tasks() {
        let h = harness();
        let (mut worker, _handle) = registered(&h, "n1", &["a"]).await;

        worker.send(&WorkerMessage::Heartbeat);
        assert_eq!(worker.recv_timeout(WAIT).await, Some(CoordinatorMessage::HeartbeatAck));

        worker.send(&WorkerMessage::RequestTask);
        assert!(matches!(
            worker.recv_timeout(WAIT).await,
            Some(CoordinatorMessage::NoTasks { .. })
        ));
        assert_eq!(h.sessions.active_sessions().await, 1);
    }

    #[tokio::test]
    async fn test_request_and_report_result() {
        let h = harness();
        let task = h
            .store
            .insert(NewTask::new("prime_calculation", json!({"start": 1, "end": 100}), 2))
            .await;
        let (mut worker, _handle) = registered(&h, "n1", &["prime_calculation"]).await;

        worker.send(&WorkerMessage::RequestTask);
        match worker.recv_timeout(WAIT).await {
            Some(CoordinatorMessage::TaskAssignment { task_id, payload, .. }) => {
                assert_eq!(task_id, task.id);
                assert_eq!(payload["end"], 100);
            }
            other => panic!("expected assignment, got {other:?}"),
        }

        worker.send(&WorkerMessage::TaskResult {
            task_id: task.id,
            status: None,
            success: None,
            result: Some(json!({"count": 25})),
            error: None,
        });
        assert_eq!(
            worker.recv_timeout(WAIT).await,
            Some(CoordinatorMessage::TaskAck {
                task_id: task.id,
                status: AckStatus::Received,
            })
        );

        let stored = h.store.get(task.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
        assert_eq!(stored.result, Some(json!({"count": 25})));
        assert_eq!(h.registry.get("n1").await.unwrap().tasks_completed, 1);
    }

    #[tokio::test]
    async fn test_unknown_result_rejected() {
        let h = harness();
        let (mut worker, _handle) = registered(&h, "n1", &["a"]).await;
        let bogus = Uuid::new_v4();

        worker.send(&WorkerMessage::TaskResult {
            task_id: bogus,
            status: None,
            success: Some(true),
            result: Some(json!(1)),
            error: None,
        });
        assert_eq!(
            worker.recv_timeout(WAIT).await,
            Some(CoordinatorMessage::TaskAck {
                task_id: bogus,
                status: AckStatus::Rejected,
            })
        );
    }

    #[tokio::test]
    async fn test_message_before_register_drops_connection() {
        let h = harness();
        let (mut worker, handle) = connect(&h);

        worker.send(&WorkerMessage::RequestTask);
        let summary = handle.await.unwrap();

        assert!(matches!(
            summary.reason,
            CloseReason::Error(SessionError::Protocol(ProtocolError::NotRegistered { .. }))
        ));
        worker.closed().await;
    }

    #[tokio::test]
    async fn test_malformed_frame_drops_connection() {
        let h = harness();
        let (worker, handle) = registered(&h, "n1", &["a"]).await;

        worker.send_raw("{not json");
        let summary = handle.await.unwrap();

        assert_eq!(summary.node_id.as_deref(), Some("n1"));
        assert!(matches!(
            summary.reason,
            CloseReason::Error(SessionError::Protocol(ProtocolError::Malformed(_)))
        ));
        assert!(!h.registry.get("n1").await.unwrap().is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_keeps_task_for_grace_window() {
        let h = harness();
        let task = h.store.insert(NewTask::new("a", json!({}), 1)).await;
        let (mut worker, handle) = registered(&h, "n1", &["a"]).await;

        worker.send(&WorkerMessage::RequestTask);
        assert!(matches!(
            worker.recv_timeout(WAIT).await,
            Some(CoordinatorMessage::TaskAssignment { .. })
        ));

        worker.disconnect();
        let summary = handle.await.unwrap();
        assert_eq!(summary.reason, CloseReason::PeerClosed);

        let node = h.registry.get("n1").await.unwrap();
        assert!(!node.is_connected());
        assert_eq!(node.current_task, Some(task.id));
        assert_eq!(h.store.get(task.id).await.unwrap().status, TaskStatus::Assigned);

        // reconnecting resumes the task
        let (mut worker, _handle) = connect(&h);
        worker.send(&register("n1", &["a"]));
        match worker.recv_timeout(WAIT).await {
            Some(CoordinatorMessage::Welcome { resumed_task, .. }) => {
                assert_eq!(resumed_task, Some(task.id))
            }
            other => panic!("expected welcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_superseded_connection_is_dropped() {
        let h = harness();
        let (old, old_handle) = registered(&h, "n1", &["a"]).await;
        let (mut new, _new_handle) = registered(&h, "n1", &["a"]).await;

        old.send(&WorkerMessage::Heartbeat);
        let summary = old_handle.await.unwrap();
        assert!(matches!(
            summary.reason,
            CloseReason::Error(SessionError::Registry(RegistryError::Superseded(_)))
        ));

        // the old connection's close leaves the new owner connected
        assert!(h.registry.get("n1").await.unwrap().is_connected());
        new.send(&WorkerMessage::Heartbeat);
        assert_eq!(new.recv_timeout(WAIT).await, Some(CoordinatorMessage::HeartbeatAck));
    }

    #[tokio::test]
    async fn test_capabilities_update_changes_eligibility() {
        let h = harness();
        let task = h.store.insert(NewTask::new("b", json!({}), 1)).await;
        let (mut worker, _handle) = registered(&h, "n1", &["a"]).await;

        worker.send(&WorkerMessage::RequestTask);
        assert!(matches!(
            worker.recv_timeout(WAIT).await,
            Some(CoordinatorMessage::NoTasks { .. })
        ));

        worker.send(&WorkerMessage::Capabilities {
            capabilities: ["a".to_string(), "b".to_string()].into_iter().collect(),
        });
        worker.send(&WorkerMessage::PerformanceUpdate { score: 3.5 });
        worker.send(&WorkerMessage::RequestTask);
        match worker.recv_timeout(WAIT).await {
            Some(CoordinatorMessage::TaskAssignment { task_id, .. }) => {
                assert_eq!(task_id, task.id)
            }
            other => panic!("expected assignment, got {other:?}"),
        }
        assert_eq!(h.registry.get("n1").await.unwrap().performance_score, 3.5);
    }

    #[tokio::test]
    async fn test_push_task_reaches_idle_worker() {
        let h = harness();
        let (mut worker, _handle) = registered(&h, "n1", &["a"]).await;
        let task = h.store.insert(NewTask::new("a", json!({"x": 1}), 1)).await;

        assert_eq!(h.sessions.push_task(task.id).await.as_deref(), Some("n1"));
        match worker.recv_timeout(WAIT).await {
            Some(CoordinatorMessage::TaskAssignment { task_id, .. }) => {
                assert_eq!(task_id, task.id)
            }
            other => panic!("expected assignment, got {other:?}"),
        }

        // a request while holding the pushed task gets no_tasks
        worker.send(&WorkerMessage::RequestTask);
        assert!(matches!(
            worker.recv_timeout(WAIT).await,
            Some(CoordinatorMessage::NoTasks { .. })
        ));
    }
}
