//! Worker wire protocol
//!
//! Every frame is a JSON text message tagged by a `type` field.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use thiserror::Error;

use crate::models::{Task, TaskId};

/// Upper bound on node id length
pub const MAX_NODE_ID_LEN: usize = 128;

// ============================================================================
// Inbound
// ============================================================================

/// Messages sent by a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    Register {
        node_id: String,
        #[serde(default)]
        device_info: Value,
        #[serde(default)]
        capabilities: BTreeSet<String>,
        #[serde(default)]
        performance_score: Option<f64>,
    },
    RequestTask,
    TaskResult {
        task_id: TaskId,
        #[serde(default)]
        status: Option<ResultStatus>,
        /// Older workers report `success` instead of `status`
        #[serde(default)]
        success: Option<bool>,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<String>,
    },
    Heartbeat,
    Capabilities {
        capabilities: BTreeSet<String>,
    },
    PerformanceUpdate {
        score: f64,
    },
}

impl WorkerMessage {
    /// Wire name of the message type
    pub fn name(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::RequestTask => "request_task",
            Self::TaskResult { .. } => "task_result",
            Self::Heartbeat => "heartbeat",
            Self::Capabilities { .. } => "capabilities",
            Self::PerformanceUpdate { .. } => "performance_update",
        }
    }
}

/// Outcome a worker reports for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Completed,
    Failed,
}

/// A decoded `task_result`, normalised to one outcome
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed(Value),
    Failed(String),
}

impl TaskOutcome {
    /// Resolve the reported fields into a single outcome
    ///
    /// `status` wins over the legacy `success` flag; with neither present the
    /// result counts as a success.
    pub fn resolve(
        status: Option<ResultStatus>,
        success: Option<bool>,
        result: Option<Value>,
        error: Option<String>,
    ) -> Self {
        let failed = match status {
            Some(ResultStatus::Failed) => true,
            Some(ResultStatus::Completed) => false,
            None => !success.unwrap_or(true),
        };

        if failed {
            Self::Failed(
                error.unwrap_or_else(|| "task failed without an error message".to_string()),
            )
        } else {
            Self::Completed(result.unwrap_or(Value::Null))
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
        }
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// Acknowledgement status for a reported result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Received,
    Rejected,
}

/// Messages sent by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinatorMessage {
    Welcome {
        node_id: String,
        message: String,
        heartbeat_interval_secs: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resumed_task: Option<TaskId>,
    },
    TaskAssignment {
        task_id: TaskId,
        kind: String,
        payload: Value,
        priority: i64,
    },
    NoTasks {
        message: String,
    },
    TaskAck {
        task_id: TaskId,
        status: AckStatus,
    },
    HeartbeatAck,
}

impl CoordinatorMessage {
    pub fn assignment(task: &Task) -> Self {
        Self::TaskAssignment {
            task_id: task.id,
            kind: task.kind.clone(),
            payload: task.payload.clone(),
            priority: task.priority,
        }
    }

    pub fn no_tasks(message: impl Into<String>) -> Self {
        Self::NoTasks {
            message: message.into(),
        }
    }

    /// Encode as a JSON text frame
    pub fn to_frame(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Protocol violations; each one ends the offending connection
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("binary frames are not supported")]
    BinaryFrame,

    #[error("invalid node id: '{0}'")]
    InvalidNodeId(String),

    #[error("'{message}' is not allowed before registration")]
    NotRegistered { message: &'static str },

    #[error("node already registered as '{0}' on this connection")]
    AlreadyRegistered(String),

    #[error("failed to encode message: {0}")]
    Encode(String),
}

/// Decode one inbound text frame
pub fn parse_worker_message(frame: &str) -> Result<WorkerMessage, ProtocolError> {
    let message: WorkerMessage =
        serde_json::from_str(frame).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    if let WorkerMessage::Register { node_id, .. } = &message {
        validate_node_id(node_id)?;
    }

    Ok(message)
}

/// Node ids are short printable tokens
pub fn validate_node_id(node_id: &str) -> Result<(), ProtocolError> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._:@-]*$").ok());

    let well_formed = pattern.as_ref().is_some_and(|re| re.is_match(node_id));
    if node_id.len() > MAX_NODE_ID_LEN || !well_formed {
        return Err(ProtocolError::InvalidNodeId(node_id.to_string()));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
