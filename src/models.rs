// Core data structures for the edgepool coordinator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Task identifier, assigned at submission
pub type TaskId = Uuid;

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting in the queue for a worker
    Pending,
    /// Bound to exactly one node
    Assigned,
    /// Worker reported success
    Completed,
    /// Worker reported failure
    Failed,
}

impl TaskStatus {
    /// Completed and failed tasks never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work with an opaque kind and payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: String,
    pub payload: Value,
    pub priority: i64,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    /// Submission order, used as the FIFO tie-break between equal priorities
    pub sequence: u64,
    pub assigned_to: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// How many times the task has been handed to a worker
    pub attempts: u32,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl Task {
    /// Create a pending task
    pub fn new(kind: impl Into<String>, payload: Value, priority: i64, sequence: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            payload,
            priority,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            sequence,
            assigned_to: None,
            assigned_at: None,
            completed_at: None,
            attempts: 0,
            result: None,
            error: None,
        }
    }

    /// Check the envelope invariants that must hold after every transition
    pub fn is_consistent(&self) -> bool {
        let assignment_ok = self.assigned_to.is_some() == (self.status == TaskStatus::Assigned);
        let outcome_ok = match self.status {
            TaskStatus::Completed => self.result.is_some() && self.error.is_none(),
            TaskStatus::Failed => self.error.is_some() && self.result.is_none(),
            TaskStatus::Pending | TaskStatus::Assigned => {
                self.result.is_none() && self.error.is_none()
            }
        };
        assignment_ok && outcome_ok
    }
}

/// Submission input for a new task
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub kind: String,
    pub payload: Value,
    pub priority: i64,
}

impl NewTask {
    pub fn new(kind: impl Into<String>, payload: Value, priority: i64) -> Self {
        Self {
            kind: kind.into(),
            payload,
            priority,
        }
    }
}

/// Connection state of a worker node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Connected,
    #[default]
    Disconnected,
}

/// A remote device that executes tasks on request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub node_id: String,
    #[serde(default)]
    pub device_info: Value,
    pub capabilities: BTreeSet<String>,
    pub performance_score: f64,
    pub status: NodeStatus,
    /// Connection currently owning this entry
    pub connection_id: Uuid,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub tasks_completed: u64,
    pub current_task: Option<TaskId>,
}

impl Node {
    /// Create a freshly connected node entry
    pub fn new(
        node_id: impl Into<String>,
        device_info: Value,
        capabilities: BTreeSet<String>,
        connection_id: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            node_id: node_id.into(),
            device_info,
            capabilities,
            performance_score: 0.0,
            status: NodeStatus::Connected,
            connection_id,
            registered_at: now,
            last_seen: now,
            disconnected_at: None,
            tasks_completed: 0,
            current_task: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == NodeStatus::Connected
    }

    pub fn is_idle(&self) -> bool {
        self.is_connected() && self.current_task.is_none()
    }

    pub fn can_run(&self, kind: &str) -> bool {
        self.capabilities.contains(kind)
    }
}

/// Per-status task totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub total: usize,
    pub pending: usize,
    pub assigned: usize,
    pub completed: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_status_serialization() {
        let json = serde_json::to_string(&TaskStatus::Assigned).unwrap();
        assert_eq!(json, "\"assigned\"");
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
    }

    #[test]
    fn test_node_status_defaults_to_disconnected() {
        assert_eq!(NodeStatus::default(), NodeStatus::Disconnected);
        let json = serde_json::to_string(&NodeStatus::Connected).unwrap();
        assert_eq!(json, "\"connected\"");
    }

    #[test]
    fn test_new_task_is_pending_and_consistent() {
        let task = Task::new("prime_calculation", json!({"start": 1, "end": 100}), 2, 0);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.assigned_to.is_none());
        assert!(task.is_consistent());
    }

    #[test]
    fn test_inconsistent_task_detected() {
        let mut task = Task::new("hash_computation", json!({}), 1, 0);
        task.status = TaskStatus::Completed;
        assert!(!task.is_consistent());

        task.result = Some(json!({"ok": true}));
        assert!(task.is_consistent());

        task.assigned_to = Some("phone-1".to_string());
        assert!(!task.is_consistent());
    }

    #[test]
    fn test_node_idle_and_capable() {
        let caps: BTreeSet<String> = ["prime_calculation".to_string()].into_iter().collect();
        let mut node = Node::new("phone-1", json!({"model": "pixel"}), caps, Uuid::new_v4());

        assert!(node.is_idle());
        assert!(node.can_run("prime_calculation"));
        assert!(!node.can_run("matrix_multiplication"));

        node.current_task = Some(Uuid::new_v4());
        assert!(!node.is_idle());

        node.current_task = None;
        node.status = NodeStatus::Disconnected;
        assert!(!node.is_idle());
    }
}
