//! Task store and priority queue
//!
//! The store is the authoritative map of every known task. The dispatch
//! queue is an ordered index over the pending tasks kept under the same lock,
//! so the two can never disagree on what is outstanding.
//!
//! Every status change goes through [`TaskStore::transition`], a
//! compare-and-swap that only applies when the task is still in the expected
//! state (and, for assigned tasks, still bound to the expected node).

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::{NewTask, Task, TaskCounts, TaskId, TaskStatus};

// ============================================================================
// Transitions
// ============================================================================

/// A requested state change, carrying the node it concerns
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// `pending -> assigned`
    Assign { node_id: String },
    /// `assigned -> pending`, back into the queue at its original position
    Requeue { node_id: String },
    /// `assigned -> completed`
    Complete { node_id: String, result: Value },
    /// `assigned -> failed`
    Fail { node_id: String, error: String },
}

impl Transition {
    /// Status the task ends up in
    pub fn target(&self) -> TaskStatus {
        match self {
            Self::Assign { .. } => TaskStatus::Assigned,
            Self::Requeue { .. } => TaskStatus::Pending,
            Self::Complete { .. } => TaskStatus::Completed,
            Self::Fail { .. } => TaskStatus::Failed,
        }
    }

    pub fn node_id(&self) -> &str {
        match self {
            Self::Assign { node_id }
            | Self::Requeue { node_id }
            | Self::Complete { node_id, .. }
            | Self::Fail { node_id, .. } => node_id,
        }
    }
}

/// Errors returned by the task store
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("task {id} is {actual}, expected {expected}")]
    Conflict {
        id: TaskId,
        expected: TaskStatus,
        actual: TaskStatus,
    },

    #[error("task {id} is not assigned to {node_id}")]
    NotAssignedTo { id: TaskId, node_id: String },

    #[error("invalid transition for task {id}: {from} -> {to}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
}

impl StoreError {
    /// True when the caller lost a race and should move on
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::NotAssignedTo { .. })
    }
}

// ============================================================================
// Queue ordering
// ============================================================================

/// Highest priority first, then submission order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    priority: Reverse<i64>,
    sequence: u64,
    id: TaskId,
}

impl QueueKey {
    fn of(task: &Task) -> Self {
        Self {
            priority: Reverse(task.priority),
            sequence: task.sequence,
            id: task.id,
        }
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    tasks: HashMap<TaskId, Task>,
    queue: BTreeSet<QueueKey>,
    next_sequence: u64,
}

impl StoreInner {
    fn first_eligible(
        &self,
        capabilities: &BTreeSet<String>,
        skip: &HashSet<TaskId>,
    ) -> Option<TaskId> {
        self.queue
            .iter()
            .filter(|key| !skip.contains(&key.id))
            .find(|key| {
                self.tasks
                    .get(&key.id)
                    .is_some_and(|task| capabilities.contains(&task.kind))
            })
            .map(|key| key.id)
    }

    fn apply(
        &mut self,
        id: TaskId,
        expected: TaskStatus,
        change: Transition,
        now: DateTime<Utc>,
    ) -> Result<Task, StoreError> {
        let Self { tasks, queue, .. } = self;
        let task = tasks.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if task.status != expected {
            return Err(StoreError::Conflict {
                id,
                expected,
                actual: task.status,
            });
        }

        let target = change.target();
        let valid = matches!(
            (expected, target),
            (TaskStatus::Pending, TaskStatus::Assigned)
                | (TaskStatus::Assigned, TaskStatus::Pending)
                | (TaskStatus::Assigned, TaskStatus::Completed)
                | (TaskStatus::Assigned, TaskStatus::Failed)
        );
        if !valid {
            return Err(StoreError::InvalidTransition {
                id,
                from: expected,
                to: target,
            });
        }

        if expected == TaskStatus::Assigned
            && task.assigned_to.as_deref() != Some(change.node_id())
        {
            return Err(StoreError::NotAssignedTo {
                id,
                node_id: change.node_id().to_string(),
            });
        }

        match change {
            Transition::Assign { node_id } => {
                queue.remove(&QueueKey::of(task));
                task.status = TaskStatus::Assigned;
                task.assigned_to = Some(node_id);
                task.assigned_at = Some(now);
                task.attempts += 1;
            }
            Transition::Requeue { .. } => {
                task.status = TaskStatus::Pending;
                task.assigned_to = None;
                task.assigned_at = None;
                queue.insert(QueueKey::of(task));
            }
            Transition::Complete { result, .. } => {
                task.status = TaskStatus::Completed;
                task.assigned_to = None;
                task.assigned_at = None;
                task.completed_at = Some(now);
                task.result = Some(result);
            }
            Transition::Fail { error, .. } => {
                task.status = TaskStatus::Failed;
                task.assigned_to = None;
                task.assigned_at = None;
                task.completed_at = Some(now);
                task.error = Some(error);
            }
        }

        Ok(task.clone())
    }
}

// ============================================================================
// Task Store
// ============================================================================

/// Authoritative map of all tasks plus the dispatch queue
#[derive(Debug, Default)]
pub struct TaskStore {
    inner: RwLock<StoreInner>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new pending task and enqueue it
    pub async fn insert(&self, new_task: NewTask) -> Task {
        let mut inner = self.inner.write().await;
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;

        let task = Task::new(new_task.kind, new_task.payload, new_task.priority, sequence);
        inner.queue.insert(QueueKey::of(&task));
        inner.tasks.insert(task.id, task.clone());
        task
    }

    /// Get a task snapshot
    pub async fn get(&self, id: TaskId) -> Option<Task> {
        self.inner.read().await.tasks.get(&id).cloned()
    }

    /// Compare-and-swap state change
    ///
    /// Fails with a conflict when the task is not in `expected`, or when it
    /// is assigned but not to the node named by `change`.
    pub async fn transition(
        &self,
        id: TaskId,
        expected: TaskStatus,
        change: Transition,
    ) -> Result<Task, StoreError> {
        self.inner.write().await.apply(id, expected, change, Utc::now())
    }

    /// Pop the best pending task this node can run, assigning it in the same step
    pub async fn next_eligible(
        &self,
        capabilities: &BTreeSet<String>,
        node_id: &str,
    ) -> Option<Task> {
        let mut inner = self.inner.write().await;
        let id = inner.first_eligible(capabilities, &HashSet::new())?;
        let change = Transition::Assign {
            node_id: node_id.to_string(),
        };
        inner.apply(id, TaskStatus::Pending, change, Utc::now()).ok()
    }

    /// Best pending task for these capabilities, without claiming it
    pub async fn peek_eligible(
        &self,
        capabilities: &BTreeSet<String>,
        skip: &HashSet<TaskId>,
    ) -> Option<TaskId> {
        self.inner.read().await.first_eligible(capabilities, skip)
    }

    /// All tasks in submission order
    pub async fn list(&self) -> Vec<Task> {
        let inner = self.inner.read().await;
        let mut tasks: Vec<Task> = inner.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| t.sequence);
        tasks
    }

    /// Pending task ids in dispatch order
    pub async fn queue_order(&self) -> Vec<TaskId> {
        self.inner.read().await.queue.iter().map(|key| key.id).collect()
    }

    pub async fn queue_len(&self) -> usize {
        self.inner.read().await.queue.len()
    }

    /// Per-status totals
    pub async fn counts(&self) -> TaskCounts {
        let inner = self.inner.read().await;
        let mut counts = TaskCounts {
            total: inner.tasks.len(),
            ..Default::default()
        };
        for task in inner.tasks.values() {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Assigned => counts.assigned += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Assigned tasks whose assignment started before `cutoff`, with their holder
    pub async fn assigned_before(&self, cutoff: DateTime<Utc>) -> Vec<(TaskId, String)> {
        self.inner
            .read()
            .await
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Assigned)
            .filter(|t| t.assigned_at.is_some_and(|at| at < cutoff))
            .filter_map(|t| t.assigned_to.clone().map(|node| (t.id, node)))
            .collect()
    }

    /// Drop terminal tasks that finished before `cutoff`. Returns how many were removed.
    pub async fn evict_terminal_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut inner = self.inner.write().await;
        let before = inner.tasks.len();
        inner.tasks.retain(|_, task| {
            !(task.status.is_terminal() && task.completed_at.is_some_and(|at| at < cutoff))
        });
        before - inner.tasks.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
