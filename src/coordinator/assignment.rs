//! Task assignment
//!
//! Matches queued tasks to idle, capable workers. Tasks are chosen by
//! priority then submission order; the store's compare-and-swap decides
//! which of several racing requests wins a given task.

use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::metrics;
use crate::models::{Node, Task, TaskId, TaskStatus};

use super::registry::{NodeRegistry, RegistryError};
use super::store::{TaskStore, Transition};

/// Default number of tasks tried before answering "no task"
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Assignment policy invoked on each `request_task`
pub struct AssignmentEngine {
    store: Arc<TaskStore>,
    registry: Arc<NodeRegistry>,
    max_attempts: usize,
}

impl AssignmentEngine {
    pub fn new(store: Arc<TaskStore>, registry: Arc<NodeRegistry>, max_attempts: usize) -> Self {
        Self {
            store,
            registry,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Find and claim the best task for a pulling node
    ///
    /// Returns `Ok(None)` when nothing eligible is queued or every candidate
    /// was lost to a concurrent claim within the attempt budget.
    pub async fn request_task(
        &self,
        node_id: &str,
        connection_id: Uuid,
    ) -> Result<Option<Task>, RegistryError> {
        let node = self
            .registry
            .get(node_id)
            .await
            .ok_or_else(|| RegistryError::NodeNotFound(node_id.to_string()))?;

        if node.connection_id != connection_id {
            return Err(RegistryError::Superseded(node_id.to_string()));
        }
        if !node.is_connected() {
            return Err(RegistryError::NotConnected(node_id.to_string()));
        }
        if let Some(task_id) = node.current_task {
            return Err(RegistryError::Busy {
                node_id: node_id.to_string(),
                task_id,
            });
        }

        let mut skipped: HashSet<TaskId> = HashSet::new();

        for attempt in 1..=self.max_attempts {
            let Some(candidate) = self.store.peek_eligible(&node.capabilities, &skipped).await
            else {
                return Ok(None);
            };

            let change = Transition::Assign {
                node_id: node_id.to_string(),
            };
            match self
                .store
                .transition(candidate, TaskStatus::Pending, change)
                .await
            {
                Ok(task) => return self.bind(&node, task).await.map(Some),
                Err(e) => {
                    tracing::debug!(
                        node_id = %node_id,
                        task_id = %candidate,
                        attempt,
                        error = %e,
                        "Lost claim race, trying next task"
                    );
                    skipped.insert(candidate);
                }
            }
        }

        tracing::debug!(
            node_id = %node_id,
            attempts = self.max_attempts,
            "Assignment attempts exhausted"
        );
        Ok(None)
    }

    /// Claim a freshly submitted task for the best idle capable node
    ///
    /// Used by push dispatch. Candidates are tried best performer first.
    pub async fn dispatch(&self, task_id: TaskId) -> Option<(Node, Task)> {
        let task = self.store.get(task_id).await?;
        if task.status != TaskStatus::Pending {
            return None;
        }

        for node in self.registry.list_idle_capable(&task.kind).await {
            let change = Transition::Assign {
                node_id: node.node_id.clone(),
            };
            let claimed = match self
                .store
                .transition(task_id, TaskStatus::Pending, change)
                .await
            {
                Ok(claimed) => claimed,
                // already pulled by someone else
                Err(_) => return None,
            };

            match self.bind(&node, claimed).await {
                Ok(claimed) => return Some((node, claimed)),
                Err(e) => {
                    tracing::debug!(
                        node_id = %node.node_id,
                        error = %e,
                        "Push candidate unavailable"
                    );
                }
            }
        }

        None
    }

    /// Undo an assignment that could not be delivered
    pub async fn revert(&self, node_id: &str, task_id: TaskId) {
        self.registry.release_task(node_id, task_id).await;

        let change = Transition::Requeue {
            node_id: node_id.to_string(),
        };
        match self
            .store
            .transition(task_id, TaskStatus::Assigned, change)
            .await
        {
            Ok(_) => {
                tracing::debug!(node_id = %node_id, task_id = %task_id, "Assignment reverted");
            }
            Err(e) => {
                tracing::debug!(
                    node_id = %node_id,
                    task_id = %task_id,
                    error = %e,
                    "Nothing to revert"
                );
            }
        }
    }

    /// Record the claim on the node, rolling the task back if that fails
    async fn bind(&self, node: &Node, task: Task) -> Result<Task, RegistryError> {
        match self
            .registry
            .assign(&node.node_id, node.connection_id, task.id, &task.kind)
            .await
        {
            Ok(()) => {
                metrics::record_task_assigned(&task.kind);
                tracing::info!(
                    node_id = %node.node_id,
                    task_id = %task.id,
                    kind = %task.kind,
                    priority = task.priority,
                    "Task assigned"
                );
                Ok(task)
            }
            Err(e) => {
                self.revert(&node.node_id, task.id).await;
                Err(e)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::registry::RegisterRequest;
    use crate::models::NewTask;
    use serde_json::json;

    struct Fixture {
        store: Arc<TaskStore>,
        registry: Arc<NodeRegistry>,
        engine: AssignmentEngine,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(TaskStore::new());
        let registry = Arc::new(NodeRegistry::new(10));
        let engine = AssignmentEngine::new(store.clone(), registry.clone(), DEFAULT_MAX_ATTEMPTS);
        Fixture {
            store,
            registry,
            engine,
        }
    }

    async fn connect(registry: &NodeRegistry, id: &str, kinds: &[&str], score: f64) -> Uuid {
        let conn = Uuid::new_v4();
        registry
            .upsert(
                RegisterRequest {
                    node_id: id.to_string(),
                    device_info: json!({}),
                    capabilities: kinds.iter().map(|k| k.to_string()).collect(),
                    performance_score: Some(score),
                },
                conn,
            )
            .await
            .unwrap();
        conn
    }

    #[tokio::test]
    async fn test_request_task_assigns_best_match() {
        let f = fixture();
        let conn = connect(&f.registry, "n1", &["prime_calculation"], 1.0).await;
        f.store.insert(NewTask::new("matrix_multiplication", json!({}), 9)).await;
        let low = f.store.insert(NewTask::new("prime_calculation", json!({}), 1)).await;
        let high = f.store.insert(NewTask::new("prime_calculation", json!({}), 2)).await;

        let task = f.engine.request_task("n1", conn).await.unwrap().unwrap();
        assert_eq!(task.id, high.id);

        let node = f.registry.get("n1").await.unwrap();
        assert_eq!(node.current_task, Some(high.id));
        assert_eq!(f.store.get(low.id).await.unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_request_task_none_when_queue_empty() {
        let f = fixture();
        let conn = connect(&f.registry, "n1", &["a"], 1.0).await;
        assert!(f.engine.request_task("n1", conn).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_busy_node_gets_nothing_new() {
        let f = fixture();
        let conn = connect(&f.registry, "n1", &["a"], 1.0).await;
        f.store.insert(NewTask::new("a", json!({}), 1)).await;
        f.store.insert(NewTask::new("a", json!({}), 1)).await;

        f.engine.request_task("n1", conn).await.unwrap().unwrap();
        let err = f.engine.request_task("n1", conn).await.unwrap_err();
        assert!(matches!(err, RegistryError::Busy { .. }));
        assert_eq!(f.store.counts().await.pending, 1);
    }

    #[tokio::test]
    async fn test_unknown_node_rejected() {
        let f = fixture();
        let err = f.engine.request_task("ghost", Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err, RegistryError::NodeNotFound("ghost".to_string()));
    }

    #[tokio::test]
    async fn test_racing_requests_single_winner() {
        let f = fixture();
        let c1 = connect(&f.registry, "n1", &["a"], 1.0).await;
        let c2 = connect(&f.registry, "n2", &["a"], 1.0).await;
        let only = f.store.insert(NewTask::new("a", json!({}), 1)).await;

        let (r1, r2) = tokio::join!(
            f.engine.request_task("n1", c1),
            f.engine.request_task("n2", c2)
        );
        let winners: Vec<Task> = [r1.unwrap(), r2.unwrap()].into_iter().flatten().collect();

        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].id, only.id);
        assert_eq!(f.registry.holders_of(only.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_prefers_highest_score() {
        let f = fixture();
        connect(&f.registry, "slow", &["a"], 1.0).await;
        connect(&f.registry, "fast", &["a"], 8.0).await;
        let task = f.store.insert(NewTask::new("a", json!({}), 1)).await;

        let (node, claimed) = f.engine.dispatch(task.id).await.unwrap();
        assert_eq!(node.node_id, "fast");
        assert_eq!(claimed.assigned_to.as_deref(), Some("fast"));

        // already assigned, nothing more to dispatch
        assert!(f.engine.dispatch(task.id).await.is_none());
    }

    #[tokio::test]
    async fn test_revert_returns_task_to_queue() {
        let f = fixture();
        let conn = connect(&f.registry, "n1", &["a"], 1.0).await;
        let task = f.store.insert(NewTask::new("a", json!({}), 1)).await;

        f.engine.request_task("n1", conn).await.unwrap().unwrap();
        f.engine.revert("n1", task.id).await;

        assert_eq!(f.store.get(task.id).await.unwrap().status, TaskStatus::Pending);
        assert!(f.registry.holders_of(task.id).await.is_empty());

        // the requeued task is free for the next pull
        let again = f.engine.request_task("n1", conn).await.unwrap().unwrap();
        assert_eq!(again.id, task.id);
        assert_eq!(f.registry.holders_of(task.id).await, vec!["n1".to_string()]);
    }

    #[tokio::test]
    async fn test_revert_after_result_keeps_outcome() {
        let f = fixture();
        let conn = connect(&f.registry, "n1", &["a"], 1.0).await;
        let task = f.store.insert(NewTask::new("a", json!({}), 1)).await;
        f.engine.request_task("n1", conn).await.unwrap().unwrap();

        let change = Transition::Complete {
            node_id: "n1".to_string(),
            result: json!({"ok": true}),
        };
        f.store
            .transition(task.id, TaskStatus::Assigned, change)
            .await
            .unwrap();
        f.engine.revert("n1", task.id).await;

        assert_eq!(f.store.get(task.id).await.unwrap().status, TaskStatus::Completed);
        assert!(f.registry.holders_of(task.id).await.is_empty());
        assert_eq!(f.store.queue_len().await, 0);
    }
}
