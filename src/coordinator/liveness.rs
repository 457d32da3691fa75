//! Liveness monitoring and task recovery
//!
//! The monitor is the only place that puts assigned work back in the queue
//! after a worker goes quiet. Sessions hand it their held task on disconnect;
//! it waits out the reconnect grace window before reclaiming.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::metrics;
use crate::models::{TaskId, TaskStatus};

use super::config::{CoordinatorConfig, MAX_DURATION_SECS};
use super::registry::NodeRegistry;
use super::store::{TaskStore, Transition};

/// Why a task went back to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueReason {
    /// Holder evicted after silence or an expired grace window
    NodeLost,
    /// Holder sat on the task past the assignment timeout
    AssignmentTimeout,
}

impl RequeueReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NodeLost => "node_lost",
            Self::AssignmentTimeout => "assignment_timeout",
        }
    }
}

/// Thresholds the monitor applies on each sweep
#[derive(Debug, Clone)]
pub struct LivenessPolicy {
    pub liveness_timeout: Duration,
    pub reconnect_grace: Duration,
    pub assignment_timeout: Duration,
    pub terminal_retention: Option<Duration>,
    pub sweep_interval: std::time::Duration,
}

impl LivenessPolicy {
    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self {
            liveness_timeout: bounded_seconds(config.liveness_timeout_secs),
            reconnect_grace: bounded_seconds(config.reconnect_grace_secs),
            assignment_timeout: bounded_seconds(config.assignment_timeout_secs),
            terminal_retention: config.terminal_retention_secs.map(bounded_seconds),
            sweep_interval: std::time::Duration::from_secs(
                config.sweep_interval_secs.min(MAX_DURATION_SECS),
            ),
        }
    }
}

/// Seconds as a signed duration, clamped to `MAX_DURATION_SECS`
fn bounded_seconds(secs: u64) -> Duration {
    let secs = i64::try_from(secs.min(MAX_DURATION_SECS)).unwrap_or(i64::MAX);
    Duration::try_seconds(secs).unwrap_or_else(|| Duration::days(30))
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self::from_config(&CoordinatorConfig::default())
    }
}

/// What a single sweep changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub evicted_nodes: Vec<String>,
    pub requeued: Vec<TaskId>,
    pub timed_out: Vec<TaskId>,
    pub retired_tasks: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.evicted_nodes.is_empty()
            && self.requeued.is_empty()
            && self.timed_out.is_empty()
            && self.retired_tasks == 0
    }
}

/// Periodic sweeper over the registry and store
pub struct LivenessMonitor {
    store: Arc<TaskStore>,
    registry: Arc<NodeRegistry>,
    policy: LivenessPolicy,
}

impl LivenessMonitor {
    pub fn new(store: Arc<TaskStore>, registry: Arc<NodeRegistry>, policy: LivenessPolicy) -> Self {
        Self {
            store,
            registry,
            policy,
        }
    }

    pub fn policy(&self) -> &LivenessPolicy {
        &self.policy
    }

    /// Accept a task held by a node whose connection just closed
    ///
    /// Nothing is requeued here. If the node does not reconnect within the
    /// grace window the next sweep evicts it and reclaims the task.
    pub fn handoff(&self, node_id: &str, task_id: Option<TaskId>) {
        match task_id {
            Some(task_id) => tracing::info!(
                node_id = %node_id,
                task_id = %task_id,
                grace_secs = self.policy.reconnect_grace.num_seconds(),
                "Node disconnected holding a task, awaiting reconnect"
            ),
            None => tracing::info!(node_id = %node_id, "Node disconnected"),
        }
    }

    /// Run one sweep as of `now`
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        // Stale nodes
        let evicted = self
            .registry
            .evict_stale(
                now - self.policy.liveness_timeout,
                now - self.policy.reconnect_grace,
            )
            .await;

        for node in evicted {
            tracing::warn!(
                node_id = %node.node_id,
                status = ?node.status,
                last_seen = %node.last_seen,
                "Evicting stale node"
            );
            if let Some(task_id) = node.current_task {
                if self
                    .requeue(task_id, &node.node_id, RequeueReason::NodeLost)
                    .await
                {
                    report.requeued.push(task_id);
                }
            }
            report.evicted_nodes.push(node.node_id);
        }

        // Overdue assignments
        let overdue = self
            .store
            .assigned_before(now - self.policy.assignment_timeout)
            .await;

        for (task_id, node_id) in overdue {
            if self
                .requeue(task_id, &node_id, RequeueReason::AssignmentTimeout)
                .await
            {
                report.timed_out.push(task_id);
            }
        }

        // Retention
        if let Some(retention) = self.policy.terminal_retention {
            report.retired_tasks = self.store.evict_terminal_before(now - retention).await;
        }

        self.refresh_gauges().await;

        if !report.is_empty() {
            tracing::info!(
                evicted = report.evicted_nodes.len(),
                requeued = report.requeued.len(),
                timed_out = report.timed_out.len(),
                retired = report.retired_tasks,
                "Liveness sweep"
            );
        }

        report
    }

    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    /// Start the sweep loop; it exits when `shutdown` flips or closes
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.policy.sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::info!("Liveness monitor shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Move an assigned task back to pending, guarded by its holder
    ///
    /// The holder lets go before the task becomes claimable again.
    async fn requeue(&self, task_id: TaskId, node_id: &str, reason: RequeueReason) -> bool {
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
                metrics::record_requeue(reason.as_str());
                tracing::info!(
                    task_id = %task_id,
                    node_id = %node_id,
                    reason = reason.as_str(),
                    "Task requeued"
                );
                true
            }
            Err(e) => {
                // completed or reclaimed by someone else first
                tracing::debug!(
                    task_id = %task_id,
                    node_id = %node_id,
                    error = %e,
                    "Requeue skipped"
                );
                false
            }
        }
    }

    async fn refresh_gauges(&self) {
        let stats = self.registry.stats().await;
        metrics::set_node_counts(stats.connected, stats.total_nodes);
        metrics::set_queue_depth(self.store.queue_len().await);
    }
}

// ============================================================================
// Tests
// ============================================================================
