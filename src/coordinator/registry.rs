//! Node registry for tracking connected workers
//!
//! This module is the single source of truth for worker presence and
//! capability. Every mutation takes the write lock once and touches a single
//! node record; listings return snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Node, NodeStatus, TaskId};

// ============================================================================
// Registration
// ============================================================================

/// Data a worker declares when it registers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub node_id: String,
    #[serde(default)]
    pub device_info: Value,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub performance_score: Option<f64>,
}

/// Outcome of a registration
#[derive(Debug, Clone)]
pub struct Registration {
    /// Snapshot of the entry after the upsert
    pub node: Node,

    /// Task the node still holds from before a reconnect
    pub resumed_task: Option<TaskId>,

    /// Whether a new logical entry was created
    pub fresh: bool,
}

// ============================================================================
// Errors
// ============================================================================

/// Registry errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("node {0} is owned by a newer connection")]
    Superseded(String),

    #[error("node {0} is not connected")]
    NotConnected(String),

    #[error("node {node_id} already holds task {task_id}")]
    Busy { node_id: String, task_id: TaskId },

    #[error("node {node_id} cannot run tasks of kind '{kind}'")]
    Incapable { node_id: String, kind: String },

    #[error("registry at capacity: {current}/{max}")]
    CapacityExceeded { current: usize, max: usize },
}

// ============================================================================
// Node Registry
// ============================================================================

/// Registry of every known worker node
pub struct NodeRegistry {
    nodes: RwLock<HashMap<String, Node>>,

    /// Max nodes allowed at once
    max_nodes: usize,
}

impl NodeRegistry {
    /// Create a new registry
    pub fn new(max_nodes: usize) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            max_nodes,
        }
    }

    /// Create or refresh the entry for a registering worker
    ///
    /// An existing entry (a reconnect within the grace window, or a second
    /// connection taking over) keeps its `current_task` and counters; the
    /// new connection becomes its owner.
    pub async fn upsert(
        &self,
        request: RegisterRequest,
        connection_id: Uuid,
    ) -> Result<Registration, RegistryError> {
        let mut nodes = self.nodes.write().await;
        let now = Utc::now();

        if let Some(node) = nodes.get_mut(&request.node_id) {
            node.device_info = request.device_info;
            node.capabilities = request.capabilities;
            if let Some(score) = request.performance_score {
                node.performance_score = score;
            }
            node.status = NodeStatus::Connected;
            node.connection_id = connection_id;
            node.last_seen = now;
            node.disconnected_at = None;

            return Ok(Registration {
                node: node.clone(),
                resumed_task: node.current_task,
                fresh: false,
            });
        }

        if nodes.len() >= self.max_nodes {
            return Err(RegistryError::CapacityExceeded {
                current: nodes.len(),
                max: self.max_nodes,
            });
        }

        let mut node = Node::new(
            request.node_id.clone(),
            request.device_info,
            request.capabilities,
            connection_id,
        );
        if let Some(score) = request.performance_score {
            node.performance_score = score;
        }
        nodes.insert(request.node_id, node.clone());

        Ok(Registration {
            node,
            resumed_task: None,
            fresh: true,
        })
    }

    /// Record inbound activity from the owning connection
    pub async fn touch(&self, node_id: &str, connection_id: Uuid) -> Result<(), RegistryError> {
        let mut nodes = self.nodes.write().await;
        let node = owned_node(&mut nodes, node_id, connection_id)?;
        node.last_seen = Utc::now();
        Ok(())
    }

    /// Replace the capability set of a connected node
    pub async fn update_capabilities(
        &self,
        node_id: &str,
        connection_id: Uuid,
        capabilities: BTreeSet<String>,
    ) -> Result<(), RegistryError> {
        let mut nodes = self.nodes.write().await;
        let node = owned_node(&mut nodes, node_id, connection_id)?;
        node.capabilities = capabilities;
        node.last_seen = Utc::now();
        Ok(())
    }

    /// Update the self-reported performance score
    pub async fn update_performance(
        &self,
        node_id: &str,
        connection_id: Uuid,
        score: f64,
    ) -> Result<(), RegistryError> {
        let mut nodes = self.nodes.write().await;
        let node = owned_node(&mut nodes, node_id, connection_id)?;
        node.performance_score = score;
        node.last_seen = Utc::now();
        Ok(())
    }

    /// Bind a task to an idle, capable, connected node
    pub async fn assign(
        &self,
        node_id: &str,
        connection_id: Uuid,
        task_id: TaskId,
        kind: &str,
    ) -> Result<(), RegistryError> {
        let mut nodes = self.nodes.write().await;
        let node = owned_node(&mut nodes, node_id, connection_id)?;

        if !node.is_connected() {
            return Err(RegistryError::NotConnected(node_id.to_string()));
        }
        if let Some(current) = node.current_task {
            return Err(RegistryError::Busy {
                node_id: node_id.to_string(),
                task_id: current,
            });
        }
        if !node.can_run(kind) {
            return Err(RegistryError::Incapable {
                node_id: node_id.to_string(),
                kind: kind.to_string(),
            });
        }

        node.current_task = Some(task_id);
        Ok(())
    }

    /// Count a result the store accepted and clear the task if still held
    ///
    /// A sweep may already have released the task, in which case only the
    /// counter moves. Returns whether the node was still holding it.
    pub async fn complete_task(&self, node_id: &str, task_id: TaskId) -> bool {
        let mut nodes = self.nodes.write().await;
        let Some(node) = nodes.get_mut(node_id) else {
            return false;
        };
        node.tasks_completed += 1;
        if node.current_task == Some(task_id) {
            node.current_task = None;
            true
        } else {
            false
        }
    }

    /// Clear a task that went back to the queue
    pub async fn release_task(&self, node_id: &str, task_id: TaskId) -> bool {
        let mut nodes = self.nodes.write().await;
        match nodes.get_mut(node_id) {
            Some(node) if node.current_task == Some(task_id) => {
                node.current_task = None;
                true
            }
            _ => false,
        }
    }

    /// Mark a node disconnected and report the task it was holding
    ///
    /// Only the connection that currently owns the entry may disconnect it,
    /// so a late close from a replaced connection leaves the new one alone.
    /// The task stays on the node until the liveness monitor reclaims it,
    /// which lets a quick reconnect resume.
    pub async fn mark_disconnected(
        &self,
        node_id: &str,
        connection_id: Uuid,
    ) -> Result<Option<TaskId>, RegistryError> {
        let mut nodes = self.nodes.write().await;
        let node = owned_node(&mut nodes, node_id, connection_id)?;
        node.status = NodeStatus::Disconnected;
        node.disconnected_at = Some(Utc::now());
        Ok(node.current_task)
    }

    /// Remove nodes judged stale and return them
    ///
    /// Connected nodes are stale when silent since before `silent_cutoff`;
    /// disconnected nodes once they dropped before `disconnect_cutoff`.
    pub async fn evict_stale(
        &self,
        silent_cutoff: DateTime<Utc>,
        disconnect_cutoff: DateTime<Utc>,
    ) -> Vec<Node> {
        let mut nodes = self.nodes.write().await;

        let stale: Vec<String> = nodes
            .values()
            .filter(|node| match node.status {
                NodeStatus::Connected => node.last_seen < silent_cutoff,
                NodeStatus::Disconnected => {
                    node.disconnected_at.unwrap_or(node.last_seen) < disconnect_cutoff
                }
            })
            .map(|node| node.node_id.clone())
            .collect();

        stale.iter().filter_map(|id| nodes.remove(id)).collect()
    }

    /// Get a node snapshot
    pub async fn get(&self, node_id: &str) -> Option<Node> {
        self.nodes.read().await.get(node_id).cloned()
    }

    /// All nodes, ordered by id
    pub async fn list(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.nodes.read().await.values().cloned().collect();
        nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        nodes
    }

    /// Connected idle nodes able to run `kind`, best performer first
    pub async fn list_idle_capable(&self, kind: &str) -> Vec<Node> {
        let mut nodes: Vec<Node> = self
            .nodes
            .read()
            .await
            .values()
            .filter(|node| node.is_idle() && node.can_run(kind))
            .cloned()
            .collect();
        nodes.sort_by(|a, b| {
            b.performance_score
                .total_cmp(&a.performance_score)
                .then_with(|| a.node_id.cmp(&b.node_id))
        });
        nodes
    }

    /// Ids of nodes currently holding `task_id`
    pub async fn holders_of(&self, task_id: TaskId) -> Vec<String> {
        self.nodes
            .read()
            .await
            .values()
            .filter(|node| node.current_task == Some(task_id))
            .map(|node| node.node_id.clone())
            .collect()
    }

    /// Get registry statistics
    pub async fn stats(&self) -> RegistryStats {
        let nodes = self.nodes.read().await;

        let mut stats = RegistryStats {
            total_nodes: nodes.len(),
            ..Default::default()
        };

        for node in nodes.values() {
            match node.status {
                NodeStatus::Connected => stats.connected += 1,
                NodeStatus::Disconnected => stats.disconnected += 1,
            }
            if node.current_task.is_some() {
                stats.busy += 1;
            } else if node.is_connected() {
                stats.idle += 1;
            }
            stats.tasks_completed += node.tasks_completed;
        }

        stats
    }
}

/// Look up a node and check that `connection_id` still owns it
fn owned_node<'a>(
    nodes: &'a mut HashMap<String, Node>,
    node_id: &str,
    connection_id: Uuid,
) -> Result<&'a mut Node, RegistryError> {
    let node = nodes
        .get_mut(node_id)
        .ok_or_else(|| RegistryError::NodeNotFound(node_id.to_string()))?;
    if node.connection_id != connection_id {
        return Err(RegistryError::Superseded(node_id.to_string()));
    }
    Ok(node)
}

/// Registry statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_nodes: usize,
    pub connected: usize,
    pub disconnected: usize,
    pub busy: usize,
    pub idle: usize,
    pub tasks_completed: u64,
}

impl RegistryStats {
    /// Share of known nodes that are connected, in percent
    pub fn availability(&self) -> f64 {
        if self.total_nodes == 0 {
            0.0
        } else {
            (self.connected as f64 / self.total_nodes as f64) * 100.0
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
