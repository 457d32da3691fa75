//! edgepool - coordinator for a pool of edge compute nodes
//!
//! Workers connect over WebSocket, register their capabilities, and pull
//! tasks; clients submit tasks and read results over HTTP. Work held by a
//! node that goes silent is requeued for another node.
//!
//! # Architecture
//!
//! - [`coordinator`] - Task store, node registry, assignment, liveness, sessions
//!   and the HTTP server
//! - [`config`] - File and environment configuration
//! - [`models`] - Task and node records
//! - [`metrics`] - Prometheus metrics
//! - [`error`] - Unified error type
//!
//! # Example
//!
//! ```no_run
//! use edgepool::config::Config;
//! use edgepool::coordinator::CoordinatorServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let server = CoordinatorServer::new(config.coordinator)?;
//!     let (_tx, rx) = tokio::sync::watch::channel(false);
//!     server.start_with_shutdown(rx).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod models;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::coordinator::{CoordinatorConfig, CoordinatorServer};
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::models::{NewTask, Node, NodeStatus, Task, TaskId, TaskStatus};
}

// Direct re-exports for convenience
pub use models::{NewTask, Node, NodeStatus, Task, TaskId, TaskStatus};
