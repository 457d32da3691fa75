//! Coordinator for a pool of edge compute nodes
//!
//! Workers hold a WebSocket open, register, and pull tasks; clients submit
//! tasks and poll for results over HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │               Coordinator Server              │
//! │                                               │
//! │  HTTP API ──insert──▶ Task Store + Queue       │
//! │                          ▲        │           │
//! │                 requeue  │        │ claim     │
//! │                          │        ▼           │
//! │  Liveness Monitor    Assignment Engine        │
//! │          │                ▲                   │
//! │          ▼                │ request_task      │
//! │     Node Registry ◀── Worker Sessions (ws)    │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use edgepool::coordinator::{CoordinatorConfig, CoordinatorServer};
//!
//! let (tx, rx) = tokio::sync::watch::channel(false);
//! let server = CoordinatorServer::new(CoordinatorConfig::default())?;
//! server.start_with_shutdown(rx).await?;
//! ```

pub mod api;
pub mod assignment;
pub mod config;
pub mod health;
pub mod liveness;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod store;
pub mod transport;

// Re-export main types
pub use assignment::AssignmentEngine;
pub use config::CoordinatorConfig;
pub use liveness::{LivenessMonitor, LivenessPolicy, SweepReport};
pub use protocol::{CoordinatorMessage, WorkerMessage};
pub use registry::{NodeRegistry, RegisterRequest, RegistryError};
pub use server::{AppState, CoordinatorServer, ServerError};
pub use session::SessionManager;
pub use store::{StoreError, TaskStore, Transition};
