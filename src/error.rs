//! Unified error handling for the edgepool crate
//!
//! Each component keeps its own error type; [`Error`] wraps them so callers
//! crossing module boundaries can use a single `Result`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use edgepool::error::{Error, ErrorCategory};
//!
//! fn report(err: &Error) {
//!     match err.category() {
//!         ErrorCategory::Conflict => tracing::debug!(error = %err, "Lost a race"),
//!         _ => tracing::warn!(error = %err, "Request failed"),
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::coordinator::config::ConfigError;
pub use crate::coordinator::protocol::ProtocolError;
pub use crate::coordinator::registry::RegistryError;
pub use crate::coordinator::session::SessionError;
pub use crate::coordinator::store::StoreError;
pub use crate::coordinator::transport::TransportError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bad or unexpected worker traffic; the connection is dropped, task state untouched
    Protocol,
    /// A compare-and-swap lost to a concurrent change
    Conflict,
    /// Unknown task or node
    NotFound,
    /// Liveness or assignment deadline expired
    Timeout,
    /// Invalid configuration
    Config,
    /// Sockets and files
    Io,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::Config => "config",
            Self::Io => "io",
        }
    }
}

/// Unified error type for the edgepool crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn timeout(what: impl Into<String>) -> Self {
        Self::Timeout(what.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Store(StoreError::NotFound(_)) => ErrorCategory::NotFound,
            Self::Store(_) => ErrorCategory::Conflict,
            Self::Registry(RegistryError::NodeNotFound(_)) => ErrorCategory::NotFound,
            Self::Registry(_) => ErrorCategory::Conflict,
            Self::Session(SessionError::Registry(e)) => Error::Registry(e.clone()).category(),
            Self::Protocol(_) | Self::Session(_) | Self::Transport(_) | Self::Json(_) => {
                ErrorCategory::Protocol
            }
            Self::Config(_) => ErrorCategory::Config,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Io(_) => ErrorCategory::Io,
        }
    }

    /// Whether retrying the same operation later can succeed
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::Conflict | ErrorCategory::Timeout | ErrorCategory::Io => true,
            ErrorCategory::Protocol | ErrorCategory::NotFound | ErrorCategory::Config => false,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
