//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};

/// Default HTTP port (submission API and `/ws`)
pub const DEFAULT_HTTP_PORT: u16 = 8766;

/// Port of the dedicated worker listener when enabled
pub const DEFAULT_WORKER_PORT: u16 = 8765;

/// Upper bound for every `*_secs` setting (30 days)
pub const MAX_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

/// Configuration for the coordinator server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// HTTP bind address
    pub bind_address: SocketAddr,

    /// Optional second listener that serves only the worker endpoint
    pub worker_bind_address: Option<SocketAddr>,

    /// Heartbeat period advertised to workers
    pub heartbeat_interval_secs: u64,

    /// Silence after which a connected node is evicted
    pub liveness_timeout_secs: u64,

    /// How long a disconnected node may come back and keep its task
    pub reconnect_grace_secs: u64,

    /// Longest a task may stay assigned before it is requeued
    pub assignment_timeout_secs: u64,

    pub sweep_interval_secs: u64,

    /// Claim attempts per `request_task` before answering `no_tasks`
    pub max_assignment_attempts: usize,

    /// Per-connection outbound queue size
    pub outbound_queue_capacity: usize,

    /// Maximum registered nodes
    pub max_nodes: usize,

    /// Drop finished tasks this long after completion (kept forever if unset)
    pub terminal_retention_secs: Option<u64>,

    /// Push new submissions to an idle worker instead of waiting for a pull
    pub push_on_submit: bool,

    /// Enable CORS for the API
    pub enable_cors: bool,

    /// Enable request logging
    pub enable_request_logging: bool,

    /// Queue a few demo tasks at startup
    pub seed_sample_tasks: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_HTTP_PORT)),
            worker_bind_address: None,
            heartbeat_interval_secs: 30,
            liveness_timeout_secs: 90,
            reconnect_grace_secs: 30,
            assignment_timeout_secs: 300,
            sweep_interval_secs: 5,
            max_assignment_attempts: 3,
            outbound_queue_capacity: 32,
            max_nodes: 1024,
            terminal_retention_secs: None,
            push_on_submit: false,
            enable_cors: true,
            enable_request_logging: true,
            seed_sample_tasks: false,
        }
    }
}

impl CoordinatorConfig {
    /// Create a new config builder
    pub fn builder() -> CoordinatorConfigBuilder {
        CoordinatorConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("heartbeat_interval_secs", Some(self.heartbeat_interval_secs)),
            ("liveness_timeout_secs", Some(self.liveness_timeout_secs)),
            ("reconnect_grace_secs", Some(self.reconnect_grace_secs)),
            ("assignment_timeout_secs", Some(self.assignment_timeout_secs)),
            ("sweep_interval_secs", Some(self.sweep_interval_secs)),
            ("terminal_retention_secs", self.terminal_retention_secs),
        ];
        for (field, secs) in durations {
            if secs.is_some_and(|secs| secs > MAX_DURATION_SECS) {
                return Err(ConfigError::invalid(
                    field,
                    format!("Must be at most {} seconds", MAX_DURATION_SECS),
                ));
            }
        }

        if self.liveness_timeout_secs <= self.heartbeat_interval_secs {
            return Err(ConfigError::invalid(
                "liveness_timeout_secs",
                "Timeout must be greater than the heartbeat interval",
            ));
        }

        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "heartbeat_interval_secs",
                "Must be at least 1 second",
            ));
        }

        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "sweep_interval_secs",
                "Must be at least 1 second",
            ));
        }

        if self.assignment_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "assignment_timeout_secs",
                "Must be at least 1 second",
            ));
        }

        if self.max_assignment_attempts == 0 {
            return Err(ConfigError::invalid(
                "max_assignment_attempts",
                "Must allow at least 1 attempt",
            ));
        }

        if self.outbound_queue_capacity == 0 {
            return Err(ConfigError::invalid(
                "outbound_queue_capacity",
                "Queue must hold at least 1 message",
            ));
        }

        if self.max_nodes == 0 {
            return Err(ConfigError::invalid("max_nodes", "Must allow at least 1 node"));
        }

        if self.worker_bind_address == Some(self.bind_address) {
            return Err(ConfigError::invalid(
                "worker_bind_address",
                "Must differ from bind_address",
            ));
        }

        Ok(())
    }
}

/// Builder for CoordinatorConfig
#[derive(Debug, Default)]
pub struct CoordinatorConfigBuilder {
    config: CoordinatorConfig,
}

impl CoordinatorConfigBuilder {
    /// Set bind address
    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.config.bind_address = addr;
        self
    }

    /// Set bind address from string
    pub fn bind_address_str(mut self, addr: &str) -> Result<Self, ConfigError> {
        self.config.bind_address = parse_address("bind_address", addr)?;
        Ok(self)
    }

    /// Serve workers on a second listener
    pub fn worker_bind_address(mut self, addr: SocketAddr) -> Self {
        self.config.worker_bind_address = Some(addr);
        self
    }

    pub fn heartbeat_interval_secs(mut self, secs: u64) -> Self {
        self.config.heartbeat_interval_secs = secs;
        self
    }

    pub fn liveness_timeout_secs(mut self, secs: u64) -> Self {
        self.config.liveness_timeout_secs = secs;
        self
    }

    pub fn reconnect_grace_secs(mut self, secs: u64) -> Self {
        self.config.reconnect_grace_secs = secs;
        self
    }

    pub fn assignment_timeout_secs(mut self, secs: u64) -> Self {
        self.config.assignment_timeout_secs = secs;
        self
    }

    pub fn sweep_interval_secs(mut self, secs: u64) -> Self {
        self.config.sweep_interval_secs = secs;
        self
    }

    pub fn max_assignment_attempts(mut self, attempts: usize) -> Self {
        self.config.max_assignment_attempts = attempts;
        self
    }

    pub fn outbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.outbound_queue_capacity = capacity;
        self
    }

    /// Set max nodes
    pub fn max_nodes(mut self, max: usize) -> Self {
        self.config.max_nodes = max;
        self
    }

    pub fn terminal_retention_secs(mut self, secs: u64) -> Self {
        self.config.terminal_retention_secs = Some(secs);
        self
    }

    pub fn push_on_submit(mut self, enable: bool) -> Self {
        self.config.push_on_submit = enable;
        self
    }

    /// Enable/disable CORS
    pub fn enable_cors(mut self, enable: bool) -> Self {
        self.config.enable_cors = enable;
        self
    }

    /// Enable/disable request logging
    pub fn enable_request_logging(mut self, enable: bool) -> Self {
        self.config.enable_request_logging = enable;
        self
    }

    pub fn seed_sample_tasks(mut self, enable: bool) -> Self {
        self.config.seed_sample_tasks = enable;
        self
    }

    /// Build the config
    pub fn build(self) -> Result<CoordinatorConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn parse_address(field: &str, addr: &str) -> Result<SocketAddr, ConfigError> {
    addr.parse()
        .map_err(|_| ConfigError::invalid(field, format!("Invalid address: {}", addr)))
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_address.port(), 8766);
        assert_eq!(config.liveness_timeout_secs, 90);
        assert_eq!(config.max_assignment_attempts, 3);
        assert!(config.worker_bind_address.is_none());
        assert!(!config.push_on_submit);
    }

    #[test]
    fn test_config_builder() {
        let config = CoordinatorConfig::builder()
            .liveness_timeout_secs(120)
            .heartbeat_interval_secs(20)
            .max_nodes(5)
            .push_on_submit(true)
            .build()
            .unwrap();

        assert_eq!(config.liveness_timeout_secs, 120);
        assert_eq!(config.heartbeat_interval_secs, 20);
        assert_eq!(config.max_nodes, 5);
        assert!(config.push_on_submit);
    }

    #[test]
    fn test_config_validation_fails() {
        // Timeout must be greater than interval
        let result = CoordinatorConfig::builder()
            .liveness_timeout_secs(30)
            .heartbeat_interval_secs(60)
            .build();
        assert!(result.is_err());

        let result = CoordinatorConfig::builder().max_assignment_attempts(0).build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "max_assignment_attempts"
        ));
    }

    #[test]
    fn test_oversized_durations_rejected() {
        let result = CoordinatorConfig::builder().liveness_timeout_secs(u64::MAX).build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "liveness_timeout_secs"
        ));

        let result = CoordinatorConfig::builder()
            .assignment_timeout_secs(10_000_000_000_000_000)
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "assignment_timeout_secs"
        ));

        let result = CoordinatorConfig::builder()
            .terminal_retention_secs(MAX_DURATION_SECS + 1)
            .build();
        assert!(result.is_err());

        let config = CoordinatorConfig::builder()
            .liveness_timeout_secs(MAX_DURATION_SECS)
            .assignment_timeout_secs(MAX_DURATION_SECS)
            .build()
            .unwrap();
        assert_eq!(config.liveness_timeout_secs, MAX_DURATION_SECS);
    }

    #[test]
    fn test_config_builder_with_address() {
        let config = CoordinatorConfig::builder()
            .bind_address_str("127.0.0.1:9000")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.bind_address.port(), 9000);

        assert!(CoordinatorConfig::builder().bind_address_str("nope").is_err());
    }

    #[test]
    fn test_worker_listener_must_differ() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let result = CoordinatorConfig::builder()
            .bind_address(addr)
            .worker_bind_address(addr)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: CoordinatorConfig = toml::from_str(
            r#"
            bind_address = "127.0.0.1:7000"
            push_on_submit = true
            "#,
        )
        .unwrap();

        assert_eq!(config.bind_address.port(), 7000);
        assert!(config.push_on_submit);
        assert_eq!(config.heartbeat_interval_secs, 30);
    }
}
