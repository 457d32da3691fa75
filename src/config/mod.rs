//! Configuration management for edgepool
//!
//! Settings come from an optional TOML file, then `EDGEPOOL_*` environment
//! variables, then command-line flags (applied by the binary).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::coordinator::CoordinatorConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Coordinator configuration
    pub coordinator: CoordinatorConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Config {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// File (if any) plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `EDGEPOOL_*` environment variables on top of the current values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        let c = &mut self.coordinator;

        if let Some(addr) = env_parse::<SocketAddr>("EDGEPOOL_BIND_ADDRESS")? {
            c.bind_address = addr;
        }
        if let Some(addr) = env_parse::<SocketAddr>("EDGEPOOL_WORKER_BIND_ADDRESS")? {
            c.worker_bind_address = Some(addr);
        }
        if let Some(secs) = env_parse("EDGEPOOL_HEARTBEAT_INTERVAL_SECS")? {
            c.heartbeat_interval_secs = secs;
        }
        if let Some(secs) = env_parse("EDGEPOOL_LIVENESS_TIMEOUT_SECS")? {
            c.liveness_timeout_secs = secs;
        }
        if let Some(secs) = env_parse("EDGEPOOL_RECONNECT_GRACE_SECS")? {
            c.reconnect_grace_secs = secs;
        }
        if let Some(secs) = env_parse("EDGEPOOL_ASSIGNMENT_TIMEOUT_SECS")? {
            c.assignment_timeout_secs = secs;
        }
        if let Some(secs) = env_parse("EDGEPOOL_SWEEP_INTERVAL_SECS")? {
            c.sweep_interval_secs = secs;
        }
        if let Some(attempts) = env_parse("EDGEPOOL_MAX_ASSIGNMENT_ATTEMPTS")? {
            c.max_assignment_attempts = attempts;
        }
        if let Some(max) = env_parse("EDGEPOOL_MAX_NODES")? {
            c.max_nodes = max;
        }
        if let Some(secs) = env_parse("EDGEPOOL_TERMINAL_RETENTION_SECS")? {
            c.terminal_retention_secs = Some(secs);
        }
        if let Some(push) = env_parse("EDGEPOOL_PUSH_ON_SUBMIT")? {
            c.push_on_submit = push;
        }
        if let Some(seed) = env_parse("EDGEPOOL_SEED_SAMPLE_TASKS")? {
            c.seed_sample_tasks = seed;
        }

        if let Ok(level) = std::env::var("EDGEPOOL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("EDGEPOOL_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.coordinator
            .validate()
            .context("Invalid [coordinator] section")?;

        match self.logging.format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("logging.format must be 'text' or 'json', got '{other}'"),
        }

        Ok(())
    }
}

/// Parse an environment variable when it is set
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value for {key} ('{raw}'): {e}")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[coordinator]
bind_address = "127.0.0.1:9000"
liveness_timeout_secs = 45
push_on_submit = true

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.coordinator.bind_address.port(), 9000);
        assert_eq!(config.coordinator.liveness_timeout_secs, 45);
        assert!(config.coordinator.push_on_submit);
        assert_eq!(config.coordinator.heartbeat_interval_secs, 30);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file(Path::new("/nonexistent/edgepool.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("EDGEPOOL_LIVENESS_TIMEOUT_SECS", "120");
        std::env::set_var("EDGEPOOL_PUSH_ON_SUBMIT", "true");
        std::env::set_var("EDGEPOOL_LOG_FORMAT", "json");

        let config = Config::from_env().unwrap();

        std::env::remove_var("EDGEPOOL_LIVENESS_TIMEOUT_SECS");
        std::env::remove_var("EDGEPOOL_PUSH_ON_SUBMIT");
        std::env::remove_var("EDGEPOOL_LOG_FORMAT");

        assert_eq!(config.coordinator.liveness_timeout_secs, 120);
        assert!(config.coordinator.push_on_submit);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    #[serial]
    fn test_env_override_rejects_garbage() {
        std::env::set_var("EDGEPOOL_MAX_NODES", "many");
        let result = Config::from_env();
        std::env::remove_var("EDGEPOOL_MAX_NODES");

        let err = result.unwrap_err();
        assert!(err.to_string().contains("EDGEPOOL_MAX_NODES"));
    }
}
