use crate::utils::error::{Result, SockPoolError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration for the socket pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum idle sockets kept per (address, tls) key
    #[serde(default = "default_max_connections_per_key")]
    pub max_connections_per_key: usize,
    /// How long an idle socket may stay pooled before the reaper closes it
    /// (seconds, 0 disables reaping)
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String, // "json" or "pretty"
}

// Default values
fn default_max_connections_per_key() -> usize {
    10
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections_per_key: default_max_connections_per_key(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl PoolConfig {
    /// Idle timeout as a duration, `None` when reaping is disabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        match self.idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SockPoolError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| SockPoolError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.pool.max_connections_per_key == 0 {
            return Err(SockPoolError::Config(
                "pool.max_connections_per_key must be greater than 0".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(SockPoolError::Config(format!(
                "Invalid log format: {}. Must be 'pretty' or 'json'",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Create example configuration file
    pub fn create_example<P: AsRef<Path>>(path: P) -> Result<()> {
        let example = r#"[pool]
# Idle sockets kept per (address, tls) pair; extra released sockets are closed
max_connections_per_key = 10
# Seconds an idle socket may stay pooled before it is closed (0 disables reaping)
idle_timeout_secs = 300

[logging]
level = "info"  # Options: "trace", "debug", "info", "warn", "error"
format = "pretty"  # Options: "pretty", "json"
"#;

        std::fs::write(path.as_ref(), example).map_err(|e| {
            SockPoolError::Config(format!("Failed to write example config: {}", e))
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pool.max_connections_per_key, 10);
        assert_eq!(config.pool.idle_timeout_secs, 300);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_idle_timeout_zero_disables_reaping() {
        let pool = PoolConfig {
            idle_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(pool.idle_timeout(), None);
        assert_eq!(
            PoolConfig::default().idle_timeout(),
            Some(Duration::from_secs(300))
        );
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.pool.max_connections_per_key = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());

        config.logging.format = "json".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[pool]\nidle_timeout_secs = 30\n").unwrap();
        assert_eq!(config.pool.idle_timeout_secs, 30);
        assert_eq!(config.pool.max_connections_per_key, 10);
        assert_eq!(config.logging.format, "pretty");
    }
}
