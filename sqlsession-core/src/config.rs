//! Backend configuration

use crate::error::{ErrorContext, SessionError, SessionResult};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding the connection string
pub const ENV_CONNECTION_STRING: &str = "SQLSESSION_CONNECTION_STRING";
/// Environment variable overriding the session lifetime
pub const ENV_EXPIRE_SECS: &str = "SQLSESSION_EXPIRE_SECS";
/// Environment variable overriding the provider name
pub const ENV_PROVIDER: &str = "SQLSESSION_PROVIDER";

/// Session backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Registered provider name
    pub provider: String,
    /// Opaque connection descriptor handed to the driver unmodified
    pub connection_string: String,
    /// Seconds after the last write before a session is swept
    pub expire_secs: i64,
    /// Maximum lifetime of a pooled connection
    pub conn_max_lifetime_secs: u64,
    /// Pool size
    pub max_connections: u32,
    /// Create the session table on startup if missing
    pub create_table: bool,
    /// Interval of the background GC sweep
    pub gc_interval_secs: u64,
    pub logging: LoggingConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            provider: "sqlite".to_string(),
            connection_string: "sqlite://sessions.db?mode=rwc".to_string(),
            expire_secs: 86400,
            conn_max_lifetime_secs: 14400,
            max_connections: 10,
            create_table: true,
            gc_interval_secs: 3600,
            logging: LoggingConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> SessionResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SessionError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> SessionResult<Self> {
        toml::from_str(content).map_err(|e| SessionError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> SessionResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| SessionError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path, content).map_err(|e| SessionError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Override fields from `SQLSESSION_*` environment variables
    pub fn apply_env_overrides(&mut self) -> SessionResult<()> {
        if let Ok(conn) = std::env::var(ENV_CONNECTION_STRING) {
            self.connection_string = conn;
        }

        if let Ok(provider) = std::env::var(ENV_PROVIDER) {
            self.provider = provider;
        }

        if let Ok(raw) = std::env::var(ENV_EXPIRE_SECS) {
            self.expire_secs = raw.trim().parse().map_err(|e| SessionError::Config {
                message: format!("{} is not a valid integer: {}", ENV_EXPIRE_SECS, raw),
                source: Some(Box::new(e)),
                context: ErrorContext::new("config").with_operation("apply_env_overrides"),
            })?;
        }

        Ok(())
    }

    /// Interval between background GC sweeps
    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> SessionResult<()> {
        if self.provider.trim().is_empty() {
            return Err(invalid("provider must not be empty", "Set provider = \"sqlite\""));
        }

        if self.connection_string.trim().is_empty() {
            return Err(invalid(
                "connection_string must not be empty",
                "Set connection_string to a database URL",
            ));
        }

        if self.expire_secs <= 0 {
            return Err(invalid(
                "expire_secs must be greater than 0",
                "Set expire_secs to a positive value",
            ));
        }

        if self.max_connections == 0 {
            return Err(invalid(
                "max_connections must be greater than 0",
                "Set max_connections to a positive value",
            ));
        }

        if self.gc_interval_secs == 0 {
            return Err(invalid(
                "gc_interval_secs must be greater than 0",
                "Set gc_interval_secs to a positive value",
            ));
        }

        Ok(())
    }
}

fn invalid(message: &str, suggestion: &str) -> SessionError {
    SessionError::Config {
        message: message.to_string(),
        source: None,
        context: ErrorContext::new("config")
            .with_operation("validate")
            .with_suggestion(suggestion),
    }
}
