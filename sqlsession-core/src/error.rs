//! Unified error handling
//!
//! Structured session errors with context, recovery suggestions and error chaining

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type SessionResult<T> = Result<T, SessionError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: std::collections::HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: std::collections::HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Direction of a failed codec operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodecDirection {
    Encode,
    Decode,
}

impl std::fmt::Display for CodecDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecDirection::Encode => write!(f, "encode"),
            CodecDirection::Decode => write!(f, "decode"),
        }
    }
}

/// Main error type for the session backend
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
        context: ErrorContext,
    },

    #[error("Query error: {message}")]
    Query {
        message: String,
        #[source]
        source: Option<BoxError>,
        context: ErrorContext,
    },

    #[error("Session '{id}' already exists")]
    AlreadyExists { id: String, context: ErrorContext },

    #[error("Failed to {direction} session data: {message}")]
    Codec {
        direction: CodecDirection,
        message: String,
        #[source]
        source: Option<BoxError>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxError>,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            SessionError::Connection { context, .. } => Some(context),
            SessionError::Query { context, .. } => Some(context),
            SessionError::AlreadyExists { context, .. } => Some(context),
            SessionError::Codec { context, .. } => Some(context),
            SessionError::Config { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Query failures are treated as transient; everything else is not.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SessionError::Query { .. })
    }

    /// Create a query error wrapping a driver error
    pub fn query<E>(operation: &str, session_id: Option<&str>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut context = ErrorContext::new("provider").with_operation(operation);
        if let Some(id) = session_id {
            context = context.with_metadata("session_id", id);
        }
        SessionError::Query {
            message: format!("{} failed: {}", operation, source),
            source: Some(Box::new(source)),
            context,
        }
    }

    /// Create a connection error wrapping a driver error
    pub fn connection<E>(message: &str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SessionError::Connection {
            message: format!("{}: {}", message, source),
            source: Some(Box::new(source)),
            context: ErrorContext::new("provider")
                .with_operation("init")
                .with_suggestion("Check the connection string")
                .with_suggestion("Verify the database is reachable"),
        }
    }

    /// Create a codec error
    pub fn codec<E>(direction: CodecDirection, codec: &str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SessionError::Codec {
            direction,
            message: source.to_string(),
            source: Some(Box::new(source)),
            context: ErrorContext::new("codec").with_metadata("codec", codec),
        }
    }

    /// Create an "already exists" conflict for a session identifier
    pub fn already_exists(id: &str) -> Self {
        SessionError::AlreadyExists {
            id: id.to_string(),
            context: ErrorContext::new("provider")
                .with_operation("regenerate")
                .with_suggestion("Generate a different session identifier"),
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        let error_id = self.context().map(|c| &c.error_id);
        match self {
            SessionError::Query { .. } => {
                warn!(
                    error_id = ?error_id,
                    error = %self,
                    "Query error (may be recoverable)"
                );
            }
            SessionError::Config { .. } | SessionError::Connection { .. } => {
                error!(
                    error_id = ?error_id,
                    error = %self,
                    "Configuration or connection error"
                );
            }
            _ => {
                error!(
                    error_id = ?error_id,
                    error = %self,
                    "Error occurred"
                );
            }
        }
    }
}

/// Convenience macro for creating configuration errors with context
#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::SessionError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file")
                .with_suggestion("Run 'sqlsession config --init' to create default config"),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::SessionError::Config {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file"),
        }
    };
}
