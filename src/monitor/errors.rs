//! Monitor error types
//!
//! A single error enum for the monitoring pipeline. Callers mostly care which
//! family an error belongs to: rejected input, failed collaborator, or bad
//! configuration.

use thiserror::Error;

/// Errors raised by the security monitor
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A required inbound field was absent or blank
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// An inbound field was present but unparseable
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration rejected at startup
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Configuration referenced a rule or pattern id that does not exist
    #[error("Unknown rule id: {0}")]
    UnknownRule(String),

    /// An outbound collaborator (audit sink, notifier, blacklist) failed
    #[error("Collaborator error: {name} - {message}")]
    Collaborator { name: String, message: String },

    /// An outbound collaborator did not answer in time
    #[error("Collaborator '{name}' timed out after {timeout_ms}ms")]
    Timeout { name: String, timeout_ms: u64 },

    /// A bounded in-memory structure cannot accept the entry
    #[error("Capacity full: max size {max_size} reached")]
    CapacityFull { max_size: usize },

    /// The ingestion service is no longer running
    #[error("Monitor channel closed")]
    ChannelClosed,

    /// The ingestion service task panicked or was aborted
    #[error("Monitor service task failed: {0}")]
    ServiceTask(String),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Monitor result type
pub type Result<T> = std::result::Result<T, MonitorError>;

impl MonitorError {
    /// Wrap a collaborator failure
    pub fn collaborator(name: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Collaborator { name: name.into(), message: err.to_string() }
    }

    /// Malformed inbound data, rejected before any state is touched
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::MissingField(_) | Self::InvalidInput(_))
    }

    /// Errors the ingesting path can log and move past
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Collaborator { .. }
                | Self::Timeout { .. }
                | Self::CapacityFull { .. }
                | Self::MissingField(_)
                | Self::InvalidInput(_)
        )
    }

    /// Errors that mean the monitor cannot run as configured
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::UnknownRule(_)
                | Self::ChannelClosed
                | Self::ServiceTask(_)
                | Self::Io(_)
        )
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for MonitorError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for MonitorError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<prometheus::Error> for MonitorError {
    fn from(err: prometheus::Error) -> Self {
        Self::Metrics(err.to_string())
    }
}
