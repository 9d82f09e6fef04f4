//! Error types for intent resolution, transport and agent operations.

use serde_json::Value;
use thiserror::Error;

/// Classified failure of a single resolution pass.
///
/// None of these leave a partial substitution behind: the inbound tree is
/// only cloned and spliced once a resolver has actually been dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No node along the search path qualifies as an intent
    #[error("Message does not contain an intent")]
    NotAnIntent,

    /// The governing intent names a resolver that is not registered
    #[error("No resolver registered for intent '{0}'")]
    NoResolver(String),

    /// The message already carries an error report
    #[error("Message carries an error report: {0}")]
    ErrorMessage(String),
}

/// Business-level failure declared by a resolver.
///
/// Recoverable: the engine renders it into the message instead of failing
/// the resolution.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Error in intent resolution: {message}")]
pub struct DomainError {
    /// Human-readable message, mirrored under `error` in the output
    pub message: String,
    /// Optional structured details for the resolver's error object
    pub details: Option<Value>,
}

impl DomainError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Bus transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    #[error("Transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Consume failed: {0}")]
    ConsumeFailed(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Acknowledgment failed: {0}")]
    AckFailed(String),
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Configuration source error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Undecodable message: {0}")]
    Decode(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Outbound queue is full ({0} messages pending)")]
    QueueFull(usize),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
