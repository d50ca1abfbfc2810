//! The `error` module defines the error types used across `msgrelay`.
//!
//! Errors are grouped by the layer that raises them. Validation and capacity
//! errors surface to the submitter immediately; processing errors stay inside
//! the worker pool, which retries them and finally dead-letters the message.

use thiserror::Error;

/// A submitted payload did not match the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("request body must be a JSON object")]
    NotAnObject,

    #[error("missing required field `title`")]
    MissingTitle,

    #[error("field `title` must not be empty")]
    EmptyTitle,

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("malformed request: {0}")]
    Malformed(String),
}

/// Admission into a [`Dispatcher`](crate::dispatcher::Dispatcher) failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnqueueError {
    #[error("queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("dispatcher is closed")]
    Closed,
}

/// Returned by the ingress gateway to whoever submitted a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("service unavailable: queue is full (capacity {capacity})")]
    ServiceUnavailable { capacity: usize },

    #[error("service is shutting down")]
    Closed,
}

impl SubmissionError {
    /// HTTP-equivalent status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            SubmissionError::Validation(_) => 400,
            SubmissionError::ServiceUnavailable { .. } | SubmissionError::Closed => 503,
        }
    }

    /// Whether submitting the same message again later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmissionError::ServiceUnavailable { .. })
    }
}

impl From<EnqueueError> for SubmissionError {
    fn from(err: EnqueueError) -> Self {
        match err {
            EnqueueError::QueueFull { capacity } => SubmissionError::ServiceUnavailable { capacity },
            EnqueueError::Closed => SubmissionError::Closed,
        }
    }
}

/// A processor could not handle a message. Retried by the worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ProcessingError(pub String);

impl ProcessingError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl From<EnqueueError> for ProcessingError {
    fn from(err: EnqueueError) -> Self {
        Self(format!("forwarding failed: {err}"))
    }
}

/// Failures of the sled-backed store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Sled(#[from] sled::Error),

    #[error("failed to encode or decode a stored record: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Failures of the WebSocket client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection closed before a reply was received")]
    ConnectionClosed,
}

/// Top-level error for starting and running the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("websocket server stopped unexpectedly")]
    ServerStopped,

    #[error("submission rejected ({status}): {reason}")]
    Rejected { status: u16, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_status_codes() {
        assert_eq!(SubmissionError::from(ValidationError::EmptyTitle).status_code(), 400);
        assert_eq!(
            SubmissionError::from(EnqueueError::QueueFull { capacity: 2 }).status_code(),
            503
        );
        assert_eq!(SubmissionError::from(EnqueueError::Closed).status_code(), 503);
    }

    #[test]
    fn only_capacity_errors_are_retryable() {
        assert!(SubmissionError::ServiceUnavailable { capacity: 1 }.is_retryable());
        assert!(!SubmissionError::Closed.is_retryable());
        assert!(!SubmissionError::Validation(ValidationError::MissingTitle).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = ValidationError::InvalidField {
            field: "metadata.priority".to_string(),
            reason: "expected a string".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid field `metadata.priority`: expected a string"
        );
        assert_eq!(
            EnqueueError::QueueFull { capacity: 3 }.to_string(),
            "queue is full (capacity 3)"
        );
    }
}
