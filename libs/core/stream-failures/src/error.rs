//! Error types for storing and retrying failed messages
//!
//! Errors are split by how a caller should react:
//! - **StreamError**: I/O, serialization and handler failures
//! - **ResolveError**: a receiver identity could not be turned into a receiver
//! - **RetryError**: the outcome of a single retry attempt

use crate::record::FailedMessage;
use thiserror::Error;

/// Stream and storage errors
#[derive(Error, Debug)]
pub enum StreamError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Receiver failed to process a message
    #[error("{0}")]
    Processing(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StreamError {
    /// Create a processing error, the error receivers return from `handle`
    pub fn processing(message: impl Into<String>) -> Self {
        StreamError::Processing(message.into())
    }

    /// Whether the error came from the storage or stream backend
    pub fn is_io(&self) -> bool {
        matches!(self, StreamError::Redis(_))
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Serialization(err.to_string())
    }
}

/// Receiver resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Nothing is registered under the identity
    #[error("Receiver `{0}` does not exist")]
    UnknownReceiver(String),

    /// Something is registered under the identity, but it cannot handle messages
    #[error("Receiver `{0}` is not a message receiver")]
    InvalidReceiver(String),
}

/// Why a retry did not go through
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    #[error("Receiver `{0}` does not exist")]
    UnknownReceiver(String),

    #[error("Receiver `{0}` is not a message receiver")]
    InvalidReceiver(String),

    /// Point lookup on the stream returned zero or several entries
    #[error("No matching messages found on a Stream to retry")]
    MessageNotFound { id: String, stream: String },

    /// The receiver failed again; holds the new error text
    #[error("{0}")]
    HandlerFailed(String),
}

impl From<ResolveError> for FailureCause {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::UnknownReceiver(id) => FailureCause::UnknownReceiver(id),
            ResolveError::InvalidReceiver(id) => FailureCause::InvalidReceiver(id),
        }
    }
}

/// Retry errors
#[derive(Error, Debug)]
pub enum RetryError {
    /// The retry did not succeed. Carries the record that was retried.
    #[error("Failed to retry message {} from `{}`: {cause}", .message.id, .message.stream)]
    Failed {
        message: Box<FailedMessage>,
        cause: FailureCause,
    },

    /// No failed message is stored under the id
    #[error("No failed message stored with id {0}")]
    NotStored(String),

    /// Storage or stream backend failure, never wrapped
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl RetryError {
    pub(crate) fn failed(message: &FailedMessage, cause: impl Into<FailureCause>) -> Self {
        RetryError::Failed {
            message: Box::new(message.clone()),
            cause: cause.into(),
        }
    }

    /// The failure cause, if the retry itself failed
    pub fn cause(&self) -> Option<&FailureCause> {
        match self {
            RetryError::Failed { cause, .. } => Some(cause),
            _ => None,
        }
    }

    /// The record that was being retried, if any
    pub fn message(&self) -> Option<&FailedMessage> {
        match self {
            RetryError::Failed { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Whether processing more records makes sense after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, RetryError::Stream(_))
    }
}
