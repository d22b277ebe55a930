//! Failure recording
//!
//! `FailureHandler` turns a receiver error into a stored `FailedMessage`.
//! Consumers call it when a receiver fails during normal dispatch, and the
//! retry engine calls it when a retried message fails again.

use crate::error::StreamError;
use crate::message::ReceivedMessage;
use crate::metrics::FailureMetrics;
use crate::receiver::MessageReceiver;
use crate::record::FailedMessage;
use crate::repository::FailedMessagesRepository;
use std::fmt::Display;
use std::sync::Arc;
use tracing::warn;

/// Result of delivering a message through `FailureHandler::dispatch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The receiver handled the message
    Handled,
    /// The receiver failed and the failure was stored
    Failed(FailedMessage),
}

/// Records receiver failures in the repository
#[derive(Clone)]
pub struct FailureHandler {
    repository: Arc<dyn FailedMessagesRepository>,
    metrics: FailureMetrics,
}

impl FailureHandler {
    /// Create a new FailureHandler
    pub fn new(repository: Arc<dyn FailedMessagesRepository>) -> Self {
        Self {
            repository,
            metrics: FailureMetrics::new(),
        }
    }

    /// Get the underlying repository
    pub fn repository(&self) -> &Arc<dyn FailedMessagesRepository> {
        &self.repository
    }

    /// Store the failure of `receiver` to handle `message`.
    ///
    /// Never inspects or retries the error. Fails only if the repository does.
    pub async fn store(
        &self,
        message: &ReceivedMessage,
        receiver: &dyn MessageReceiver,
        error: impl Display,
    ) -> Result<FailedMessage, StreamError> {
        self.store_as(message, receiver.name(), error).await
    }

    /// Store a failure under an explicit receiver identity.
    ///
    /// Used on retry, where the identity must stay the one the failure was
    /// resolved from.
    pub async fn store_as(
        &self,
        message: &ReceivedMessage,
        receiver: &str,
        error: impl Display,
    ) -> Result<FailedMessage, StreamError> {
        let failed = FailedMessage::new(
            message.id(),
            message.event_name().unwrap_or_default(),
            receiver,
            error.to_string(),
        );

        let stored = self.repository.add(failed).await?;

        warn!(
            id = %stored.id,
            stream = %stored.stream,
            receiver = %stored.receiver,
            error = %stored.error,
            "Stored failed message"
        );
        self.metrics.failure_stored(&stored.stream, &stored.receiver);

        Ok(stored)
    }

    /// Deliver `message` to `receiver`, storing the failure if it errors.
    pub async fn dispatch(
        &self,
        message: &ReceivedMessage,
        receiver: &dyn MessageReceiver,
    ) -> Result<DispatchOutcome, StreamError> {
        match receiver.handle(message).await {
            Ok(()) => Ok(DispatchOutcome::Handled),
            Err(e) => {
                let stored = self.store(message, receiver, &e).await?;
                Ok(DispatchOutcome::Failed(stored))
            }
        }
    }
}
