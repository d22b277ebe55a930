//! Retry engine for stored failures.
//!
//! A retry re-reads the original message from its stream, resolves the
//! receiver that failed, and hands it a fresh `ReceivedMessage`:
//!
//! - on success the stored failure is removed
//! - on a new failure a replacement record is stored first, then the old
//!   record is removed; the repository never loses the failure
//! - when the receiver or the message cannot be found the record stays as it
//!   is, so an operator can fix the cause and retry again
//!
//! # Concurrency
//!
//! Retries are not exclusive. Two callers retrying the same failure may both
//! invoke the receiver, so delivery is at-least-once. The cleanup only
//! removes the exact record that was retried, which keeps a failure stored
//! meanwhile by another caller intact.

use crate::error::{FailureCause, RetryError, StreamError};
use crate::handler::FailureHandler;
use crate::message::ReceivedMessage;
use crate::metrics::{FailureMetrics, RetryStatus};
use crate::receiver::ReceiverResolver;
use crate::record::FailedMessage;
use crate::repository::FailedMessagesRepository;
use crate::stream::{Range, StreamLog};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Selects stored failures by id, stream and receiver. Unset fields match
/// anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryFilter {
    pub id: Option<String>,
    pub stream: Option<String>,
    pub receiver: Option<String>,
}

impl RetryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    pub fn with_receiver(mut self, receiver: impl Into<String>) -> Self {
        self.receiver = Some(receiver.into());
        self
    }

    pub fn matches(&self, message: &FailedMessage) -> bool {
        fn field(filter: &Option<String>, value: &str) -> bool {
            filter.as_deref().is_none_or(|f| f == value)
        }

        field(&self.id, &message.id)
            && field(&self.stream, &message.stream)
            && field(&self.receiver, &message.receiver)
    }
}

/// Outcome of retrying several failures
#[derive(Debug, Default)]
pub struct RetrySummary {
    /// IDs whose retry succeeded and whose failure was removed
    pub succeeded: Vec<String>,
    /// Retries that did not succeed, in attempt order
    pub failed: Vec<RetryError>,
}

impl RetrySummary {
    /// Number of retries attempted
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Whether every attempted retry succeeded
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Retries stored failures through their original receivers
#[derive(Clone)]
pub struct RetryEngine {
    handler: FailureHandler,
    resolver: Arc<dyn ReceiverResolver>,
    stream: Arc<dyn StreamLog>,
    metrics: FailureMetrics,
}

impl RetryEngine {
    /// Create a new RetryEngine
    pub fn new(
        repository: Arc<dyn FailedMessagesRepository>,
        resolver: Arc<dyn ReceiverResolver>,
        stream: Arc<dyn StreamLog>,
    ) -> Self {
        Self::with_handler(FailureHandler::new(repository), resolver, stream)
    }

    /// Create a RetryEngine sharing an existing FailureHandler
    pub fn with_handler(
        handler: FailureHandler,
        resolver: Arc<dyn ReceiverResolver>,
        stream: Arc<dyn StreamLog>,
    ) -> Self {
        Self {
            handler,
            resolver,
            stream,
            metrics: FailureMetrics::new(),
        }
    }

    /// Get the failure handler used to store renewed failures
    pub fn handler(&self) -> &FailureHandler {
        &self.handler
    }

    fn repository(&self) -> &Arc<dyn FailedMessagesRepository> {
        self.handler.repository()
    }

    /// Retry a single stored failure.
    #[instrument(
        skip_all,
        fields(id = %message.id, stream = %message.stream, receiver = %message.receiver)
    )]
    pub async fn retry(&self, message: &FailedMessage) -> Result<(), RetryError> {
        let started = Instant::now();
        let result = self.attempt(message).await;

        let status = match &result {
            Ok(()) => RetryStatus::Success,
            Err(RetryError::Failed {
                cause: FailureCause::HandlerFailed(_),
                ..
            }) => RetryStatus::Failed,
            Err(_) => RetryStatus::Skipped,
        };
        self.metrics
            .retry_finished(&message.stream, status, started.elapsed());

        match &result {
            Ok(()) => info!("Retried failed message"),
            Err(e) => warn!(error = %e, "Retry of failed message did not succeed"),
        }

        result
    }

    async fn attempt(&self, message: &FailedMessage) -> Result<(), RetryError> {
        let receiver = self
            .resolver
            .resolve(&message.receiver)
            .map_err(|e| RetryError::failed(message, e))?;

        let mut entries = self
            .stream
            .read_range(&message.stream, &Range::point(message.id.as_str()), 1)
            .await?;
        if entries.len() != 1 {
            return Err(RetryError::failed(
                message,
                FailureCause::MessageNotFound {
                    id: message.id.clone(),
                    stream: message.stream.clone(),
                },
            ));
        }

        let (_, fields) = entries.remove(0);
        let received = ReceivedMessage::from_fields(message.id.clone(), fields);

        // Pin the cleanup to the stored record, so an undated record never
        // matches a replacement that repeats the same error text.
        let original = match message.date {
            Some(_) => message.clone(),
            None => match self.repository().find(&message.id).await? {
                Some(stored) if message.is_same_failure(&stored) => stored,
                _ => message.clone(),
            },
        };

        let outcome = match receiver.handle(&received).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // A failed write must leave the original record in place
                let replacement = self
                    .handler
                    .store_as(&received, &message.receiver, &e)
                    .await?;
                debug!(date = ?replacement.date, "Stored replacement failure");
                Err(RetryError::failed(
                    message,
                    FailureCause::HandlerFailed(e.to_string()),
                ))
            }
        };

        // Only after any replacement is stored. Leaves the replacement alone.
        let removed = match self.repository().remove(&original).await {
            Ok(removed) => removed,
            Err(e) => {
                if let Err(failed) = &outcome {
                    warn!(
                        error = %failed,
                        cleanup_error = %e,
                        "Retry failed and the original record was not removed"
                    );
                }
                return Err(e.into());
            }
        };
        if removed {
            self.metrics.failure_removed(&message.stream);
        }

        outcome
    }

    /// Retry the stored failure for a message ID
    pub async fn retry_by_id(&self, id: &str) -> Result<(), RetryError> {
        let message = self
            .repository()
            .find(id)
            .await?
            .ok_or_else(|| RetryError::NotStored(id.to_string()))?;

        self.retry(&message).await
    }

    /// Retry every stored failure.
    ///
    /// Each failure is retried independently in snapshot order; one failing
    /// retry does not stop the others. Storage errors abort the batch.
    pub async fn retry_all(&self) -> Result<RetrySummary, StreamError> {
        let messages = self.repository().all().await?;
        self.retry_each(messages).await
    }

    /// Retry the stored failures selected by `filter`
    pub async fn retry_matching(&self, filter: &RetryFilter) -> Result<RetrySummary, StreamError> {
        let messages = self
            .repository()
            .all()
            .await?
            .into_iter()
            .filter(|m| filter.matches(m))
            .collect();

        self.retry_each(messages).await
    }

    async fn retry_each(&self, messages: Vec<FailedMessage>) -> Result<RetrySummary, StreamError> {
        let mut summary = RetrySummary::default();

        for message in messages {
            match self.retry(&message).await {
                Ok(()) => summary.succeeded.push(message.id),
                Err(RetryError::Stream(e)) => return Err(e),
                Err(e) => summary.failed.push(e),
            }
        }

        self.metrics.outstanding(self.repository().count().await?);

        info!(
            attempted = summary.attempted(),
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            "Finished retrying failed messages"
        );

        Ok(summary)
    }
}
