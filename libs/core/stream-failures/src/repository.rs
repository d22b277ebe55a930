//! Failed message repository
//!
//! Durable store of failed messages, keyed by stream entry ID. There is at
//! most one outstanding failure per message; storing a new failure for the
//! same ID replaces the previous one.

use crate::config::FailuresConfig;
use crate::error::StreamError;
use crate::record::FailedMessage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Source of the `date` stamped on stored records
pub type Clock = fn() -> DateTime<Utc>;

/// Repository trait for failed message persistence
///
/// Implementations must make `add` durable before returning and keep
/// concurrent calls for different IDs independent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FailedMessagesRepository: Send + Sync {
    /// Store a failure, replacing any stored failure with the same ID.
    /// Returns the record as stored, with its date set.
    async fn add(&self, message: FailedMessage) -> Result<FailedMessage, StreamError>;

    /// Delete the stored failure if it is still `message`.
    ///
    /// A failure stored later for the same ID is left in place. Removing an
    /// absent record is a no-op. Returns whether anything was deleted.
    async fn remove(&self, message: &FailedMessage) -> Result<bool, StreamError>;

    /// Snapshot of all stored failures, oldest first
    async fn all(&self) -> Result<Vec<FailedMessage>, StreamError>;

    /// Whether a failure is stored for the message ID
    async fn exists(&self, id: &str) -> Result<bool, StreamError>;

    /// Get the stored failure for a message ID
    async fn find(&self, id: &str) -> Result<Option<FailedMessage>, StreamError>;

    /// Count stored failures
    async fn count(&self) -> Result<usize, StreamError>;

    /// Delete every stored failure. Returns how many were deleted.
    async fn flush(&self) -> Result<usize, StreamError>;
}

/// Sort a snapshot the way `all` returns it
pub(crate) fn sort_snapshot(messages: &mut [FailedMessage]) {
    messages.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
}

// Deletes the hash field only while it still holds the same failure.
// ARGV: id, receiver, error, date ("" matches any date)
static REMOVE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local stored = redis.call('HGET', KEYS[1], ARGV[1])
        if not stored then
            return 0
        end
        local record = cjson.decode(stored)
        if record['receiver'] ~= ARGV[2] or record['error'] ~= ARGV[3] then
            return 0
        end
        if ARGV[4] ~= '' and record['date'] ~= ARGV[4] then
            return 0
        end
        return redis.call('HDEL', KEYS[1], ARGV[1])
        "#,
    )
});

/// Redis-backed repository storing failures in a single hash
pub struct RedisFailedMessages {
    redis: Arc<ConnectionManager>,
    key: String,
    clock: Clock,
}

impl RedisFailedMessages {
    /// Create a new RedisFailedMessages
    pub fn new(redis: Arc<ConnectionManager>, key: impl Into<String>) -> Self {
        Self {
            redis,
            key: key.into(),
            clock: Utc::now,
        }
    }

    /// Create from configuration
    pub fn from_config(redis: Arc<ConnectionManager>, config: &FailuresConfig) -> Self {
        Self::new(redis, config.failed_messages_key.clone())
    }

    /// Replace the clock used to stamp stored records
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Get the Redis key of the hash
    pub fn key(&self) -> &str {
        &self.key
    }

    fn decode(&self, id: &str, data: &str) -> Result<FailedMessage, StreamError> {
        serde_json::from_str(data).map_err(|e| {
            StreamError::Serialization(format!(
                "Corrupt failed message {} in {}: {}",
                id, self.key, e
            ))
        })
    }
}

impl Clone for RedisFailedMessages {
    fn clone(&self) -> Self {
        Self {
            redis: self.redis.clone(),
            key: self.key.clone(),
            clock: self.clock,
        }
    }
}

/// Date exactly as it appears in the stored JSON
fn serialized_date(date: &DateTime<Utc>) -> Result<String, StreamError> {
    match serde_json::to_value(date)? {
        serde_json::Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

#[async_trait]
impl FailedMessagesRepository for RedisFailedMessages {
    async fn add(&self, message: FailedMessage) -> Result<FailedMessage, StreamError> {
        let stored = message.stored_at((self.clock)());
        let data = serde_json::to_string(&stored)?;
        let mut conn = (*self.redis).clone();

        let _: () = conn.hset(&self.key, &stored.id, &data).await?;

        debug!(
            id = %stored.id,
            stream = %stored.stream,
            receiver = %stored.receiver,
            "Stored failed message"
        );

        Ok(stored)
    }

    async fn remove(&self, message: &FailedMessage) -> Result<bool, StreamError> {
        let date = match &message.date {
            Some(date) => serialized_date(date)?,
            None => String::new(),
        };
        let mut conn = (*self.redis).clone();

        let removed: i64 = REMOVE_SCRIPT
            .key(&self.key)
            .arg(&message.id)
            .arg(&message.receiver)
            .arg(&message.error)
            .arg(date)
            .invoke_async(&mut conn)
            .await?;

        debug!(id = %message.id, removed = removed > 0, "Removed failed message");

        Ok(removed > 0)
    }

    async fn all(&self) -> Result<Vec<FailedMessage>, StreamError> {
        let mut conn = (*self.redis).clone();

        let entries: HashMap<String, String> = conn.hgetall(&self.key).await?;

        let mut messages = entries
            .iter()
            .map(|(id, data)| self.decode(id, data))
            .collect::<Result<Vec<_>, _>>()?;
        sort_snapshot(&mut messages);

        Ok(messages)
    }

    async fn exists(&self, id: &str) -> Result<bool, StreamError> {
        let mut conn = (*self.redis).clone();
        let exists: bool = conn.hexists(&self.key, id).await?;
        Ok(exists)
    }

    async fn find(&self, id: &str) -> Result<Option<FailedMessage>, StreamError> {
        let mut conn = (*self.redis).clone();

        let data: Option<String> = conn.hget(&self.key, id).await?;

        data.map(|data| self.decode(id, &data)).transpose()
    }

    async fn count(&self) -> Result<usize, StreamError> {
        let mut conn = (*self.redis).clone();
        let len: usize = conn.hlen(&self.key).await?;
        Ok(len)
    }

    async fn flush(&self) -> Result<usize, StreamError> {
        let mut conn = (*self.redis).clone();

        let (len, _): (usize, i64) = redis::pipe()
            .atomic()
            .hlen(&self.key)
            .del(&self.key)
            .query_async(&mut conn)
            .await?;

        if len > 0 {
            info!(count = len, key = %self.key, "Flushed failed messages");
        }

        Ok(len)
    }
}
