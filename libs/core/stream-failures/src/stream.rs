//! Stream log access
//!
//! Range reads by entry ID. The retry engine uses a point lookup to fetch
//! the original message of a stored failure.

use crate::config::FailuresConfig;
use crate::error::StreamError;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A stream entry: ID and `(field, value)` pairs
pub type StreamEntry = (String, Vec<(String, String)>);

/// Inclusive range of stream entry IDs
///
/// `"-"` and `"+"` stand for the smallest and greatest possible ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    start: String,
    end: String,
}

impl Range {
    pub const FIRST: &'static str = "-";
    pub const LAST: &'static str = "+";

    /// Create a range between two IDs, both inclusive
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Range collapsed to a single ID
    pub fn point(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            start: id.clone(),
            end: id,
        }
    }

    /// The whole stream
    pub fn full() -> Self {
        Self::new(Self::FIRST, Self::LAST)
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn end(&self) -> &str {
        &self.end
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Read access to an append-only stream log
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamLog: Send + Sync {
    /// Read at most `limit` entries of `stream` within `range`, in ID order
    // Full path: the generated mock would otherwise see `std::ops::Range`
    async fn read_range(
        &self,
        stream: &str,
        range: &crate::stream::Range,
        limit: usize,
    ) -> Result<Vec<StreamEntry>, StreamError>;
}

/// Redis Streams log
pub struct RedisStreamLog {
    redis: Arc<ConnectionManager>,
    prefix: String,
}

impl RedisStreamLog {
    /// Create a new RedisStreamLog
    pub fn new(redis: Arc<ConnectionManager>) -> Self {
        Self {
            redis,
            prefix: String::new(),
        }
    }

    /// Create from configuration
    pub fn from_config(redis: Arc<ConnectionManager>, config: &FailuresConfig) -> Self {
        Self::new(redis).with_prefix(config.stream_prefix.clone())
    }

    /// Set the prefix prepended to stream names
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Redis key of a stream
    pub fn stream_key(&self, stream: &str) -> String {
        format!("{}{}", self.prefix, stream)
    }
}

impl Clone for RedisStreamLog {
    fn clone(&self) -> Self {
        Self {
            redis: self.redis.clone(),
            prefix: self.prefix.clone(),
        }
    }
}

#[async_trait]
impl StreamLog for RedisStreamLog {
    async fn read_range(
        &self,
        stream: &str,
        range: &Range,
        limit: usize,
    ) -> Result<Vec<StreamEntry>, StreamError> {
        let key = self.stream_key(stream);
        let mut conn = (*self.redis).clone();

        let entries: Vec<StreamEntry> = redis::cmd("XRANGE")
            .arg(&key)
            .arg(range.start())
            .arg(range.end())
            .arg("COUNT")
            .arg(limit)
            .query_async(&mut conn)
            .await?;

        debug!(
            stream = %key,
            range = %range,
            count = entries.len(),
            "Read stream range"
        );

        Ok(entries)
    }
}
