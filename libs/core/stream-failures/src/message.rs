//! Delivered message wrapper
//!
//! Pairs a stream entry ID with the entry's fields. A new value is built for
//! every delivery attempt, original or retried.

use crate::error::StreamError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use strum::{AsRefStr, Display, EnumString};

/// Standard field keys of a stream entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Display, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MessageKey {
    /// The event name.
    Name,
    /// The event payload (JSON serialized).
    Data,
    /// Timestamp when the event was produced.
    Created,
}

/// A message handed to a receiver for one processing attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    id: String,
    content: HashMap<String, String>,
}

impl ReceivedMessage {
    /// Create a new ReceivedMessage
    pub fn new(id: impl Into<String>, content: HashMap<String, String>) -> Self {
        Self {
            id: id.into(),
            content,
        }
    }

    /// Build from the `(field, value)` pairs of a stream entry
    pub fn from_fields(id: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self::new(id, fields.into_iter().collect())
    }

    /// Stream entry ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// All entry fields
    pub fn content(&self) -> &HashMap<String, String> {
        &self.content
    }

    /// Value of a standard field
    pub fn get(&self, key: MessageKey) -> Option<&str> {
        self.content.get(key.as_ref()).map(String::as_str)
    }

    /// Event name, if the entry carries one
    pub fn event_name(&self) -> Option<&str> {
        self.get(MessageKey::Name)
    }

    /// Decode the JSON payload
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, StreamError> {
        let raw = self.get(MessageKey::Data).ok_or_else(|| {
            StreamError::Serialization(format!(
                "Message {} has no '{}' field",
                self.id,
                MessageKey::Data
            ))
        })?;
        Ok(serde_json::from_str(raw)?)
    }

    /// When the entry was appended, parsed from the stream ID
    ///
    /// Stream IDs are in format "timestamp_ms-sequence"
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.id
            .split('-')
            .next()
            .and_then(|ts| ts.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
    }
}
