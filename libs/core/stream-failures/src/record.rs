//! Failed message record
//!
//! One record describes one failed delivery attempt. Records are stored as
//! flat JSON objects; the field names are read by operator tooling and must
//! stay stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Failed delivery attempt of a single stream message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedMessage {
    /// Stream entry ID of the original message (e.g., "1234567890123-0")
    pub id: String,

    /// Name of the stream the message was read from
    pub stream: String,

    /// Identity of the receiver that failed to handle the message
    pub receiver: String,

    /// Error text reported by the receiver
    pub error: String,

    /// When the failure was stored. Set by the repository.
    pub date: Option<DateTime<Utc>>,
}

impl FailedMessage {
    /// Create a record that has not been stored yet
    pub fn new(
        id: impl Into<String>,
        stream: impl Into<String>,
        receiver: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            stream: stream.into(),
            receiver: receiver.into(),
            error: error.into(),
            date: None,
        }
    }

    /// Copy of this record stamped with the time it was stored
    pub fn stored_at(&self, date: DateTime<Utc>) -> Self {
        Self {
            date: Some(date),
            ..self.clone()
        }
    }

    /// Whether `stored` is still this very failure and not a later one for
    /// the same message.
    ///
    /// A record without a date matches on receiver and error only.
    pub fn is_same_failure(&self, stored: &FailedMessage) -> bool {
        self.id == stored.id
            && self.receiver == stored.receiver
            && self.error == stored.error
            && self.date.is_none_or(|date| stored.date == Some(date))
    }
}
