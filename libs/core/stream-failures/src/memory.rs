//! In-memory failed message repository
//!
//! Same semantics as the Redis repository, without durability. Intended for
//! tests and for embedding in processes that do not need persistence.

use crate::error::StreamError;
use crate::record::FailedMessage;
use crate::repository::{sort_snapshot, Clock, FailedMessagesRepository};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct InMemoryFailedMessages {
    messages: Arc<RwLock<HashMap<String, FailedMessage>>>,
    clock: Clock,
}

impl InMemoryFailedMessages {
    pub fn new() -> Self {
        Self {
            messages: Arc::new(RwLock::new(HashMap::new())),
            clock: Utc::now,
        }
    }

    /// Replace the clock used to stamp stored records
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for InMemoryFailedMessages {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FailedMessagesRepository for InMemoryFailedMessages {
    async fn add(&self, message: FailedMessage) -> Result<FailedMessage, StreamError> {
        let stored = message.stored_at((self.clock)());
        self.messages
            .write()
            .await
            .insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn remove(&self, message: &FailedMessage) -> Result<bool, StreamError> {
        let mut messages = self.messages.write().await;
        match messages.get(&message.id) {
            Some(stored) if message.is_same_failure(stored) => {
                messages.remove(&message.id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn all(&self) -> Result<Vec<FailedMessage>, StreamError> {
        let mut snapshot: Vec<_> = self.messages.read().await.values().cloned().collect();
        sort_snapshot(&mut snapshot);
        Ok(snapshot)
    }

    async fn exists(&self, id: &str) -> Result<bool, StreamError> {
        Ok(self.messages.read().await.contains_key(id))
    }

    async fn find(&self, id: &str) -> Result<Option<FailedMessage>, StreamError> {
        Ok(self.messages.read().await.get(id).cloned())
    }

    async fn count(&self) -> Result<usize, StreamError> {
        Ok(self.messages.read().await.len())
    }

    async fn flush(&self) -> Result<usize, StreamError> {
        let mut messages = self.messages.write().await;
        let len = messages.len();
        messages.clear();
        Ok(len)
    }
}
