//! Failure store configuration
//!
//! This module provides `FailuresConfig` for naming the Redis keys used by
//! the failed message repository and the stream log.

use core_config::{env_or_default, ConfigError, FromEnv};

/// Default Redis key of the failed messages hash
pub const DEFAULT_FAILED_MESSAGES_KEY: &str = "failed_stream_messages";

/// Configuration for failed message storage and retries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailuresConfig {
    /// Redis key of the hash holding failed messages
    pub failed_messages_key: String,

    /// Prefix prepended to stream names when reading from Redis
    pub stream_prefix: String,
}

impl FailuresConfig {
    /// Create a new FailuresConfig with explicit values
    pub fn new(failed_messages_key: impl Into<String>) -> Self {
        Self {
            failed_messages_key: failed_messages_key.into(),
            stream_prefix: String::new(),
        }
    }

    /// Set the stream key prefix
    pub fn with_stream_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.stream_prefix = prefix.into();
        self
    }

    /// Set the failed messages key
    pub fn with_failed_messages_key(mut self, key: impl Into<String>) -> Self {
        self.failed_messages_key = key.into();
        self
    }
}

impl Default for FailuresConfig {
    fn default() -> Self {
        Self::new(DEFAULT_FAILED_MESSAGES_KEY)
    }
}

impl FromEnv for FailuresConfig {
    /// Reads STREAM_FAILURES_KEY and STREAM_KEY_PREFIX, both optional
    fn from_env() -> Result<Self, ConfigError> {
        let key = env_or_default("STREAM_FAILURES_KEY", DEFAULT_FAILED_MESSAGES_KEY);
        if key.trim().is_empty() {
            return Err(ConfigError::ParseError {
                key: "STREAM_FAILURES_KEY".to_string(),
                details: "must not be empty".to_string(),
            });
        }

        Ok(Self::new(key).with_stream_prefix(env_or_default("STREAM_KEY_PREFIX", "")))
    }
}
