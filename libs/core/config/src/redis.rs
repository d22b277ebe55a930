use crate::{env_required, ConfigError, FromEnv};

/// Redis connection settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://localhost:6379`
    pub uri: String,
}

impl RedisConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

impl FromEnv for RedisConfig {
    /// Requires REDIS_HOST to be set (no default)
    fn from_env() -> Result<Self, ConfigError> {
        let uri = env_required("REDIS_HOST")?;
        if !uri.starts_with("redis://") && !uri.starts_with("rediss://") {
            return Err(ConfigError::ParseError {
                key: "REDIS_HOST".to_string(),
                details: format!("expected a redis:// URL, got '{}'", uri),
            });
        }

        Ok(Self::new(uri))
    }
}
