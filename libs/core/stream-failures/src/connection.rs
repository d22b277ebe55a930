//! Redis connection setup

use crate::error::StreamError;
use core_config::redis::RedisConfig;
use redis::aio::ConnectionManager;
use redis::Client;
use std::sync::Arc;
use tracing::info;

/// Connect to Redis and return a shared ConnectionManager
///
/// The ConnectionManager reconnects on its own after connection failures.
/// The connection is verified with a PING before returning.
///
/// # Example
/// ```ignore
/// let redis = stream_failures::connect("redis://127.0.0.1:6379").await?;
/// let repository = RedisFailedMessages::new(redis, "failed_stream_messages");
/// ```
pub async fn connect(url: &str) -> Result<Arc<ConnectionManager>, StreamError> {
    info!(url = %url, "Connecting to Redis");

    let client = Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;

    let mut conn = manager.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;

    info!("Connected to Redis");
    Ok(Arc::new(manager))
}

/// Connect using a RedisConfig
///
/// ```ignore
/// use core_config::{redis::RedisConfig, FromEnv};
///
/// let redis = stream_failures::connect_from_config(&RedisConfig::from_env()?).await?;
/// ```
pub async fn connect_from_config(config: &RedisConfig) -> Result<Arc<ConnectionManager>, StreamError> {
    connect(&config.uri).await
}
