//! Stream Failures
//!
//! Failed message storage and retries for Redis Streams receivers.
//!
//! ## Features
//!
//! - **Failure store**: every receiver error is recorded, keyed by stream entry ID
//! - **Retries**: replay a stored failure through the receiver that failed
//! - **Bulk retries**: retry everything, or a filtered selection, independently
//! - **Receiver registry**: resolve receivers by stored identity at retry time
//! - **Prometheus metrics**: Built-in observability
//!
//! ## Example
//!
//! ```ignore
//! use core_config::redis::RedisConfig;
//! use stream_failures::{
//!     FailureHandler, FailuresConfig, ReceiverRegistry, RedisFailedMessages, RedisStreamLog,
//!     RetryEngine,
//! };
//!
//! core_config::tracing::install_color_eyre();
//! core_config::tracing::init_tracing(&core_config::Environment::from_env());
//!
//! let redis = stream_failures::connect_from_config(&RedisConfig::from_env()?).await?;
//! let config = FailuresConfig::from_env()?;
//! let repository = Arc::new(RedisFailedMessages::from_config(redis.clone(), &config));
//! let registry = ReceiverRegistry::new().register(|| OrderPlacedListener::new(mailer.clone()));
//!
//! // Consumer side: record failures
//! let failures = FailureHandler::new(repository.clone());
//! failures.dispatch(&message, &listener).await?;
//!
//! // Operator side: retry them
//! let engine = RetryEngine::new(
//!     repository,
//!     Arc::new(registry),
//!     Arc::new(RedisStreamLog::from_config(redis, &config)),
//! );
//! let summary = engine.retry_all().await?;
//! ```

mod config;
mod connection;
mod error;
mod handler;
mod memory;
mod message;
pub mod metrics;
mod receiver;
mod record;
mod repository;
mod retry;
mod stream;

// Re-export main types
pub use config::{FailuresConfig, DEFAULT_FAILED_MESSAGES_KEY};
pub use connection::{connect, connect_from_config};
pub use error::{FailureCause, ResolveError, RetryError, StreamError};
pub use handler::{DispatchOutcome, FailureHandler};
pub use memory::InMemoryFailedMessages;
pub use message::{MessageKey, ReceivedMessage};
pub use metrics::{init_metrics, render_metrics, FailureMetrics};
pub use receiver::{MessageReceiver, ReceiverRegistry, ReceiverResolver};
pub use record::FailedMessage;
pub use repository::{Clock, FailedMessagesRepository, RedisFailedMessages};
pub use retry::{RetryEngine, RetryFilter, RetrySummary};
pub use stream::{Range, RedisStreamLog, StreamEntry, StreamLog};

pub use core_config::FromEnv;
