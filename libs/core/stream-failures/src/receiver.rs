//! Message receivers and their resolution by identity.
//!
//! This module provides:
//! - `MessageReceiver` trait implemented by message handlers
//! - `ReceiverResolver` trait turning a stored receiver identity back into a
//!   live receiver at retry time
//! - `ReceiverRegistry`, a startup-time registry implementing the resolver

use crate::error::{ResolveError, StreamError};
use crate::message::ReceivedMessage;
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Trait for message receivers.
///
/// Domain handlers implement this trait to process messages from a stream.
/// The receiver's `name` is stored with every failure and used to find the
/// receiver again when the failure is retried, so it must not change between
/// releases. Use a fixed string, not a type name.
///
/// # Example
///
/// ```rust,ignore
/// use stream_failures::{MessageReceiver, ReceivedMessage, StreamError};
///
/// struct OrderPlacedListener {
///     mailer: Arc<Mailer>,
/// }
///
/// #[async_trait]
/// impl MessageReceiver for OrderPlacedListener {
///     async fn handle(&self, message: &ReceivedMessage) -> Result<(), StreamError> {
///         let order: Order = message.data()?;
///         self.mailer.confirm(&order).await.map_err(|e| StreamError::processing(e.to_string()))
///     }
///
///     fn name(&self) -> &str {
///         "orders.placed.confirmation"
///     }
/// }
/// ```
#[async_trait]
pub trait MessageReceiver: Send + Sync {
    /// Process a single message.
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), StreamError>;

    /// Stable identity of the receiver, persisted with its failures.
    fn name(&self) -> &str;
}

/// Receiver registered under an explicit identity.
///
/// Reports the registered identity as its name, so failures it stores
/// resolve back to the same registration.
struct Aliased {
    identity: Arc<str>,
    inner: Arc<dyn MessageReceiver>,
}

#[async_trait]
impl MessageReceiver for Aliased {
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), StreamError> {
        self.inner.handle(message).await
    }

    fn name(&self) -> &str {
        &self.identity
    }
}

/// Resolves a receiver identity to a ready-to-use receiver
pub trait ReceiverResolver: Send + Sync {
    fn resolve(&self, identity: &str) -> Result<Arc<dyn MessageReceiver>, ResolveError>;
}

type ReceiverFactory = Arc<dyn Fn() -> Arc<dyn MessageReceiver> + Send + Sync>;

#[derive(Clone)]
enum Binding {
    Receiver(ReceiverFactory),
    Service(Arc<dyn Any + Send + Sync>),
}

/// Registry of receivers and other host dependencies, keyed by identity.
///
/// Receivers are keyed by their `name`. Each factory is called once at
/// registration to read it.
///
/// # Example
///
/// ```rust,ignore
/// let registry = ReceiverRegistry::new()
///     .register(|| OrderPlacedListener::new(mailer.clone()))
///     .bind("mailer", mailer.clone());
///
/// let receiver = registry.resolve("orders.placed.confirmation")?;
/// ```
#[derive(Clone, Default)]
pub struct ReceiverRegistry {
    bindings: HashMap<String, Binding>,
}

impl ReceiverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a receiver factory, resolved to a new instance per call
    pub fn register<R, F>(mut self, factory: F) -> Self
    where
        R: MessageReceiver + 'static,
        F: Fn() -> R + Send + Sync + 'static,
    {
        let identity = factory().name().to_string();
        self.insert_receiver(
            identity,
            Arc::new(move || Arc::new(factory()) as Arc<dyn MessageReceiver>),
        );
        self
    }

    /// Register a receiver factory under an explicit identity.
    ///
    /// Resolved receivers report `identity` as their name.
    pub fn register_as<R, F>(mut self, identity: impl Into<String>, factory: F) -> Self
    where
        R: MessageReceiver + 'static,
        F: Fn() -> R + Send + Sync + 'static,
    {
        let identity: String = identity.into();
        let alias: Arc<str> = Arc::from(identity.as_str());
        self.insert_receiver(
            identity,
            Arc::new(move || {
                Arc::new(Aliased {
                    identity: alias.clone(),
                    inner: Arc::new(factory()),
                }) as Arc<dyn MessageReceiver>
            }),
        );
        self
    }

    /// Register a shared receiver instance
    pub fn register_instance<R>(mut self, receiver: Arc<R>) -> Self
    where
        R: MessageReceiver + 'static,
    {
        let identity = receiver.name().to_string();
        self.insert_receiver(
            identity,
            Arc::new(move || receiver.clone() as Arc<dyn MessageReceiver>),
        );
        self
    }

    /// Bind a non-receiver dependency
    pub fn bind<T>(mut self, identity: impl Into<String>, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        self.bindings
            .insert(identity.into(), Binding::Service(Arc::new(value)));
        self
    }

    /// Get a dependency bound with `bind`
    pub fn service<T>(&self, identity: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        match self.bindings.get(identity)? {
            Binding::Service(value) => value.clone().downcast::<T>().ok(),
            Binding::Receiver(_) => None,
        }
    }

    /// Whether anything is registered under the identity
    pub fn contains(&self, identity: &str) -> bool {
        self.bindings.contains_key(identity)
    }

    /// All registered identities, sorted
    pub fn identities(&self) -> Vec<&str> {
        let mut identities: Vec<_> = self.bindings.keys().map(String::as_str).collect();
        identities.sort_unstable();
        identities
    }

    fn insert_receiver(&mut self, identity: String, factory: ReceiverFactory) {
        debug!(receiver = %identity, "Registered receiver");
        self.bindings.insert(identity, Binding::Receiver(factory));
    }
}

impl ReceiverResolver for ReceiverRegistry {
    fn resolve(&self, identity: &str) -> Result<Arc<dyn MessageReceiver>, ResolveError> {
        match self.bindings.get(identity) {
            Some(Binding::Receiver(factory)) => Ok(factory()),
            Some(Binding::Service(_)) => Err(ResolveError::InvalidReceiver(identity.to_string())),
            None => Err(ResolveError::UnknownReceiver(identity.to_string())),
        }
    }
}
