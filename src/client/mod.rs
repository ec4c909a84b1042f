//! Cache client abstraction layer for cachelink.
//!
//! Provides a trait-based boundary around the underlying client library so the
//! connection lifecycle can be driven by the real Redis client or by a scripted
//! mock in tests.

mod mock;
mod redis_client;

pub use mock::{MockBehavior, MockClient, MockConnector, MockStats};
pub use redis_client::{RedisClient, RedisConnector};

use crate::config::ConnectionOptions;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Lifecycle signal emitted by a client while establishing or holding its link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The link is established, authenticated and usable.
    Ready,
    /// The link failed. Carries the library's message.
    Error(String),
    /// The link was closed by the peer or the library.
    End,
}

/// Channel on which a client reports its lifecycle events.
pub type EventSender = mpsc::UnboundedSender<ClientEvent>;

/// Trait defining the interface for cache clients.
///
/// Implementations own the real link. `connect` must not block: it starts the
/// attempt and reports the outcome through the event channel.
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Starts establishing the link.
    ///
    /// Emits `Ready` once on success or `Error` on failure, and may emit
    /// `Error`/`End` later if an established link goes away.
    fn connect(&self, events: EventSender);

    /// Sends a PING and returns the reply payload.
    async fn ping(&self) -> Result<String>;

    /// Drops the link immediately, abandoning in-flight commands.
    fn disconnect(&self);

    /// Closes the link after pending replies have been delivered.
    async fn quit(&self) -> Result<()>;
}

/// Constructs clients from connection options.
pub trait Connector: Send + Sync {
    /// Creates an unconnected client for the given options.
    fn create(&self, options: &ConnectionOptions) -> Result<Arc<dyn CacheClient>>;
}

/// Locks a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
