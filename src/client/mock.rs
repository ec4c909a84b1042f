//! Mock cache client for testing.
//!
//! Provides a scripted client whose lifecycle events are chosen up front, so
//! connection handling can be exercised without a running server.

use super::{lock, CacheClient, ClientEvent, Connector, EventSender};
use crate::config::ConnectionOptions;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// How a mock client reacts to `connect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    /// Signals ready immediately.
    Ready,
    /// Signals an error immediately.
    Fail(String),
    /// Never signals; keeps the event channel open.
    Hang,
    /// Drops the event channel without signalling.
    Silent,
    /// Emits the given events in order.
    Sequence(Vec<ClientEvent>),
}

/// Counters shared by a connector and every client it creates.
#[derive(Debug, Default)]
pub struct MockStats {
    created: AtomicUsize,
    disconnects: AtomicUsize,
    quits: AtomicUsize,
    pings: AtomicUsize,
}

impl MockStats {
    /// Number of clients created.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Number of forced disconnects requested.
    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Number of graceful quits requested.
    pub fn quits(&self) -> usize {
        self.quits.load(Ordering::SeqCst)
    }

    /// Number of pings answered or refused.
    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

/// A mock client that replays its configured behavior.
pub struct MockClient {
    behavior: MockBehavior,
    stats: Arc<MockStats>,
    quit_error: Option<String>,
    events: Mutex<Option<EventSender>>,
    open: AtomicBool,
}

impl MockClient {
    fn new(behavior: MockBehavior, stats: Arc<MockStats>, quit_error: Option<String>) -> Self {
        Self {
            behavior,
            stats,
            quit_error,
            events: Mutex::new(None),
            open: AtomicBool::new(false),
        }
    }

    /// Pushes an event as if the library had emitted it.
    ///
    /// Returns false when the channel was never opened or has been closed.
    pub fn emit(&self, event: ClientEvent) -> bool {
        if event == ClientEvent::Ready {
            self.open.store(true, Ordering::SeqCst);
        }
        match lock(&self.events).as_ref() {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }

    /// Returns true while the mock link is usable.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        lock(&self.events).take();
    }
}

#[async_trait]
impl CacheClient for MockClient {
    fn connect(&self, events: EventSender) {
        match &self.behavior {
            MockBehavior::Ready => {
                self.open.store(true, Ordering::SeqCst);
                let _ = events.send(ClientEvent::Ready);
            }
            MockBehavior::Fail(message) => {
                let _ = events.send(ClientEvent::Error(message.clone()));
            }
            MockBehavior::Hang => {}
            MockBehavior::Silent => return,
            MockBehavior::Sequence(sequence) => {
                for event in sequence {
                    if *event == ClientEvent::Ready {
                        self.open.store(true, Ordering::SeqCst);
                    }
                    let _ = events.send(event.clone());
                }
            }
        }
        *lock(&self.events) = Some(events);
    }

    async fn ping(&self) -> Result<String> {
        self.stats.pings.fetch_add(1, Ordering::SeqCst);
        if self.is_open() {
            Ok("PONG".to_string())
        } else {
            Err(CacheError::connection("Mock link is closed"))
        }
    }

    fn disconnect(&self) {
        self.stats.disconnects.fetch_add(1, Ordering::SeqCst);
        self.close();
    }

    async fn quit(&self) -> Result<()> {
        self.stats.quits.fetch_add(1, Ordering::SeqCst);
        self.close();
        match &self.quit_error {
            Some(message) => Err(CacheError::connection(message.clone())),
            None => Ok(()),
        }
    }
}

/// Connector producing `MockClient`s.
///
/// Behaviors are consumed one per `create`; once the queue is empty the
/// fallback behavior is used.
pub struct MockConnector {
    queue: Mutex<VecDeque<MockBehavior>>,
    fallback: MockBehavior,
    stats: Arc<MockStats>,
    quit_error: Option<String>,
    reject_with: Option<String>,
    last_client: Mutex<Option<Arc<MockClient>>>,
}

impl MockConnector {
    /// Creates a connector whose clients all use `behavior`.
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: behavior,
            stats: Arc::new(MockStats::default()),
            quit_error: None,
            reject_with: None,
            last_client: Mutex::new(None),
        }
    }

    /// Creates a connector that replays `behaviors` in order, then `fallback`.
    pub fn with_behaviors(behaviors: Vec<MockBehavior>, fallback: MockBehavior) -> Self {
        let connector = Self::new(fallback);
        lock(&connector.queue).extend(behaviors);
        connector
    }

    /// Creates a connector whose `create` always fails with a config error.
    pub fn rejecting(message: impl Into<String>) -> Self {
        Self {
            reject_with: Some(message.into()),
            ..Self::new(MockBehavior::Ready)
        }
    }

    /// Makes every client's `quit` fail with the given message.
    pub fn with_quit_error(mut self, message: impl Into<String>) -> Self {
        self.quit_error = Some(message.into());
        self
    }

    /// Shared counters.
    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }

    /// The most recently created client.
    pub fn last_client(&self) -> Option<Arc<MockClient>> {
        lock(&self.last_client).clone()
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new(MockBehavior::Ready)
    }
}

impl Connector for MockConnector {
    fn create(&self, _options: &ConnectionOptions) -> Result<Arc<dyn CacheClient>> {
        if let Some(message) = &self.reject_with {
            return Err(CacheError::config(message.clone()));
        }

        let behavior = lock(&self.queue)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        let client = Arc::new(MockClient::new(
            behavior,
            Arc::clone(&self.stats),
            self.quit_error.clone(),
        ));

        self.stats.created.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_client) = Some(Arc::clone(&client));
        Ok(client)
    }
}
