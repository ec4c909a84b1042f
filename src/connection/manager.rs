//! Connection manager for the cache client lifecycle.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::state::ConnectionState;
use crate::client::{lock, CacheClient, ClientEvent, Connector, RedisConnector};
use crate::config::ConnectionOptions;
use crate::error::{CacheError, Result};

/// Lifecycle state shared with the event watcher.
///
/// `epoch` identifies the current client; events tagged with an older epoch
/// come from a handle that has since been torn down and are ignored.
#[derive(Debug, Default)]
struct Lifecycle {
    state: ConnectionState,
    epoch: u64,
}

/// Manages a single cache connection.
///
/// Created from immutable options; the client itself only exists between
/// `initialize` and `destroy`/`quit`.
pub struct ConnectionManager {
    options: ConnectionOptions,
    connector: Arc<dyn Connector>,
    client: Option<Arc<dyn CacheClient>>,
    lifecycle: Arc<Mutex<Lifecycle>>,
    watcher: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Creates a manager that connects through the Redis client library.
    pub fn new(options: ConnectionOptions) -> Self {
        Self::with_connector(options, Arc::new(RedisConnector))
    }

    /// Creates a manager that builds clients with the given connector.
    pub fn with_connector(options: ConnectionOptions, connector: Arc<dyn Connector>) -> Self {
        Self {
            options,
            connector,
            client: None,
            lifecycle: Arc::new(Mutex::new(Lifecycle::default())),
            watcher: None,
        }
    }

    /// Creates the client and waits for its first ready or error signal.
    ///
    /// Rejected with a state error while already connected. A handle left over
    /// from a failed or abandoned attempt is force-closed first. No timeout is
    /// applied here; wrap the call in `tokio::time::timeout` to bound it.
    pub async fn initialize(&mut self) -> Result<()> {
        let current = self.state();
        if current.is_ready() {
            return Err(CacheError::state(format!(
                "Already connected to {}; quit or destroy before re-initializing",
                self.options.display_string()
            )));
        }

        let client = self.connector.create(&self.options)?;

        self.stop_watcher();
        if let Some(stale) = self.client.take() {
            debug!("Closing stale client left in state {}", current);
            stale.disconnect();
        }

        let epoch = {
            let mut lifecycle = lock(&self.lifecycle);
            lifecycle.epoch += 1;
            lifecycle.state = ConnectionState::Connecting;
            lifecycle.epoch
        };
        info!("Connecting to {}", self.options.display_string());

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (settle_tx, settle_rx) = oneshot::channel();
        self.watcher = Some(tokio::spawn(watch_events(
            events_rx,
            settle_tx,
            Arc::clone(&self.lifecycle),
            epoch,
        )));

        client.connect(events_tx);
        self.client = Some(client);

        match settle_rx.await {
            Ok(Ok(())) => {
                info!("Connected to {}", self.options.display_string());
                Ok(())
            }
            Ok(Err(message)) => {
                warn!(
                    "Connection to {} failed: {}",
                    self.options.display_string(),
                    message
                );
                Err(CacheError::connection(message))
            }
            Err(_) => {
                self.transition(epoch, ConnectionState::Failed);
                Err(CacheError::internal(
                    "Connection watcher stopped before the attempt settled",
                ))
            }
        }
    }

    /// Drops the connection immediately without draining in-flight commands.
    ///
    /// Does not wait for the close to complete. Safe to call in any state,
    /// including before `initialize`.
    pub fn destroy(&mut self) {
        info!("Disconnecting cache client");
        self.retire();

        match self.client.take() {
            Some(client) => client.disconnect(),
            None => debug!("destroy called without a client; nothing to close"),
        }
    }

    /// Requests a graceful shutdown and returns without waiting for it.
    ///
    /// Pending replies are delivered before the link closes. A failure of the
    /// background close is logged. Safe to call in any state.
    pub fn quit(&mut self) {
        self.retire();

        let Some(client) = self.client.take() else {
            debug!("quit called without a client; nothing to close");
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = client.quit().await {
                        warn!("Graceful quit failed: {}", e);
                    }
                });
            }
            Err(_) => {
                warn!("No async runtime available for graceful quit; disconnecting instead");
                client.disconnect();
            }
        }
    }

    /// Gracefully closes the connection and waits for the close to finish.
    ///
    /// Unlike `quit`, errors from the underlying close are returned.
    pub async fn close(&mut self) -> Result<()> {
        self.retire();

        if let Some(client) = self.client.take() {
            client.quit().await?;
            info!("Closed connection to {}", self.options.display_string());
        }
        Ok(())
    }

    /// Check if the last observed signal was ready.
    ///
    /// Reads the tracked state only; the server is not contacted.
    pub fn is_connected(&self) -> bool {
        self.state().is_ready() && self.client.is_some()
    }

    /// Get the client handle.
    ///
    /// Fails with a state error unless the connection is ready.
    pub fn get_client(&self) -> Result<Arc<dyn CacheClient>> {
        match (self.state(), &self.client) {
            (ConnectionState::Ready, Some(client)) => Ok(Arc::clone(client)),
            (state, _) => Err(CacheError::state(format!(
                "Cache client is not available while {state}"
            ))),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        lock(&self.lifecycle).state
    }

    /// Options the manager was created with.
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Moves to `Disconnected` and invalidates events from the current client.
    fn retire(&mut self) {
        {
            let mut lifecycle = lock(&self.lifecycle);
            lifecycle.epoch += 1;
            lifecycle.state = ConnectionState::Disconnected;
        }
        self.stop_watcher();
    }

    fn transition(&self, epoch: u64, state: ConnectionState) {
        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.epoch == epoch {
            lifecycle.state = state;
        }
    }

    fn stop_watcher(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.stop_watcher();
    }
}

/// Applies client events to the shared lifecycle.
///
/// The first ready/error/end event settles the pending `initialize`; the
/// sender is consumed so later events can never settle it again.
async fn watch_events(
    mut events: mpsc::UnboundedReceiver<ClientEvent>,
    settle: oneshot::Sender<std::result::Result<(), String>>,
    shared: Arc<Mutex<Lifecycle>>,
    epoch: u64,
) {
    let mut settle = Some(settle);

    while let Some(event) = events.recv().await {
        let mut lifecycle = lock(&shared);
        if lifecycle.epoch != epoch {
            debug!("Ignoring {:?} from a superseded client", event);
            return;
        }

        match (settle.take(), event) {
            (Some(tx), ClientEvent::Ready) => {
                lifecycle.state = ConnectionState::Ready;
                let _ = tx.send(Ok(()));
            }
            (Some(tx), ClientEvent::Error(message)) => {
                lifecycle.state = ConnectionState::Failed;
                let _ = tx.send(Err(message));
            }
            (Some(tx), ClientEvent::End) => {
                lifecycle.state = ConnectionState::Failed;
                let _ = tx.send(Err("Connection closed before it became ready".to_string()));
            }
            (None, ClientEvent::Ready) => {
                debug!("Ignoring ready signal after the attempt settled");
            }
            (None, ClientEvent::Error(message)) if lifecycle.state.is_ready() => {
                warn!("Cache connection failed: {}", message);
                lifecycle.state = ConnectionState::Failed;
            }
            (None, ClientEvent::End) if lifecycle.state.is_ready() => {
                info!("Cache connection closed by peer");
                lifecycle.state = ConnectionState::Disconnected;
            }
            (None, event) => {
                debug!("Ignoring {:?} in state {}", event, lifecycle.state);
            }
        }
    }

    if let Some(tx) = settle {
        let mut lifecycle = lock(&shared);
        if lifecycle.epoch == epoch {
            lifecycle.state = ConnectionState::Failed;
        }
        let _ = tx.send(Err(
            "Client closed its event channel before signalling readiness".to_string(),
        ));
    }
}
