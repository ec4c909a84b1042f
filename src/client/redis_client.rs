//! Redis client implementation.
//!
//! Provides the `RedisClient` struct that implements the `CacheClient` trait
//! on top of a multiplexed tokio connection from the `redis` crate.

use crate::client::{lock, CacheClient, ClientEvent, Connector, EventSender};
use crate::config::ConnectionOptions;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{RedisError, RedisResult};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Builds `RedisClient`s from connection options.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisConnector;

impl Connector for RedisConnector {
    fn create(&self, options: &ConnectionOptions) -> Result<Arc<dyn CacheClient>> {
        Ok(Arc::new(RedisClient::open(options)?))
    }
}

/// The established link and the channel its lifecycle is reported on.
///
/// Shared with the background connect/health-check task.
#[derive(Default)]
struct Link {
    conn: Mutex<Option<MultiplexedConnection>>,
    events: Mutex<Option<EventSender>>,
}

impl Link {
    fn current(&self) -> Option<MultiplexedConnection> {
        lock(&self.conn).clone()
    }

    fn emit(&self, event: ClientEvent) {
        if let Some(events) = lock(&self.events).as_ref() {
            // The manager may have stopped listening already.
            let _ = events.send(event);
        }
    }

    /// Drops a dead link and reports it once.
    fn lost(&self, message: String) {
        if lock(&self.conn).take().is_some() {
            warn!("Redis link lost: {}", message);
            self.emit(ClientEvent::Error(message));
        }
    }

    /// Reports `End` and stops reporting anything further.
    fn ended(&self) {
        if let Some(events) = lock(&self.events).take() {
            let _ = events.send(ClientEvent::End);
        }
    }
}

/// Redis client holding at most one multiplexed link.
pub struct RedisClient {
    client: redis::Client,
    client_name: Option<String>,
    connect_timeout: Option<Duration>,
    response_timeout: Option<Duration>,
    health_check_interval: Option<Duration>,
    link: Arc<Link>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl RedisClient {
    /// Creates a client without connecting.
    ///
    /// Fails only when the options cannot be turned into a valid Redis URL.
    pub fn open(options: &ConnectionOptions) -> Result<Self> {
        let url = options.to_url()?;
        let client = redis::Client::open(url.as_str())
            .map_err(|e| CacheError::config(format!("Invalid connection options: {e}")))?;

        Ok(Self {
            client,
            client_name: options.client_name.clone(),
            connect_timeout: options.connect_timeout(),
            response_timeout: options.response_timeout(),
            health_check_interval: options.health_check_interval(),
            link: Arc::new(Link::default()),
            pending: Mutex::new(None),
        })
    }

    fn current_link(&self) -> Result<MultiplexedConnection> {
        self.link
            .current()
            .ok_or_else(|| CacheError::connection("Redis link is not established"))
    }

    fn abort_pending(&self) {
        if let Some(handle) = lock(&self.pending).take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl CacheClient for RedisClient {
    fn connect(&self, events: EventSender) {
        *lock(&self.link.events) = Some(events);

        let client = self.client.clone();
        let link = Arc::clone(&self.link);
        let client_name = self.client_name.clone();
        let connect_timeout = self.connect_timeout;
        let response_timeout = self.response_timeout;
        let health_check_interval = self.health_check_interval;

        let handle = tokio::spawn(async move {
            match establish(
                &client,
                connect_timeout,
                response_timeout,
                client_name.as_deref(),
            )
            .await
            {
                Ok(conn) => {
                    *lock(&link.conn) = Some(conn);
                    link.emit(ClientEvent::Ready);
                }
                Err(message) => {
                    link.emit(ClientEvent::Error(message));
                    return;
                }
            }

            if let Some(interval) = health_check_interval {
                watch_link(&link, interval, response_timeout).await;
            }
        });

        if let Some(previous) = lock(&self.pending).replace(handle) {
            previous.abort();
        }
    }

    async fn ping(&self) -> Result<String> {
        let mut conn = self.current_link()?;
        let reply: RedisResult<String> =
            bounded(self.response_timeout, redis::cmd("PING").query_async(&mut conn))
                .await
                .map_err(|limit| {
                    CacheError::connection(format!("PING timed out after {limit:?}"))
                })?;

        reply.map_err(|e| {
            if is_link_fatal(&e) {
                self.link.lost(e.to_string());
            }
            CacheError::connection(e.to_string())
        })
    }

    fn disconnect(&self) {
        self.abort_pending();
        if lock(&self.link.conn).take().is_some() {
            debug!("Dropped Redis link");
        }
        lock(&self.link.events).take();
    }

    async fn quit(&self) -> Result<()> {
        self.abort_pending();
        let Some(mut conn) = lock(&self.link.conn).take() else {
            return Ok(());
        };

        let reply: RedisResult<()> =
            bounded(self.response_timeout, redis::cmd("QUIT").query_async(&mut conn))
                .await
                .map_err(|limit| {
                    CacheError::connection(format!("QUIT timed out after {limit:?}"))
                })?;
        self.link.ended();

        match reply {
            Ok(()) => Ok(()),
            // The server may close the socket before the OK reaches us.
            Err(e) if e.is_connection_dropped() => Ok(()),
            Err(e) => Err(CacheError::connection(format!("QUIT failed: {e}"))),
        }
    }
}

impl Drop for RedisClient {
    fn drop(&mut self) {
        self.abort_pending();
    }
}

/// True when the error means the link itself is gone rather than one command failing.
fn is_link_fatal(error: &RedisError) -> bool {
    error.is_io_error() || error.is_connection_dropped()
}

/// Pings the link on a fixed interval until it fails or is taken away.
async fn watch_link(link: &Link, interval: Duration, response_timeout: Option<Duration>) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(mut conn) = link.current() else {
            return;
        };

        let reply: std::result::Result<RedisResult<String>, Duration> =
            bounded(response_timeout, redis::cmd("PING").query_async(&mut conn)).await;
        match reply {
            Ok(Ok(_)) => {}
            Ok(Err(e)) if is_link_fatal(&e) => {
                link.lost(e.to_string());
                return;
            }
            Ok(Err(e)) => debug!("Health check PING failed: {}", e),
            Err(limit) => {
                link.lost(format!("Health check timed out after {limit:?}"));
                return;
            }
        }
    }
}

async fn establish(
    client: &redis::Client,
    connect_timeout: Option<Duration>,
    response_timeout: Option<Duration>,
    client_name: Option<&str>,
) -> std::result::Result<MultiplexedConnection, String> {
    let outcome = bounded(connect_timeout, client.get_multiplexed_async_connection())
        .await
        .map_err(|limit| format!("Connect timed out after {limit:?}"))?;
    let mut conn = outcome.map_err(|e| e.to_string())?;

    if let Some(name) = client_name {
        let reply: RedisResult<()> = bounded(
            response_timeout,
            redis::cmd("CLIENT").arg("SETNAME").arg(name).query_async(&mut conn),
        )
        .await
        .map_err(|limit| format!("Reply timed out after {limit:?}"))?;
        reply.map_err(|e| e.to_string())?;
        debug!("Announced client name '{}'", name);
    }

    Ok(conn)
}

/// Awaits `request`, failing with the limit if it elapses first.
async fn bounded<T, F>(
    limit: Option<Duration>,
    request: F,
) -> std::result::Result<RedisResult<T>, Duration>
where
    F: Future<Output = RedisResult<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, request)
            .await
            .map_err(|_| limit),
        None => Ok(request.await),
    }
}
