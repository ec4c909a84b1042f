//! Configuration management for cachelink.
//!
//! Handles loading configuration from TOML files and environment variables,
//! with support for named connections and logging settings.

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::net::Ipv6Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

/// Default Redis port.
pub const DEFAULT_PORT: u16 = 6379;

/// Main configuration structure for cachelink.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Named connections.
    #[serde(default)]
    pub connections: HashMap<String, ConnectionOptions>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter level when `RUST_LOG` is not set.
    #[serde(default = "default_level")]
    pub level: String,

    /// Write logs to this file instead of stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
        }
    }
}

/// Options used to construct the underlying cache client.
///
/// Immutable once handed to a `ConnectionManager`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Server host.
    pub host: Option<String>,

    /// Server port. `None` means the default port.
    pub port: Option<u16>,

    /// ACL username (Redis 6+).
    pub username: Option<String>,

    /// Password (not recommended to store in config).
    pub password: Option<String>,

    /// Logical database index.
    pub db: Option<u32>,

    /// Connect over TLS (`rediss://`).
    #[serde(default)]
    pub tls: bool,

    /// Upper bound on establishing the TCP link, in milliseconds.
    pub connect_timeout_ms: Option<u64>,

    /// Upper bound on a single reply, in milliseconds.
    pub response_timeout_ms: Option<u64>,

    /// Name announced with `CLIENT SETNAME` once connected.
    pub client_name: Option<String>,

    /// Background PING interval once connected, in milliseconds.
    pub health_check_interval_ms: Option<u64>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            username: None,
            password: None,
            db: None,
            tls: false,
            connect_timeout_ms: None,
            response_timeout_ms: None,
            client_name: None,
            health_check_interval_ms: None,
        }
    }
}

impl ConnectionOptions {
    /// Creates connection options from a connection URL.
    ///
    /// Format: `redis://[user[:pass]@]host[:port][/db]`, or `rediss://` for TLS.
    pub fn from_url(conn_str: &str) -> Result<Self> {
        let url = Url::parse(conn_str)
            .map_err(|e| CacheError::config(format!("Invalid connection URL: {e}")))?;

        let tls = match url.scheme() {
            "redis" => false,
            "rediss" => true,
            other => {
                return Err(CacheError::config(format!(
                    "Invalid scheme '{other}'. Expected 'redis' or 'rediss'"
                )))
            }
        };

        let host = url.host_str().map(String::from);
        let port = url.port();
        let username = if url.username().is_empty() {
            None
        } else {
            Some(url.username().to_string())
        };
        let password = url.password().map(String::from);

        let db = match url.path().trim_start_matches('/') {
            "" => None,
            segment => Some(segment.parse::<u32>().map_err(|_| {
                CacheError::config(format!("Invalid database index '{segment}'"))
            })?),
        };

        Ok(Self {
            host,
            port,
            username,
            password,
            db,
            tls,
            ..Default::default()
        })
    }

    /// Converts the options to a connection URL understood by the client library.
    pub fn to_url(&self) -> Result<String> {
        let scheme = if self.tls { "rediss" } else { "redis" };
        let host = self.host.as_deref().unwrap_or("localhost");
        let db = self.db.unwrap_or(0);

        let mut url = Url::parse(&format!(
            "{scheme}://{}:{}/{db}",
            bracket_ipv6(host),
            self.port()
        ))
        .map_err(|e| CacheError::config(format!("Invalid host '{host}': {e}")))?;

        if let Some(username) = &self.username {
            url.set_username(username)
                .map_err(|_| CacheError::config("Username cannot be set for this host"))?;
        }
        if let Some(password) = &self.password {
            url.set_password(Some(password))
                .map_err(|_| CacheError::config("Password cannot be set for this host"))?;
        }

        Ok(url.into())
    }

    /// Merges another options record into this one, with the other taking precedence.
    pub fn merge(&mut self, other: &ConnectionOptions) {
        if other.host.is_some() {
            self.host = other.host.clone();
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.username.is_some() {
            self.username = other.username.clone();
        }
        if other.password.is_some() {
            self.password = other.password.clone();
        }
        if other.db.is_some() {
            self.db = other.db;
        }
        if other.tls {
            self.tls = true;
        }
        if other.connect_timeout_ms.is_some() {
            self.connect_timeout_ms = other.connect_timeout_ms;
        }
        if other.response_timeout_ms.is_some() {
            self.response_timeout_ms = other.response_timeout_ms;
        }
        if other.client_name.is_some() {
            self.client_name = other.client_name.clone();
        }
        if other.health_check_interval_ms.is_some() {
            self.health_check_interval_ms = other.health_check_interval_ms;
        }
    }

    /// Applies environment variables (REDIS_HOST, REDIS_PORT, etc.) as defaults.
    pub fn apply_env_defaults(&mut self) {
        if self.host.is_none() {
            self.host = std::env::var("REDIS_HOST").ok();
        }
        if self.port.is_none() {
            self.port = std::env::var("REDIS_PORT").ok().and_then(|v| v.parse().ok());
        }
        if self.username.is_none() {
            self.username = std::env::var("REDIS_USERNAME").ok();
        }
        if self.password.is_none() {
            self.password = std::env::var("REDIS_PASSWORD").ok();
        }
        if self.db.is_none() {
            self.db = std::env::var("REDIS_DB").ok().and_then(|v| v.parse().ok());
        }
    }

    /// Port to connect to.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Connect timeout as a duration, if configured.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// Response timeout as a duration, if configured.
    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_ms.map(Duration::from_millis)
    }

    /// Health-check interval as a duration, if configured.
    pub fn health_check_interval(&self) -> Option<Duration> {
        self.health_check_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Returns a display-safe string (no password) for logs and output.
    pub fn display_string(&self) -> String {
        let host = self.host.as_deref().unwrap_or("localhost");
        let db = self.db.unwrap_or(0);
        let tls = if self.tls { " (tls)" } else { "" };
        format!("{}:{}/{db}{tls}", bracket_ipv6(host), self.port())
    }
}

/// Wraps a bare IPv6 literal in brackets so it can sit in a URL authority.
fn bracket_ipv6(host: &str) -> Cow<'_, str> {
    if host.parse::<Ipv6Addr>().is_ok() {
        Cow::Owned(format!("[{host}]"))
    } else {
        Cow::Borrowed(host)
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cachelink")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    ///
    /// A missing file yields the default configuration.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| CacheError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            CacheError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Gets a named connection, or the default connection if name is None.
    pub fn get_connection(&self, name: Option<&str>) -> Option<&ConnectionOptions> {
        let key = name.unwrap_or("default");
        self.connections.get(key)
    }
}
