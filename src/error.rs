//! Error types for cachelink.
//!
//! Defines the main error enum used throughout the crate.

use thiserror::Error;

/// Main error type for cachelink operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Connection establishment errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Lifecycle misuse (client requested before ready, re-init while live, etc.)
    #[error("State error: {0}")]
    State(String),

    /// Configuration errors (invalid config file, bad connection URL, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a state error with the given message.
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::State(_) => "State Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns true for connection establishment failures.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns true for lifecycle misuse.
    pub fn is_state(&self) -> bool {
        matches!(self, Self::State(_))
    }
}

/// Result type alias using CacheError.
pub type Result<T> = std::result::Result<T, CacheError>;
