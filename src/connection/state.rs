//! Connection lifecycle state

use serde::Serialize;
use std::fmt;

/// Lifecycle phase of a managed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No client has been created yet
    #[default]
    Uninitialized,
    /// Client created, waiting for the first ready or error signal
    Connecting,
    /// Ready signal observed and no terminal event since
    Ready,
    /// Connection attempt failed, or an established link errored
    Failed,
    /// Torn down by destroy/quit, or closed by the peer
    Disconnected,
}

impl ConnectionState {
    /// Returns the state as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Disconnected => "disconnected",
        }
    }

    /// Check if the connection is usable
    pub fn is_ready(&self) -> bool {
        *self == Self::Ready
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
