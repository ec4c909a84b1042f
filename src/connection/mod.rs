//! Connection management for cachelink.
//!
//! Owns the single cache connection and its lifecycle.

pub mod manager;
mod state;

pub use manager::ConnectionManager;
pub use state::ConnectionState;
