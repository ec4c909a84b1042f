//! cachelink - A small lifecycle manager for a single Redis connection.
//!
//! This library exposes the core modules for use by the binary and in
//! integration tests.

pub mod cli;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
