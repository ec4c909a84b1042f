//! Logging configuration for cachelink.
//!
//! Logs go to stderr by default, or to a file when one is configured so that
//! command output on stdout stays machine-readable.

use crate::config::LoggingConfig;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Initializes logging from configuration.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init(config: &LoggingConfig, force_file: bool) {
    match (&config.file, force_file) {
        (Some(path), _) => init_file_logging(path, &config.level),
        (None, true) => init_file_logging(&get_log_path(), &config.level),
        (None, false) => init_stderr_logging(&config.level),
    }
}

/// Initializes logging to a file.
///
/// Falls back to stderr if the file cannot be created.
pub fn init_file_logging(log_path: &Path, level: &str) {
    if let Some(parent) = log_path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Warning: Could not create log directory: {e}");
            init_stderr_logging(level);
            return;
        }
    }

    // Truncate on each run to avoid unbounded growth
    let log_file = match File::create(log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not create log file: {e}");
            init_stderr_logging(level);
            return;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(log_file)
        .with_ansi(false) // No ANSI colors in file output
        .init();
}

/// Initializes logging to stderr.
pub fn init_stderr_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(std::io::stderr)
        .init();
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Returns the default path for the log file.
///
/// Uses the XDG state directory on Linux (`~/.local/state/cachelink/cachelink.log`),
/// or falls back to the config directory on other platforms.
pub fn get_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join("cachelink").join("cachelink.log");
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("cachelink").join("cachelink.log");
    }

    std::env::temp_dir().join("cachelink.log")
}
