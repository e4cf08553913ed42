//! Shared utilities for Tessel: configuration, logging, error types.
//!
//! This crate provides common infrastructure used across all Tessel components.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod helpers;

pub use config::ChannelConfig;
pub use error::{Error, Result};

/// Initialize tracing to stderr.
///
/// `RUST_LOG` wins over `default_level` when set.
pub fn init_tracing_with_default(default_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
