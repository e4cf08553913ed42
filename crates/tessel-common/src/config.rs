//! Channel configuration.
//!
//! Values come from three layers, later ones winning: built-in defaults, an
//! optional JSON file, then `TESSEL_*` environment variables. The result is
//! validated before use.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

pub const ENV_ENDPOINT: &str = "TESSEL_ENDPOINT";
pub const ENV_SERVER_PUBLIC_KEY: &str = "TESSEL_SERVER_PUBLIC_KEY";
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "TESSEL_CONNECT_TIMEOUT_SECS";
pub const ENV_INBOX_CAPACITY: &str = "TESSEL_INBOX_CAPACITY";

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_INBOX_CAPACITY: usize = 64;

/// Largest Noise message on the wire.
pub const MAX_NOISE_MESSAGE: usize = 65535;

/// Smallest useful message limit: one byte of plaintext plus the tag.
const MIN_MESSAGE_SIZE: usize = 17;

/// Where to connect and which attested key to expect there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    /// WebSocket endpoint, `ws://` or `wss://`.
    pub endpoint: String,
    /// Server static X25519 key, base64 or hex, as produced by attestation.
    pub server_public_key: String,
    /// How long to wait for the transport to become ready.
    pub connect_timeout_secs: u64,
    /// Inbound messages buffered before the reader applies backpressure.
    pub inbox_capacity: usize,
    /// Upper bound on a single Noise message.
    pub max_message_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            server_public_key: String::new(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            max_message_size: MAX_NOISE_MESSAGE,
        }
    }
}

impl ChannelConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "loaded channel config");
        Self::from_json(&text)
    }

    /// Defaults or `path`, then overrides from `lookup`, then validation.
    ///
    /// Pass [`crate::helpers::env_string`] as `lookup` to read the `TESSEL_*` variables.
    pub fn load<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an arbitrary lookup, keyed by the `ENV_*` names.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            self.endpoint = endpoint;
        }
        if let Some(key) = lookup(ENV_SERVER_PUBLIC_KEY) {
            self.server_public_key = key;
        }
        if let Some(secs) = lookup(ENV_CONNECT_TIMEOUT_SECS) {
            self.connect_timeout_secs = secs.parse().map_err(|_| {
                Error::config(format!("{ENV_CONNECT_TIMEOUT_SECS} must be an integer, got {secs:?}"))
            })?;
        }
        if let Some(capacity) = lookup(ENV_INBOX_CAPACITY) {
            self.inbox_capacity = capacity.parse().map_err(|_| {
                Error::config(format!("{ENV_INBOX_CAPACITY} must be an integer, got {capacity:?}"))
            })?;
        }
        Ok(())
    }

    /// Check the values are usable. Key decoding is left to the caller,
    /// which owns the key type.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(Error::config("endpoint is required"));
        }
        if !(self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://")) {
            return Err(Error::config(format!(
                "endpoint must use ws:// or wss://, got {}",
                self.endpoint
            )));
        }
        if self.server_public_key.trim().is_empty() {
            return Err(Error::config("server_public_key is required"));
        }
        if self.connect_timeout_secs == 0 {
            return Err(Error::config("connect_timeout_secs must be greater than zero"));
        }
        if self.inbox_capacity == 0 {
            return Err(Error::config("inbox_capacity must be greater than zero"));
        }
        if !(MIN_MESSAGE_SIZE..=MAX_NOISE_MESSAGE).contains(&self.max_message_size) {
            return Err(Error::config(format!(
                "max_message_size must be between {MIN_MESSAGE_SIZE} and {MAX_NOISE_MESSAGE}"
            )));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
