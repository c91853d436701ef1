//! Configuration resolution for the pairlink relay.
//!
//! Values are layered, lowest priority first:
//! 1. Built-in defaults
//! 2. JSON config file (`--config`)
//! 3. Environment variables / CLI arguments, applied by the binary

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Complete relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayConfig {
    pub listen_addr: SocketAddr,
    /// How long a fresh connection may stay silent before its hello.
    pub hello_timeout_secs: u64,
    /// Idle time after which a session is reclaimed.
    pub session_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// Outbound frames buffered per connection before relays into it are dropped.
    pub peer_queue_capacity: usize,
    /// Prefix for the `phoneUrl` handed out on session creation. Empty
    /// yields a relative URL.
    pub public_base_url: String,
    /// Answer CORS preflights for any origin.
    pub allow_any_origin: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            hello_timeout_secs: 10,
            session_ttl_secs: 10 * 60,
            sweep_interval_secs: 60,
            peer_queue_capacity: 64,
            public_base_url: String::new(),
            allow_any_origin: false,
        }
    }
}

impl RelayConfig {
    /// Load a config file on top of the defaults. Keys absent from the file
    /// keep their default value.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, or the file at `path` when one is given.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// Reject values that would disable a timeout or the outbound queue.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("helloTimeoutSecs", self.hello_timeout_secs == 0),
            ("sessionTtlSecs", self.session_ttl_secs == 0),
            ("sweepIntervalSecs", self.sweep_interval_secs == 0),
            ("peerQueueCapacity", self.peer_queue_capacity == 0),
        ];
        match checks.iter().find(|(_, zero)| *zero) {
            Some((name, _)) => Err(Error::Config(format!("{name} must be greater than zero"))),
            None => Ok(()),
        }
    }

    pub const fn hello_timeout(&self) -> Duration {
        Duration::from_secs(self.hello_timeout_secs)
    }

    pub const fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// The link a phone follows to join `session_id`.
    pub fn phone_url(&self, session_id: &str, token: &str) -> String {
        let base = self.public_base_url.trim_end_matches('/');
        format!("{base}/m/{session_id}?token={token}")
    }
}
