//! Configuration for a lobby session
//!
//! Everything has a sensible default; a JSON file can override any subset
//! of fields.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LobbyResult;

/// Default account API endpoint
pub const DEFAULT_API_ENDPOINT: &str = "https://runfission.net";

/// Default domain under which `_did.<username>` TXT records live
pub const DEFAULT_DATA_ROOT_DOMAIN: &str = "fissionuser.net";

/// Default lifetime of issued capability tokens (30 days)
pub const DEFAULT_UCAN_LIFETIME_SECS: u64 = 60 * 60 * 24 * 30;

/// Heartbeat (PING) settings for the initiating side of a handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Interval between PING frames in milliseconds
    pub interval_ms: u64,
    /// Give up after this many milliseconds without a PONG.
    /// `None` keeps pinging until a PONG arrives or the channel is closed.
    pub timeout_ms: Option<u64>,
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Same interval, bounded by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            timeout_ms: None,
        }
    }
}

/// Session-wide configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    /// Account API endpoint handed to the account service
    pub api_endpoint: String,
    /// Domain suffix for identity directory lookups
    pub data_root_domain: String,
    /// Heartbeat settings
    pub heartbeat: HeartbeatConfig,
    /// Lifetime of tokens issued by `link_app`
    pub ucan_lifetime_secs: u64,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            data_root_domain: DEFAULT_DATA_ROOT_DOMAIN.to_string(),
            heartbeat: HeartbeatConfig::default(),
            ucan_lifetime_secs: DEFAULT_UCAN_LIFETIME_SECS,
        }
    }
}

impl LobbyConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> LobbyResult<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}
