//! Network configuration
//!
//! Stored as JSON. Every field is optional; missing fields take the defaults
//! below.
//!
//! # Example
//!
//! ```
//! use nostr_network::NetworkConfig;
//!
//! let config = NetworkConfig::from_json_str(r#"{"relay_limit": 5}"#).unwrap();
//! assert_eq!(config.relay_limit, 5);
//! assert_eq!(config.relay_redundancy, 3);
//! ```

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Network engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Multiplexing proxy fronting many relays over one socket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplexer_url: Option<String>,

    /// When non-empty, every request goes to exactly these relays
    #[serde(default)]
    pub force_relays: Vec<String>,

    /// Relays asked for COUNT requests
    #[serde(default)]
    pub count_relays: Vec<String>,

    /// Relays supporting NIP-50 search
    #[serde(default)]
    pub search_relays: Vec<String>,

    /// General purpose read relays
    #[serde(default)]
    pub read_relays: Vec<String>,

    /// Used for routing when nothing better is known
    #[serde(default)]
    pub fallback_relays: Vec<String>,

    /// Authors used when a scoped filter resolves to nobody
    #[serde(default)]
    pub default_follows: Vec<String>,

    /// Maximum relays per planned query
    #[serde(default = "default_relay_limit")]
    pub relay_limit: usize,

    /// Top relays that absorb the filters of dropped relays
    #[serde(default = "default_relay_redundancy")]
    pub relay_redundancy: usize,

    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,

    #[serde(default = "default_count_timeout_ms")]
    pub count_timeout_ms: u64,

    /// How long gated relays may hold back traffic
    #[serde(default = "default_boot_grace_ms")]
    pub boot_grace_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_relay_limit() -> usize {
    10
}

fn default_relay_redundancy() -> usize {
    3
}

fn default_publish_timeout_ms() -> u64 {
    3000
}

fn default_count_timeout_ms() -> u64 {
    3000
}

fn default_boot_grace_ms() -> u64 {
    2000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            multiplexer_url: None,
            force_relays: Vec::new(),
            count_relays: Vec::new(),
            search_relays: Vec::new(),
            read_relays: Vec::new(),
            fallback_relays: Vec::new(),
            default_follows: Vec::new(),
            relay_limit: default_relay_limit(),
            relay_redundancy: default_relay_redundancy(),
            publish_timeout_ms: default_publish_timeout_ms(),
            count_timeout_ms: default_count_timeout_ms(),
            boot_grace_ms: default_boot_grace_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl NetworkConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ClientError::Config(e.to_string()))
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn count_timeout(&self) -> Duration {
        Duration::from_millis(self.count_timeout_ms)
    }

    pub fn boot_grace(&self) -> Duration {
        Duration::from_millis(self.boot_grace_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Load configuration from a JSON file.
pub fn load_config(path: impl AsRef<Path>) -> Result<NetworkConfig> {
    let contents = std::fs::read_to_string(path)?;
    NetworkConfig::from_json_str(&contents)
}
