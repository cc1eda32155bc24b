//! Node configuration.
//!
//! ```json
//! {
//!   "name": "relay-1",
//!   "host": "10.0.0.5",
//!   "port": 5670,
//!   "headers": { "X-Role": "relay" },
//!   "verbose": false,
//!   "evasive_timeout_ms": 5000,
//!   "silent_timeout_ms": 5000,
//!   "expired_timeout_ms": 30000,
//!   "interval_ms": 1000,
//!   "advertised_endpoint": "tcp://relay.example.net:5670"
//! }
//! ```
//!
//! Every field is optional.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use murmur_types::{MurmurError, Result};
use serde::{Deserialize, Serialize};

use crate::transport::PeerTimeouts;

/// Default host a node advertises.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Per-node configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Display name. Defaults to the first six characters of the UUID.
    pub name: Option<String>,

    /// Host advertised to peers and checked by their allow/deny lists.
    pub host: String,

    /// Advertised port. `0` gives an in-process endpoint.
    pub port: u16,

    /// Headers sent with the node's ENTER announcement.
    pub headers: BTreeMap<String, String>,

    /// Log every occurrence the node receives at `info` level.
    pub verbose: bool,

    /// Quiet time before a peer is reported EVASIVE.
    pub evasive_timeout_ms: u64,

    /// Quiet time before a peer is reported SILENT.
    pub silent_timeout_ms: u64,

    /// Quiet time before a peer is dropped with EXIT.
    pub expired_timeout_ms: u64,

    /// How often peers are checked.
    pub interval_ms: u64,

    /// Endpoint announced to peers instead of the one derived from
    /// `host` and `port`.
    pub advertised_endpoint: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let defaults = PeerTimeouts::default();
        Self {
            name: None,
            host: DEFAULT_HOST.to_string(),
            port: 0,
            headers: BTreeMap::new(),
            verbose: false,
            evasive_timeout_ms: millis(defaults.evasive),
            silent_timeout_ms: millis(defaults.silent),
            expired_timeout_ms: millis(defaults.expired),
            interval_ms: millis(defaults.interval),
            advertised_endpoint: None,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl NodeConfig {
    /// Creates a default configuration with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Validates all fields.
    ///
    /// # Errors
    ///
    /// [`MurmurError::ConfigError`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(MurmurError::ConfigError {
                    reason: "name must not be blank".into(),
                });
            }
        }
        if self.host.trim().is_empty() {
            return Err(MurmurError::ConfigError {
                reason: "host must not be empty".into(),
            });
        }
        if self.host.contains(char::is_whitespace) || self.host.contains('/') {
            return Err(MurmurError::ConfigError {
                reason: format!("host {:?} is not a bare host name", self.host),
            });
        }
        if let Some(key) = self.headers.keys().find(|k| k.trim().is_empty()) {
            return Err(MurmurError::ConfigError {
                reason: format!("header name {key:?} is blank"),
            });
        }
        for (field, value) in [
            ("evasive_timeout_ms", self.evasive_timeout_ms),
            ("silent_timeout_ms", self.silent_timeout_ms),
            ("expired_timeout_ms", self.expired_timeout_ms),
            ("interval_ms", self.interval_ms),
        ] {
            if value == 0 {
                return Err(MurmurError::ConfigError {
                    reason: format!("{field} must be greater than zero"),
                });
            }
        }
        if self.evasive_timeout_ms > self.expired_timeout_ms
            || self.silent_timeout_ms > self.expired_timeout_ms
        {
            return Err(MurmurError::ConfigError {
                reason: format!(
                    "expired_timeout_ms ({}) must not be shorter than the evasive ({}) or silent ({}) timeout",
                    self.expired_timeout_ms, self.evasive_timeout_ms, self.silent_timeout_ms
                ),
            });
        }
        if let Some(endpoint) = &self.advertised_endpoint {
            let valid = endpoint
                .split_once("://")
                .is_some_and(|(scheme, rest)| !scheme.is_empty() && !rest.is_empty())
                && !endpoint.contains(char::is_whitespace);
            if !valid {
                return Err(MurmurError::ConfigError {
                    reason: format!("advertised_endpoint {endpoint:?} is not `scheme://address`"),
                });
            }
        }
        Ok(())
    }

    /// Peer timeouts as durations.
    pub fn timeouts(&self) -> PeerTimeouts {
        PeerTimeouts {
            evasive: Duration::from_millis(self.evasive_timeout_ms),
            silent: Duration::from_millis(self.silent_timeout_ms),
            expired: Duration::from_millis(self.expired_timeout_ms),
            interval: Duration::from_millis(self.interval_ms),
        }
    }

    /// Loads and validates configuration from a JSON file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| MurmurError::ConfigError {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|e| MurmurError::ConfigError {
            reason: format!("failed to parse {}: {e}", path.display()),
        })?;
        config.validate()?;
        Ok(config)
    }
}
