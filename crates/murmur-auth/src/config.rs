//! Authenticator configuration.
//!
//! Loadable from a JSON file so a node-hosting process can describe its
//! admission policy without code:
//!
//! ```json
//! {
//!   "allow": ["127.0.0.1"],
//!   "deny": [],
//!   "mechanism": { "type": "curve", "location": "/etc/murmur/certs" },
//!   "verbose": true
//! }
//! ```

use std::path::{Path, PathBuf};

use murmur_types::{MurmurError, Result};
use serde::{Deserialize, Serialize};

/// Mechanism section of [`AuthConfig`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MechanismConfig {
    /// No authentication.
    #[default]
    Open,
    /// PLAIN authentication against a password file.
    Plain {
        /// Path of the `user:hash` file.
        password_file: PathBuf,
    },
    /// CURVE authentication.
    Curve {
        /// Certificate directory, or `"*"` to accept any key.
        location: String,
    },
    /// External identity layer.
    External,
}

/// Admission policy configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Addresses on the allow list. When non-empty, every other address
    /// is rejected.
    pub allow: Vec<String>,

    /// Addresses on the deny list. Ignored when `allow` is non-empty.
    pub deny: Vec<String>,

    /// Authentication mechanism.
    pub mechanism: MechanismConfig,

    /// Log every decision at `info` level.
    pub verbose: bool,
}

impl AuthConfig {
    /// Validates all fields.
    ///
    /// # Errors
    ///
    /// [`MurmurError::ConfigError`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.allow.iter().chain(&self.deny).any(|a| a.trim().is_empty()) {
            return Err(MurmurError::ConfigError {
                reason: "address lists must not contain empty entries".into(),
            });
        }
        match &self.mechanism {
            MechanismConfig::Plain { password_file } if password_file.as_os_str().is_empty() => {
                Err(MurmurError::ConfigError {
                    reason: "plain mechanism requires password_file".into(),
                })
            }
            MechanismConfig::Curve { location } if location.trim().is_empty() => {
                Err(MurmurError::ConfigError {
                    reason: "curve mechanism requires location".into(),
                })
            }
            _ => Ok(()),
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
