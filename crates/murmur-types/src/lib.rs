//! Core shared types for the murmur group-messaging workspace.
//!
//! Every crate in the workspace reports failures through
//! [`MurmurError`] and identifies peers with [`PeerUuid`]. Header
//! conventions shared by nodes and events live in [`headers`].

pub mod headers;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use headers::Headers;

// ---------------------------------------------------------------------------
// PeerUuid
// ---------------------------------------------------------------------------

/// Stable 128-bit identifier of a peer for its network lifetime.
///
/// Rendered as 32 upper-case hex characters without hyphens, which is
/// the form peers announce on the wire. Parsing also accepts the
/// hyphenated form and lower-case input.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerUuid(Uuid);

impl PeerUuid {
    /// The fixed byte length of a peer identifier.
    pub const LEN: usize = 16;

    /// Generates a fresh random (version 4) identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a `PeerUuid` from raw bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Returns the first `n` characters of the textual form.
    ///
    /// Used to derive default display names for nodes and peers.
    pub fn short(&self, n: usize) -> String {
        let text = self.to_string();
        text.chars().take(n).collect()
    }
}

impl From<Uuid> for PeerUuid {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for PeerUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0.as_bytes()))
    }
}

impl FromStr for PeerUuid {
    type Err = MurmurError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| *c != '-').collect();
        let bytes = hex::decode(&compact).map_err(|e| MurmurError::InvalidPeerUuid {
            reason: format!("'{s}' is not hex: {e}"),
        })?;
        if bytes.len() != Self::LEN {
            return Err(MurmurError::InvalidPeerUuid {
                reason: format!("expected {} bytes, got {}", Self::LEN, bytes.len()),
            });
        }
        let mut arr = [0u8; 16];
        arr.copy_from_slice(&bytes);
        Ok(Self::from_bytes(arr))
    }
}

// ---------------------------------------------------------------------------
// MurmurError
// ---------------------------------------------------------------------------

/// Unified error type for the murmur workspace.
///
/// Negative outcomes that are part of normal control flow (a missing
/// certificate, an expired wait, a rejected connection) are NOT errors
/// and are reported through `Option` or a decision value instead.
#[derive(Debug, Error)]
pub enum MurmurError {
    /// A raw key did not have the required length.
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Required length in bytes (or characters for armored keys).
        expected: usize,
        /// Length that was supplied.
        actual: usize,
    },

    /// A persisted or armored certificate could not be parsed.
    #[error("malformed certificate: {reason}")]
    MalformedCertificate {
        /// Description of the format violation.
        reason: String,
    },

    /// The operation needs a secret key but the certificate is public-only.
    #[error("certificate has no secret key")]
    NoSecretKey,

    /// Text could not be parsed as a peer identifier.
    #[error("invalid peer uuid: {reason}")]
    InvalidPeerUuid {
        /// Description of the failure.
        reason: String,
    },

    /// A cryptographic primitive failed or was given bad parameters.
    #[error("crypto error: {reason}")]
    CryptoError {
        /// Description of the failure.
        reason: String,
    },

    /// The certificate store directory could not be created or read.
    #[error("certificate store unavailable: {reason}")]
    StoreUnavailable {
        /// Description of the failure.
        reason: String,
    },

    /// An event type tag has no corresponding variant.
    #[error("unknown event type: {name}")]
    UnknownEventType {
        /// The tag as supplied.
        name: String,
    },

    /// A field required by the event variant was absent.
    #[error("missing required field :{field}")]
    MissingRequiredField {
        /// Name of the first missing field.
        field: String,
    },

    /// The password file could not be read or contained a bad line.
    #[error("malformed password file: {reason}")]
    MalformedPasswordFile {
        /// Description of the failure.
        reason: String,
    },

    /// The node was stopped or torn down while receiving.
    #[error("node hung up")]
    HangUp,

    /// Configuration failed validation or could not be loaded.
    #[error("config error: {reason}")]
    ConfigError {
        /// Description of the failure.
        reason: String,
    },

    /// A node or transport operation failed.
    #[error("network error: {reason}")]
    NetworkError {
        /// Description of the failure.
        reason: String,
    },

    /// A filesystem read or write failed.
    #[error("storage error: {reason}")]
    StorageError {
        /// Description of the failure.
        reason: String,
    },
}

/// Convenience result type using [`MurmurError`].
pub type Result<T> = std::result::Result<T, MurmurError>;
