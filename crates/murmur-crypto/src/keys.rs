//! CURVE keypairs.
//!
//! Certificates carry raw X25519 keys. A secret key equal to
//! [`EMPTY_KEY`] marks a public-only certificate, one that can
//! recognise a peer but never prove its own identity.

use std::fmt;

use murmur_types::{MurmurError, Result};
use rand::rngs::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::z85;

/// Raw key length in bytes.
pub const KEY_LEN: usize = 32;

/// Armored (Z85) key length in characters.
pub const ARMORED_KEY_LEN: usize = 40;

/// All-zero sentinel stored in place of an absent secret key.
pub const EMPTY_KEY: [u8; KEY_LEN] = [0u8; KEY_LEN];

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

/// X25519 public key (32 bytes).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct PublicKey([u8; KEY_LEN]);

impl PublicKey {
    /// Creates a `PublicKey` from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Creates a `PublicKey` from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(Self(to_array(bytes)?))
    }

    /// Parses a 40-character armored key.
    pub fn from_armored(text: &str) -> Result<Self> {
        Ok(Self(decode_armored(text)?))
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Returns the 40-character armored form.
    pub fn to_armored(&self) -> String {
        z85::encode_key(&self.0)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_armored())
    }
}

// ---------------------------------------------------------------------------
// SecretKey
// ---------------------------------------------------------------------------

/// X25519 secret key (32 bytes), zeroized on drop.
///
/// `Debug` never prints key material.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; KEY_LEN]);

impl SecretKey {
    /// The sentinel secret of a public-only certificate.
    pub fn empty() -> Self {
        Self(EMPTY_KEY)
    }

    /// Creates a `SecretKey` from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Creates a `SecretKey` from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(Self(to_array(bytes)?))
    }

    /// Parses a 40-character armored key.
    pub fn from_armored(text: &str) -> Result<Self> {
        Ok(Self(decode_armored(text)?))
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Returns the 40-character armored form.
    pub fn to_armored(&self) -> String {
        z85::encode_key(&self.0)
    }

    /// Returns `true` for the all-zero sentinel.
    pub fn is_empty(&self) -> bool {
        self.0 == EMPTY_KEY
    }

    /// Derives the matching public key.
    pub fn public_key(&self) -> PublicKey {
        let secret = x25519_dalek::StaticSecret::from(self.0);
        PublicKey(*x25519_dalek::PublicKey::from(&secret).as_bytes())
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        crate::password::constant_time_eq(&self.0, &other.0)
    }
}

impl Eq for SecretKey {}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("SecretKey(empty)")
        } else {
            f.write_str("SecretKey(..)")
        }
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Generates a fresh keypair from OS entropy.
pub fn generate_keypair() -> (PublicKey, SecretKey) {
    let secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
    let public = x25519_dalek::PublicKey::from(&secret);
    (PublicKey(*public.as_bytes()), SecretKey(secret.to_bytes()))
}

fn to_array(bytes: &[u8]) -> Result<[u8; KEY_LEN]> {
    <[u8; KEY_LEN]>::try_from(bytes).map_err(|_| MurmurError::InvalidKeyLength {
        expected: KEY_LEN,
        actual: bytes.len(),
    })
}

fn decode_armored(text: &str) -> Result<[u8; KEY_LEN]> {
    if text.len() != ARMORED_KEY_LEN {
        return Err(MurmurError::InvalidKeyLength {
            expected: ARMORED_KEY_LEN,
            actual: text.len(),
        });
    }
    let bytes = z85::decode(text).ok_or_else(|| MurmurError::MalformedCertificate {
        reason: "armored key is not valid Z85".into(),
    })?;
    to_array(&bytes)
}
