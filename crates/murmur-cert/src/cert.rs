//! CURVE certificates.
//!
//! A [`Certificate`] pairs a public key with an optional secret key and
//! free-form string metadata. Certificates compare equal when their key
//! material matches; metadata never takes part in equality.
//!
//! # Persistence
//!
//! [`Certificate::save`] follows the zcert convention of writing the
//! public form at `path` and the full form at `path_secret`.
//! [`Certificate::load`] reverses that, picking up the secret companion
//! when present.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use murmur_crypto::{generate_keypair, PublicKey, SecretKey};
use murmur_types::{MurmurError, Result};

use crate::format;

/// How [`Certificate::set_meta`] treats a name that is already set.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetaUpdatePolicy {
    /// The new value replaces the old one.
    Overwrite,
    /// The first value is kept and later writes are ignored.
    KeepExisting,
}

/// The policy applied by [`Certificate::set_meta`].
pub const META_UPDATE_POLICY: MetaUpdatePolicy = MetaUpdatePolicy::Overwrite;

/// Suffix appended to a certificate path for its secret companion file.
pub const SECRET_SUFFIX: &str = "_secret";

/// Returns the path of the secret companion of `path`.
pub fn secret_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(SECRET_SUFFIX);
    PathBuf::from(name)
}

// ---------------------------------------------------------------------------
// Certificate
// ---------------------------------------------------------------------------

/// An identity: keypair plus metadata.
#[derive(Clone, Debug)]
pub struct Certificate {
    public: PublicKey,
    secret: SecretKey,
    metadata: BTreeMap<String, String>,
}

impl Certificate {
    /// Creates a certificate with a freshly generated keypair.
    pub fn new() -> Self {
        let (public, secret) = generate_keypair();
        Self::from_keys(public, secret)
    }

    /// Wraps already-validated keys.
    pub fn from_keys(public: PublicKey, secret: SecretKey) -> Self {
        Self {
            public,
            secret,
            metadata: BTreeMap::new(),
        }
    }

    /// Creates a certificate from raw 32-byte keys.
    ///
    /// # Errors
    ///
    /// [`MurmurError::InvalidKeyLength`] if either slice is not 32 bytes.
    pub fn from_keypair(public: &[u8], secret: &[u8]) -> Result<Self> {
        Ok(Self::from_keys(
            PublicKey::from_slice(public)?,
            SecretKey::from_slice(secret)?,
        ))
    }

    /// Creates a public-only certificate from a raw 32-byte key.
    pub fn from_public(public: &[u8]) -> Result<Self> {
        Ok(Self::from_keys(PublicKey::from_slice(public)?, SecretKey::empty()))
    }

    /// Creates a certificate from 40-character armored keys.
    pub fn from_armored(public: &str, secret: &str) -> Result<Self> {
        Ok(Self::from_keys(
            PublicKey::from_armored(public)?,
            SecretKey::from_armored(secret)?,
        ))
    }

    /// Creates a public-only certificate from a 40-character armored key.
    pub fn from_armored_public(public: &str) -> Result<Self> {
        Ok(Self::from_keys(PublicKey::from_armored(public)?, SecretKey::empty()))
    }

    /// Returns the public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Returns the secret key, which is the empty sentinel for public-only
    /// certificates.
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    /// Returns the armored public key.
    pub fn public_text(&self) -> String {
        self.public.to_armored()
    }

    /// Returns the armored secret key.
    pub fn secret_text(&self) -> String {
        self.secret.to_armored()
    }

    /// Returns `true` unless this is a public-only certificate.
    pub fn has_secret_key(&self) -> bool {
        !self.secret.is_empty()
    }

    /// Returns a copy with the secret key stripped. Metadata is kept.
    pub fn public_only(&self) -> Self {
        Self {
            public: self.public,
            secret: SecretKey::empty(),
            metadata: self.metadata.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Metadata
    // -----------------------------------------------------------------------

    /// Returns the metadata value for `name`.
    pub fn meta(&self, name: &str) -> Option<&str> {
        self.metadata.get(name).map(String::as_str)
    }

    /// Sets a metadata value, storing `value` in its string form.
    ///
    /// Applies [`META_UPDATE_POLICY`]. Returns the value previously
    /// stored under `name`.
    ///
    /// # Errors
    ///
    /// [`MurmurError::MalformedCertificate`] if `name` could not be read
    /// back from a saved file: empty, padded with whitespace, starting
    /// with `#`, or containing `=` or a control character.
    pub fn set_meta(
        &mut self,
        name: impl Into<String>,
        value: impl fmt::Display,
    ) -> Result<Option<String>> {
        let name = name.into();
        format::validate_meta_name(&name)?;
        let previous = match META_UPDATE_POLICY {
            MetaUpdatePolicy::Overwrite => self.metadata.insert(name, value.to_string()),
            MetaUpdatePolicy::KeepExisting => match self.metadata.get(&name) {
                Some(existing) => Some(existing.clone()),
                None => self.metadata.insert(name, value.to_string()),
            },
        };
        Ok(previous)
    }

    /// Removes a metadata value, returning it.
    pub fn unset_meta(&mut self, name: &str) -> Option<String> {
        self.metadata.remove(name)
    }

    /// Returns the names of all metadata values, sorted.
    pub fn meta_keys(&self) -> Vec<&str> {
        self.metadata.keys().map(String::as_str).collect()
    }

    /// Returns all metadata.
    pub fn meta_map(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Saves the public form at `path` and, when a secret key is held,
    /// the full form at [`secret_path`]`(path)`.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.save_public(path)?;
        if self.has_secret_key() {
            self.save_secret(&secret_path(path))?;
        }
        Ok(())
    }

    /// Saves only the public form at `path`.
    pub fn save_public(&self, path: &Path) -> Result<()> {
        let text = format::render(&self.metadata, &self.public, None);
        write_atomic(path, &text, FileAccess::Shared)?;
        tracing::debug!(path = %path.display(), "public certificate saved");
        Ok(())
    }

    /// Saves the full form, both keys, at `path`.
    ///
    /// # Errors
    ///
    /// [`MurmurError::NoSecretKey`] for a public-only certificate.
    pub fn save_secret(&self, path: &Path) -> Result<()> {
        if !self.has_secret_key() {
            return Err(MurmurError::NoSecretKey);
        }
        let text = format::render(&self.metadata, &self.public, Some(&self.secret));
        write_atomic(path, &text, FileAccess::OwnerOnly)?;
        tracing::debug!(path = %path.display(), "secret certificate saved");
        Ok(())
    }

    /// Loads a certificate from `path`.
    ///
    /// If the file holds no secret key and a secret companion exists, the
    /// secret is taken from the companion. Both files must name the same
    /// public key.
    pub fn load(path: &Path) -> Result<Self> {
        let mut cert = Self::load_public(path)?;
        if cert.has_secret_key() {
            return Ok(cert);
        }

        let companion = secret_path(path);
        if companion.is_file() {
            let full = Self::load_public(&companion)?;
            if full.public != cert.public {
                return Err(MurmurError::MalformedCertificate {
                    reason: format!(
                        "secret file {} does not match public key of {}",
                        companion.display(),
                        path.display()
                    ),
                });
            }
            cert.secret = full.secret.clone();
        }
        Ok(cert)
    }

    /// Loads only the file at `path`, ignoring any secret companion.
    pub fn load_public(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| MurmurError::StorageError {
            reason: format!("failed to read certificate {}: {e}", path.display()),
        })?;
        let parsed = format::parse(&text)?;
        Ok(Self {
            public: parsed.public,
            secret: parsed.secret.unwrap_or_else(SecretKey::empty),
            metadata: parsed.metadata,
        })
    }
}

impl Default for Certificate {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.public == other.public && self.secret == other.secret
    }
}

impl Eq for Certificate {}

impl fmt::Display for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "public-key: {}", self.public_text())?;
        if self.has_secret_key() {
            write!(f, " (with secret)")?;
        }
        for (name, value) in &self.metadata {
            write!(f, "\n    {name} = \"{value}\"")?;
        }
        Ok(())
    }
}

/// Who may read a written certificate file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum FileAccess {
    /// Default permissions.
    Shared,
    /// Owner read/write only (`0o600` on unix).
    OwnerOnly,
}

/// Writes `contents` to a temporary sibling then renames it over `path`.
///
/// The temporary file is created fresh, so its mode is the one requested
/// here and not inherited from a leftover file.
fn write_atomic(path: &Path, contents: &str, access: FileAccess) -> Result<()> {
    let mut tmp_name = OsString::from(path.as_os_str());
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    if let Err(e) = std::fs::remove_file(&tmp_path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            return Err(MurmurError::StorageError {
                reason: format!("failed to remove stale {}: {e}", tmp_path.display()),
            });
        }
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    if access == FileAccess::OwnerOnly {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let written = options.open(&tmp_path).and_then(|mut file| {
        file.write_all(contents.as_bytes())?;
        file.sync_all()
    });
    written.map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        MurmurError::StorageError {
            reason: format!("failed to write certificate {}: {e}", tmp_path.display()),
        }
    })?;

    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        MurmurError::StorageError {
            reason: format!("failed to rename certificate into {}: {e}", path.display()),
        }
    })
}
