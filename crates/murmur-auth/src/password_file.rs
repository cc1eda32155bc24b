//! Password files for PLAIN authentication.
//!
//! One `user:hash` pair per line, where `hash` is an Argon2id PHC string
//! (see [`murmur_crypto::password::hash_password`]). Blank lines and
//! lines starting with `#` are ignored.
//!
//! The file is re-read whenever its modification time or length
//! changes. The check happens on every [`PasswordFile::check`] call;
//! there is no background watcher.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use murmur_crypto::password::{is_password_hash, verify_password};
use murmur_types::{MurmurError, Result};

type Fingerprint = (SystemTime, u64);

/// Outcome of a password check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PasswordCheck {
    /// User exists and the password matches.
    Valid,
    /// No such user.
    UnknownUser,
    /// User exists, password does not match.
    WrongPassword,
}

struct Loaded {
    fingerprint: Fingerprint,
    entries: HashMap<String, String>,
}

/// A password file with automatic reload.
pub struct PasswordFile {
    path: PathBuf,
    state: Mutex<Loaded>,
}

impl PasswordFile {
    /// Opens and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// [`MurmurError::MalformedPasswordFile`] if the file is unreadable or
    /// has a bad line.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let loaded = load(&path)?;
        tracing::debug!(path = %path.display(), users = loaded.entries.len(), "password file loaded");
        Ok(Self {
            path,
            state: Mutex::new(loaded),
        })
    }

    /// Returns the backing path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of users currently loaded.
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    /// Returns `true` if no users are loaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reloads the file if it changed. Returns `true` when it was reloaded.
    pub fn ensure_fresh(&self) -> Result<bool> {
        let current = fingerprint(&self.path)?;
        let mut state = self.lock()?;
        if state.fingerprint == current {
            return Ok(false);
        }
        *state = load(&self.path)?;
        tracing::info!(
            path = %self.path.display(),
            users = state.entries.len(),
            "password file reloaded"
        );
        Ok(true)
    }

    /// Checks a username and password, reloading the file first if needed.
    pub fn check(&self, username: &str, password: &str) -> Result<PasswordCheck> {
        self.ensure_fresh()?;
        let state = self.lock()?;
        Ok(match state.entries.get(username) {
            None => PasswordCheck::UnknownUser,
            Some(hash) if verify_password(password, hash) => PasswordCheck::Valid,
            Some(_) => PasswordCheck::WrongPassword,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Loaded>> {
        self.state.lock().map_err(|_| MurmurError::MalformedPasswordFile {
            reason: "password state lock poisoned".into(),
        })
    }
}

impl std::fmt::Debug for PasswordFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordFile")
            .field("path", &self.path)
            .field("users", &self.len())
            .finish()
    }
}

fn fingerprint(path: &Path) -> Result<Fingerprint> {
    let meta = std::fs::metadata(path).map_err(|e| MurmurError::MalformedPasswordFile {
        reason: format!("cannot stat {}: {e}", path.display()),
    })?;
    let modified = meta.modified().map_err(|e| MurmurError::MalformedPasswordFile {
        reason: format!("no modification time for {}: {e}", path.display()),
    })?;
    Ok((modified, meta.len()))
}

fn load(path: &Path) -> Result<Loaded> {
    let fingerprint = fingerprint(path)?;
    let text = std::fs::read_to_string(path).map_err(|e| MurmurError::MalformedPasswordFile {
        reason: format!("cannot read {}: {e}", path.display()),
    })?;
    Ok(Loaded {
        fingerprint,
        entries: parse(&text)?,
    })
}

/// Parses password file text into `user -> hash`.
pub(crate) fn parse(text: &str) -> Result<HashMap<String, String>> {
    let mut entries = HashMap::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let bad = |what: &str| MurmurError::MalformedPasswordFile {
            reason: format!("line {}: {what}", index + 1),
        };
        let (user, hash) = line.split_once(':').ok_or_else(|| bad("expected `user:hash`"))?;
        let (user, hash) = (user.trim(), hash.trim());
        if user.is_empty() {
            return Err(bad("empty user name"));
        }
        if !is_password_hash(hash) {
            return Err(bad("hash is not an Argon2 PHC string"));
        }
        entries.insert(user.to_string(), hash.to_string());
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_crypto::password::{hash_password_with, PasswordHashParams};

    fn hashed(password: &str) -> Result<String> {
        let params = PasswordHashParams {
            m_cost: 256,
            t_cost: 1,
            p_cost: 1,
        };
        hash_password_with(password, &params)
    }

    #[test]
    fn parse_skips_comments_and_blanks() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let (admin, guest) = (hashed("secret")?, hashed("guest")?);
        let text = format!("# accounts\n\nadmin:{admin}\n  guest : {guest}  \n");
        let entries = parse(&text)?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["admin"], admin);
        assert_eq!(entries["guest"], guest);
        assert!(verify_password("guest", &entries["guest"]));
        Ok(())
    }

    #[test]
    fn parse_rejects_missing_separator() {
        let result = parse("admin\n");
        assert!(matches!(result, Err(MurmurError::MalformedPasswordFile { .. })));
    }

    #[test]
    fn parse_rejects_bad_hash() {
        let result = parse("admin:plaintext\n");
        assert!(matches!(
            result,
            Err(MurmurError::MalformedPasswordFile { reason }) if reason.starts_with("line 1")
        ));
    }

    #[test]
    fn parse_rejects_unsalted_digest() {
        let digest = "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b";
        let result = parse(&format!("admin:{digest}\n"));
        assert!(matches!(result, Err(MurmurError::MalformedPasswordFile { .. })));
    }

    #[test]
    fn parse_rejects_empty_user() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let text = format!(":{}\n", hashed("x")?);
        assert!(parse(&text).is_err());
        Ok(())
    }

    #[test]
    fn open_missing_file_fails() {
        let path = std::env::temp_dir().join("murmur-no-such-passwords");
        assert!(matches!(
            PasswordFile::open(&path),
            Err(MurmurError::MalformedPasswordFile { .. })
        ));
    }
}
