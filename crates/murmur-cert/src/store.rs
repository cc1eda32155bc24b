//! Certificate store keyed by armored public key.
//!
//! A store either lives purely in memory or mirrors a directory of
//! certificate files. Directory-backed stores pick up files dropped in
//! by other processes: a lookup miss rescans the directory before
//! reporting absence, and [`CertStore::refresh`] rebuilds the index
//! when the directory itself changed.
//!
//! Only public forms are kept. Inserting a certificate with a secret
//! key indexes (and persists) its public form.
//!
//! # Concurrency
//!
//! Scans read the filesystem without holding the index lock and then
//! apply their result under a single write lock, so a concurrent
//! lookup sees either the old or the new index, never a mix.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use murmur_types::{MurmurError, Result};

use crate::cert::{Certificate, SECRET_SUFFIX};

/// File extension used for certificates written by [`CertStore::insert`].
pub const CERT_EXTENSION: &str = "cert";

/// Modification time and length of a scanned file.
type FileStamp = (SystemTime, u64);

/// A scanned file and the key it provided, if it parsed.
#[derive(Clone)]
struct IndexedFile {
    stamp: FileStamp,
    key: Option<String>,
}

#[derive(Default)]
struct Index {
    certs: HashMap<String, Certificate>,
    files: HashMap<PathBuf, IndexedFile>,
    dir_modified: Option<SystemTime>,
}

impl Index {
    /// Records what `path` now holds, dropping the key it held before
    /// unless another file still provides it.
    fn record(&mut self, path: PathBuf, stamp: FileStamp, cert: Option<Certificate>) {
        let key = cert.as_ref().map(Certificate::public_text);
        if let Some(old) = self.files.remove(&path).and_then(|file| file.key) {
            let still_provided = self.files.values().any(|f| f.key.as_ref() == Some(&old));
            if key.as_ref() != Some(&old) && !still_provided {
                self.certs.remove(&old);
            }
        }
        if let Some(cert) = cert {
            self.certs.insert(cert.public_text(), cert);
        }
        self.files.insert(path, IndexedFile { stamp, key });
    }
}

/// Result of reading the directory, computed outside the index lock.
struct ScanOutcome {
    loaded: Vec<(PathBuf, FileStamp, Option<Certificate>)>,
    dir_modified: Option<SystemTime>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScanMode {
    /// Load only files that are new or changed since the last scan.
    Changed,
    /// Rebuild the whole index from disk.
    Full,
}

// ---------------------------------------------------------------------------
// CertStore
// ---------------------------------------------------------------------------

/// Registry of known peer certificates.
pub struct CertStore {
    location: Option<PathBuf>,
    index: RwLock<Index>,
}

impl CertStore {
    /// Creates an empty store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            location: None,
            index: RwLock::new(Index::default()),
        }
    }

    /// Opens a store over `dir`, creating the directory if needed, and
    /// loads every certificate already there.
    ///
    /// # Errors
    ///
    /// [`MurmurError::StoreUnavailable`] if the directory cannot be
    /// created or read.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| MurmurError::StoreUnavailable {
            reason: format!("cannot create {}: {e}", dir.display()),
        })?;
        let store = Self {
            location: Some(dir),
            index: RwLock::new(Index::default()),
        };
        store.scan(ScanMode::Full)?;
        tracing::info!(
            location = %store.location_display(),
            certificates = store.len(),
            "certificate store opened"
        );
        Ok(store)
    }

    /// Creates a store over `dir` if given, else an in-memory store.
    pub fn new(dir: Option<&Path>) -> Result<Self> {
        match dir {
            Some(dir) => Self::open(dir),
            None => Ok(Self::in_memory()),
        }
    }

    /// Returns the backing directory, if any.
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Adds or replaces the entry for `cert`'s public key.
    ///
    /// Directory-backed stores also write the public form to
    /// `<dir>/<public key hex>.cert`.
    pub fn insert(&self, cert: &Certificate) -> Result<()> {
        let public = cert.public_only();
        let key = public.public_text();

        let mut stamp = None;
        if let Some(dir) = &self.location {
            let path = dir.join(format!(
                "{}.{CERT_EXTENSION}",
                hex::encode(public.public_key().as_bytes())
            ));
            public.save_public(&path)?;
            stamp = file_stamp(&path).map(|s| (path, s));
        }

        let mut index = self.write()?;
        match stamp {
            Some((path, stamp)) => index.record(path, stamp, Some(public)),
            None => {
                index.certs.insert(key, public);
            }
        }
        Ok(())
    }

    /// Looks up a certificate by armored public key.
    ///
    /// On a miss, directory-backed stores scan for new or changed files
    /// before answering. `Ok(None)` means the key is unknown.
    ///
    /// # Errors
    ///
    /// [`MurmurError::StoreUnavailable`] if the directory cannot be read.
    pub fn lookup(&self, public_text: &str) -> Result<Option<Certificate>> {
        if let Some(cert) = self.read()?.certs.get(public_text) {
            return Ok(Some(cert.clone()));
        }
        if self.location.is_none() {
            return Ok(None);
        }
        self.scan(ScanMode::Changed)?;
        Ok(self.read()?.certs.get(public_text).cloned())
    }

    /// Rebuilds the index if the directory changed since the last scan.
    ///
    /// Certificates whose files were removed drop out of the index.
    /// Returns `true` when a rebuild happened. In-memory stores always
    /// return `false`.
    pub fn refresh(&self) -> Result<bool> {
        let Some(dir) = &self.location else {
            return Ok(false);
        };
        let current = dir_modified(dir)?;
        if self.read()?.dir_modified == Some(current) {
            return Ok(false);
        }
        self.scan(ScanMode::Full)?;
        tracing::debug!(location = %dir.display(), "certificate store reloaded");
        Ok(true)
    }

    /// Returns the number of indexed certificates.
    pub fn len(&self) -> usize {
        self.read().map(|index| index.certs.len()).unwrap_or(0)
    }

    /// Returns `true` if no certificates are indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a snapshot of all indexed certificates.
    pub fn certificates(&self) -> Result<Vec<Certificate>> {
        Ok(self.read()?.certs.values().cloned().collect())
    }

    // -----------------------------------------------------------------------
    // Scanning
    // -----------------------------------------------------------------------

    fn scan(&self, mode: ScanMode) -> Result<()> {
        let Some(dir) = &self.location else {
            return Ok(());
        };
        let known = match mode {
            ScanMode::Full => HashMap::new(),
            ScanMode::Changed => self
                .read()?
                .files
                .iter()
                .map(|(path, file)| (path.clone(), file.stamp))
                .collect(),
        };
        let outcome = read_directory(dir, &known)?;

        let mut index = self.write()?;
        if mode == ScanMode::Full {
            index.certs.clear();
            index.files.clear();
        }
        for (path, stamp, cert) in outcome.loaded {
            index.record(path, stamp, cert);
        }
        index.dir_modified = outcome.dir_modified;
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Index>> {
        self.index.read().map_err(|_| MurmurError::StoreUnavailable {
            reason: "certificate index lock poisoned".into(),
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Index>> {
        self.index.write().map_err(|_| MurmurError::StoreUnavailable {
            reason: "certificate index lock poisoned".into(),
        })
    }

    fn location_display(&self) -> String {
        match &self.location {
            Some(dir) => dir.display().to_string(),
            None => "memory".to_string(),
        }
    }
}

impl fmt::Debug for CertStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertStore")
            .field("location", &self.location)
            .field("certificates", &self.len())
            .finish()
    }
}

impl fmt::Display for CertStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let certs = self.certificates().map_err(|_| fmt::Error)?;
        write!(
            f,
            "certificate store ({}): {} certificate(s)",
            self.location_display(),
            certs.len()
        )?;
        let mut certs = certs;
        certs.sort_by_key(Certificate::public_text);
        for cert in certs {
            write!(f, "\n{cert}")?;
        }
        Ok(())
    }
}

fn dir_modified(dir: &Path) -> Result<SystemTime> {
    std::fs::metadata(dir)
        .and_then(|meta| meta.modified())
        .map_err(|e| MurmurError::StoreUnavailable {
            reason: format!("cannot stat {}: {e}", dir.display()),
        })
}

fn file_stamp(path: &Path) -> Option<FileStamp> {
    let meta = std::fs::metadata(path).ok()?;
    Some((meta.modified().ok()?, meta.len()))
}

fn is_candidate(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    !name.starts_with('.') && !name.ends_with(SECRET_SUFFIX) && !name.ends_with(".tmp")
}

fn read_directory(dir: &Path, known: &HashMap<PathBuf, FileStamp>) -> Result<ScanOutcome> {
    let dir_modified = dir_modified(dir).ok();
    let entries = std::fs::read_dir(dir).map_err(|e| MurmurError::StoreUnavailable {
        reason: format!("cannot read {}: {e}", dir.display()),
    })?;

    let mut loaded = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| MurmurError::StoreUnavailable {
            reason: format!("cannot read {}: {e}", dir.display()),
        })?;
        let path = entry.path();
        if !path.is_file() || !is_candidate(&path) {
            continue;
        }
        let Some(stamp) = file_stamp(&path) else {
            continue;
        };
        if known.get(&path) == Some(&stamp) {
            continue;
        }
        let cert = match Certificate::load_public(&path) {
            Ok(cert) => Some(cert.public_only()),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable certificate");
                None
            }
        };
        loaded.push((path, stamp, cert));
    }
    Ok(ScanOutcome {
        loaded,
        dir_modified,
    })
}
