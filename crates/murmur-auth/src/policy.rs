//! The admission policy.
//!
//! # Decision order
//!
//! 1. If the allow list is non-empty, only listed addresses get past
//!    this step and the deny list is not consulted.
//! 2. Otherwise an address on the deny list is rejected.
//! 3. The configured mechanism judges the presented credential.
//!
//! A rejection is a normal [`Decision`], never an error. Errors are
//! reserved for an unreadable certificate store or password file.
//!
//! # Reconfiguration
//!
//! Address lists and the mechanism can change while decisions are being
//! made. Each decision takes one snapshot of the mechanism when it
//! starts, so a swap only affects later decisions.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use murmur_cert::CertStore;
use murmur_types::{MurmurError, Result};

use crate::config::{AuthConfig, MechanismConfig};
use crate::credential::{Credential, Decision, RejectReason};
use crate::password_file::{PasswordCheck, PasswordFile};

/// Location that makes CURVE authentication accept any public key.
pub const CURVE_ALLOW_ANY: &str = "*";

// ---------------------------------------------------------------------------
// Mechanism
// ---------------------------------------------------------------------------

/// Which mechanism is active, without its state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MechanismKind {
    /// No authentication; every credential is admitted.
    Open,
    /// PLAIN username/password against a password file.
    Plain,
    /// CURVE public key looked up in a certificate store.
    Curve,
    /// CURVE accepting any public key.
    CurveAllowAny,
    /// Trust delegated to an external identity layer.
    External,
}

impl fmt::Display for MechanismKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Open => "NULL",
            Self::Plain => "PLAIN",
            Self::Curve => "CURVE",
            Self::CurveAllowAny => "CURVE(any)",
            Self::External => "EXTERNAL",
        };
        f.write_str(text)
    }
}

enum Mechanism {
    Open,
    Plain(PasswordFile),
    Curve(Arc<CertStore>),
    CurveAllowAny,
    External,
}

impl Mechanism {
    fn kind(&self) -> MechanismKind {
        match self {
            Self::Open => MechanismKind::Open,
            Self::Plain(_) => MechanismKind::Plain,
            Self::Curve(_) => MechanismKind::Curve,
            Self::CurveAllowAny => MechanismKind::CurveAllowAny,
            Self::External => MechanismKind::External,
        }
    }

    fn evaluate(&self, credential: &Credential) -> Result<Decision> {
        match (self, credential) {
            (Self::Open, _) => Ok(Decision::Admit),

            (Self::Plain(file), Credential::Plain { username, password }) => {
                match file.check(username, password)? {
                    PasswordCheck::Valid => Ok(Decision::Admit),
                    PasswordCheck::UnknownUser => reject(RejectReason::UnknownUser),
                    PasswordCheck::WrongPassword => reject(RejectReason::WrongPassword),
                }
            }

            (Self::CurveAllowAny, Credential::Curve { .. }) => Ok(Decision::Admit),

            (Self::Curve(store), Credential::Curve { public_key }) => {
                store.refresh()?;
                match store.lookup(&public_key.to_armored())? {
                    Some(_) => Ok(Decision::Admit),
                    None => reject(RejectReason::UnknownKey),
                }
            }

            (Self::External, Credential::External { asserted: true, .. }) => Ok(Decision::Admit),
            (Self::External, Credential::External { asserted: false, .. }) => {
                reject(RejectReason::NotAsserted)
            }

            _ => reject(RejectReason::WrongMechanism),
        }
    }
}

// ---------------------------------------------------------------------------
// Authenticator
// ---------------------------------------------------------------------------

/// Decides whether inbound peers are admitted.
///
/// Shared by reference (usually `Arc<Authenticator>`) between the nodes
/// and transports that consult it. All configuration methods take
/// `&self`.
pub struct Authenticator {
    allowed: RwLock<HashSet<String>>,
    denied: RwLock<HashSet<String>>,
    mechanism: RwLock<Arc<Mechanism>>,
    verbose: AtomicBool,
}

impl Authenticator {
    /// Creates an open authenticator with empty address lists.
    pub fn new() -> Self {
        Self {
            allowed: RwLock::new(HashSet::new()),
            denied: RwLock::new(HashSet::new()),
            mechanism: RwLock::new(Arc::new(Mechanism::Open)),
            verbose: AtomicBool::new(false),
        }
    }

    /// Builds an authenticator from configuration.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        config.validate()?;
        let auth = Self::new();
        auth.allow(config.allow.iter().cloned())?;
        auth.deny(config.deny.iter().cloned())?;
        auth.set_verbose(config.verbose);
        match &config.mechanism {
            MechanismConfig::Open => {}
            MechanismConfig::Plain { password_file } => auth.enable_plain(password_file)?,
            MechanismConfig::Curve { location } => auth.enable_curve(location)?,
            MechanismConfig::External => auth.enable_external()?,
        }
        Ok(auth)
    }

    // -----------------------------------------------------------------------
    // Address lists
    // -----------------------------------------------------------------------

    /// Adds addresses to the allow list.
    pub fn allow<I, S>(&self, addresses: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut allowed = self.allowed.write().map_err(|_| poisoned())?;
        for address in addresses {
            let address = address.into();
            tracing::debug!(%address, "address allowed");
            allowed.insert(address);
        }
        Ok(())
    }

    /// Adds addresses to the deny list.
    pub fn deny<I, S>(&self, addresses: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut denied = self.denied.write().map_err(|_| poisoned())?;
        for address in addresses {
            let address = address.into();
            tracing::debug!(%address, "address denied");
            denied.insert(address);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Mechanisms
    // -----------------------------------------------------------------------

    /// Switches to PLAIN authentication against `path`.
    pub fn enable_plain(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = PasswordFile::open(path)?;
        tracing::info!(path = %file.path().display(), "PLAIN authentication enabled");
        self.replace_mechanism(Mechanism::Plain(file))
    }

    /// Switches to CURVE authentication.
    ///
    /// `location` is either [`CURVE_ALLOW_ANY`] or a certificate
    /// directory opened as a [`CertStore`].
    pub fn enable_curve(&self, location: &str) -> Result<()> {
        if location == CURVE_ALLOW_ANY {
            tracing::info!("CURVE authentication enabled for any key");
            return self.replace_mechanism(Mechanism::CurveAllowAny);
        }
        let store = CertStore::open(location)?;
        self.enable_curve_with_store(Arc::new(store))
    }

    /// Switches to CURVE authentication against an existing store.
    pub fn enable_curve_with_store(&self, store: Arc<CertStore>) -> Result<()> {
        tracing::info!(
            location = %store.location().map(|p| p.display().to_string()).unwrap_or_else(|| "memory".into()),
            "CURVE authentication enabled"
        );
        self.replace_mechanism(Mechanism::Curve(store))
    }

    /// Delegates trust to an external identity layer.
    pub fn enable_external(&self) -> Result<()> {
        tracing::info!("EXTERNAL authentication enabled");
        self.replace_mechanism(Mechanism::External)
    }

    /// Returns to open (NULL) authentication.
    pub fn disable_mechanism(&self) -> Result<()> {
        self.replace_mechanism(Mechanism::Open)
    }

    /// Returns the active mechanism.
    pub fn mechanism(&self) -> Result<MechanismKind> {
        Ok(self.snapshot()?.kind())
    }

    /// Turns decision logging at `info` level on or off.
    pub fn set_verbose(&self, verbose: bool) {
        self.verbose.store(verbose, Ordering::Relaxed);
    }

    /// Returns whether decision logging is on.
    pub fn is_verbose(&self) -> bool {
        self.verbose.load(Ordering::Relaxed)
    }

    // -----------------------------------------------------------------------
    // Decision
    // -----------------------------------------------------------------------

    /// Decides whether a peer at `remote` presenting `credential` is
    /// admitted.
    pub fn decide(&self, remote: &str, credential: &Credential) -> Result<Decision> {
        let mechanism = self.snapshot()?;
        let decision = match self.check_address(remote)? {
            Some(reason) => Decision::Reject(reason),
            None => mechanism.evaluate(credential)?,
        };

        if self.is_verbose() {
            tracing::info!(
                %remote,
                mechanism = %mechanism.kind(),
                %credential,
                %decision,
                "authentication decision"
            );
        } else {
            tracing::debug!(%remote, mechanism = %mechanism.kind(), %decision, "authentication decision");
        }
        Ok(decision)
    }

    fn check_address(&self, remote: &str) -> Result<Option<RejectReason>> {
        let allowed = self.allowed.read().map_err(|_| poisoned())?;
        if !allowed.is_empty() {
            return Ok((!allowed.contains(remote)).then_some(RejectReason::NotAllowed));
        }
        drop(allowed);

        let denied = self.denied.read().map_err(|_| poisoned())?;
        Ok(denied.contains(remote).then_some(RejectReason::Denied))
    }

    fn snapshot(&self) -> Result<Arc<Mechanism>> {
        Ok(Arc::clone(&*self.mechanism.read().map_err(|_| poisoned())?))
    }

    fn replace_mechanism(&self, mechanism: Mechanism) -> Result<()> {
        *self.mechanism.write().map_err(|_| poisoned())? = Arc::new(mechanism);
        Ok(())
    }
}

impl Default for Authenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("mechanism", &self.mechanism().ok())
            .field("verbose", &self.is_verbose())
            .finish_non_exhaustive()
    }
}

fn reject(reason: RejectReason) -> Result<Decision> {
    Ok(Decision::Reject(reason))
}

fn poisoned() -> MurmurError {
    MurmurError::ConfigError {
        reason: "authenticator lock poisoned".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_cert::Certificate;

    fn curve(cert: &Certificate) -> Credential {
        Credential::Curve {
            public_key: *cert.public_key(),
        }
    }

    #[test]
    fn open_admits_everything() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let auth = Authenticator::new();
        assert_eq!(auth.mechanism()?, MechanismKind::Open);
        assert!(auth.decide("10.0.0.1", &Credential::Null)?.is_admitted());
        assert!(auth.decide("10.0.0.2", &curve(&Certificate::new()))?.is_admitted());
        Ok(())
    }

    #[test]
    fn deny_list_rejects() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let auth = Authenticator::new();
        auth.deny(["10.0.0.9"])?;
        assert_eq!(
            auth.decide("10.0.0.9", &Credential::Null)?,
            Decision::Reject(RejectReason::Denied)
        );
        assert!(auth.decide("10.0.0.8", &Credential::Null)?.is_admitted());
        Ok(())
    }

    #[test]
    fn allow_list_takes_precedence() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let auth = Authenticator::new();
        auth.allow(["127.0.0.1"])?;
        auth.deny(["127.0.0.1", "10.0.0.5"])?;

        assert!(auth.decide("127.0.0.1", &Credential::Null)?.is_admitted());
        for addr in ["10.0.0.5", "10.0.0.6", "192.168.1.1", ""] {
            assert_eq!(
                auth.decide(addr, &Credential::Null)?,
                Decision::Reject(RejectReason::NotAllowed)
            );
        }
        Ok(())
    }

    #[test]
    fn list_additions_accumulate() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let auth = Authenticator::new();
        auth.allow(["a"])?;
        auth.allow(["b", "a"])?;
        assert!(auth.decide("a", &Credential::Null)?.is_admitted());
        assert!(auth.decide("b", &Credential::Null)?.is_admitted());
        assert!(!auth.decide("c", &Credential::Null)?.is_admitted());
        Ok(())
    }

    #[test]
    fn curve_allow_any_accepts_any_key() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let auth = Authenticator::new();
        auth.enable_curve(CURVE_ALLOW_ANY)?;
        assert_eq!(auth.mechanism()?, MechanismKind::CurveAllowAny);
        assert!(auth.decide("h", &curve(&Certificate::new()))?.is_admitted());
        assert_eq!(
            auth.decide("h", &Credential::Null)?,
            Decision::Reject(RejectReason::WrongMechanism)
        );
        Ok(())
    }

    #[test]
    fn curve_store_admits_known_keys() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(CertStore::in_memory());
        let known = Certificate::new();
        store.insert(&known)?;

        let auth = Authenticator::new();
        auth.enable_curve_with_store(Arc::clone(&store))?;
        assert!(auth.decide("h", &curve(&known))?.is_admitted());
        assert_eq!(
            auth.decide("h", &curve(&Certificate::new()))?,
            Decision::Reject(RejectReason::UnknownKey)
        );
        Ok(())
    }

    #[test]
    fn external_follows_assertion() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let auth = Authenticator::new();
        auth.enable_external()?;
        let vouched = Credential::External {
            principal: "alice@EXAMPLE.ORG".into(),
            asserted: true,
        };
        let unvouched = Credential::External {
            principal: "mallory@EXAMPLE.ORG".into(),
            asserted: false,
        };
        assert!(auth.decide("h", &vouched)?.is_admitted());
        assert_eq!(
            auth.decide("h", &unvouched)?,
            Decision::Reject(RejectReason::NotAsserted)
        );
        Ok(())
    }

    #[test]
    fn enabling_a_mechanism_replaces_the_previous_one() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let auth = Authenticator::new();
        auth.enable_curve(CURVE_ALLOW_ANY)?;
        auth.enable_external()?;
        assert_eq!(auth.mechanism()?, MechanismKind::External);
        assert_eq!(
            auth.decide("h", &curve(&Certificate::new()))?,
            Decision::Reject(RejectReason::WrongMechanism)
        );
        auth.disable_mechanism()?;
        assert!(auth.decide("h", &Credential::Null)?.is_admitted());
        Ok(())
    }

    #[test]
    fn address_rejection_skips_mechanism() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let auth = Authenticator::new();
        auth.enable_curve(CURVE_ALLOW_ANY)?;
        auth.deny(["bad"])?;
        assert_eq!(
            auth.decide("bad", &curve(&Certificate::new()))?,
            Decision::Reject(RejectReason::Denied)
        );
        Ok(())
    }

    #[test]
    fn verbose_flag_toggles() {
        let auth = Authenticator::default();
        assert!(!auth.is_verbose());
        auth.set_verbose(true);
        assert!(auth.is_verbose());
    }
}
