//! Presented credentials and admission decisions.

use std::fmt;

use murmur_crypto::PublicKey;

/// What a connecting peer presents to the security layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credential {
    /// No credential at all.
    Null,
    /// Username and clear-text password (PLAIN).
    Plain {
        /// Account name looked up in the password file.
        username: String,
        /// Password checked against the stored hash.
        password: String,
    },
    /// A CURVE public key.
    Curve {
        /// The peer's long-term public key.
        public_key: PublicKey,
    },
    /// An identity asserted by an external layer (e.g. GSSAPI).
    External {
        /// Principal name reported by the external layer.
        principal: String,
        /// Whether the external layer vouched for the principal.
        asserted: bool,
    },
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Plain { username, .. } => write!(f, "PLAIN user={username}"),
            Self::Curve { public_key } => write!(f, "CURVE key={public_key}"),
            Self::External {
                principal,
                asserted,
            } => write!(f, "EXTERNAL principal={principal} asserted={asserted}"),
        }
    }
}

/// Why a connection was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// An allow list is configured and the address is not on it.
    NotAllowed,
    /// The address is on the deny list.
    Denied,
    /// The credential kind does not fit the configured mechanism.
    WrongMechanism,
    /// The password file has no such user.
    UnknownUser,
    /// The password did not match.
    WrongPassword,
    /// The public key is not in the certificate store.
    UnknownKey,
    /// The external layer did not vouch for the principal.
    NotAsserted,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotAllowed => "address not in allow list",
            Self::Denied => "address denied",
            Self::WrongMechanism => "credential does not match mechanism",
            Self::UnknownUser => "unknown user",
            Self::WrongPassword => "wrong password",
            Self::UnknownKey => "unknown public key",
            Self::NotAsserted => "external identity not asserted",
        };
        f.write_str(text)
    }
}

/// Outcome of an admission decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// The peer may connect.
    Admit,
    /// The peer is turned away.
    Reject(RejectReason),
}

impl Decision {
    /// Returns `true` for [`Decision::Admit`].
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admit)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admit => f.write_str("admit"),
            Self::Reject(reason) => write!(f, "reject ({reason})"),
        }
    }
}
