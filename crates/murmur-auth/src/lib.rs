//! Connection admission for murmur nodes.
//!
//! An [`Authenticator`] decides whether an inbound peer is admitted. It
//! combines address allow/deny lists with exactly one authentication
//! mechanism: open, password file, certificate store, or an external
//! identity layer.
//!
//! # Modules
//!
//! - [`credential`]: what a peer presents and what the decision was
//! - [`password_file`]: `user:hash` files reloaded when they change
//! - [`policy`]: the [`Authenticator`] itself
//! - [`config`]: serde-loadable [`AuthConfig`]

pub mod config;
pub mod credential;
pub mod password_file;
pub mod policy;

pub use config::{AuthConfig, MechanismConfig};
pub use credential::{Credential, Decision, RejectReason};
pub use password_file::{PasswordCheck, PasswordFile};
pub use policy::{Authenticator, MechanismKind, CURVE_ALLOW_ANY};
