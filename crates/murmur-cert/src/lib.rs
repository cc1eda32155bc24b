//! CURVE certificates and certificate stores.
//!
//! # Modules
//!
//! - [`cert`]: [`Certificate`] with its keypair, metadata and persistence
//! - [`store`]: [`CertStore`], lookup by armored public key, optionally
//!   mirroring a directory of certificate files
//!
//! The on-disk text format is private to this crate; see the `format`
//! module for its layout.

pub mod cert;
mod format;
pub mod store;

pub use cert::{secret_path, Certificate, MetaUpdatePolicy, META_UPDATE_POLICY};
pub use store::CertStore;
