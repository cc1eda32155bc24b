//! Key material primitives for murmur certificates and authentication.
//!
//! This crate is the only place in the workspace that touches raw key
//! bytes or hashes directly.
//!
//! # Modules
//!
//! - [`z85`]: Z85 base-85 codec used for 40-character armored keys
//! - [`keys`]: CURVE (X25519) keypair generation and secret handling
//! - [`password`]: Argon2id password hashing and constant-time comparison

pub mod keys;
pub mod password;
pub mod z85;

pub use keys::{generate_keypair, PublicKey, SecretKey, ARMORED_KEY_LEN, EMPTY_KEY, KEY_LEN};
