//! Password hashing for PLAIN authentication files.
//!
//! Password files store `user:hash` lines where `hash` is an Argon2id
//! PHC string (`$argon2id$v=19$m=...,t=...,p=...$salt$digest`) with a
//! random per-entry salt. The cost parameters travel inside the string,
//! so entries hashed with different [`PasswordHashParams`] verify side
//! by side.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use murmur_types::{MurmurError, Result};
use rand::rngs::OsRng;

// ---------------------------------------------------------------------------
// PasswordHashParams
// ---------------------------------------------------------------------------

/// Argon2id cost parameters for new password hashes.
///
/// # Defaults
///
/// | Parameter | Default | Meaning |
/// |-----------|---------|---------|
/// | `m_cost`  | 19 456  | Memory usage in KiB (19 MiB) |
/// | `t_cost`  | 2       | Number of iterations |
/// | `p_cost`  | 1       | Degree of parallelism |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PasswordHashParams {
    /// Memory cost in KiB. Must be at least 8 × `p_cost`.
    pub m_cost: u32,
    /// Time cost (number of passes). Must be at least 1.
    pub t_cost: u32,
    /// Parallelism degree. Must be at least 1.
    pub p_cost: u32,
}

impl Default for PasswordHashParams {
    fn default() -> Self {
        Self {
            m_cost: Params::DEFAULT_M_COST,
            t_cost: Params::DEFAULT_T_COST,
            p_cost: Params::DEFAULT_P_COST,
        }
    }
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Hashes `password` with the default parameters into the form stored in
/// password files.
///
/// # Errors
///
/// [`MurmurError::CryptoError`] if hashing fails.
pub fn hash_password(password: &str) -> Result<String> {
    hash_password_with(password, &PasswordHashParams::default())
}

/// Hashes `password` with explicit cost parameters and a fresh salt.
///
/// # Errors
///
/// [`MurmurError::ConfigError`] for parameters Argon2 refuses, and
/// [`MurmurError::CryptoError`] if hashing fails.
pub fn hash_password_with(password: &str, params: &PasswordHashParams) -> Result<String> {
    let argon2_params = Params::new(params.m_cost, params.t_cost, params.p_cost, None)
        .map_err(|e| MurmurError::ConfigError {
            reason: format!("invalid Argon2 parameters: {e}"),
        })?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| MurmurError::CryptoError {
            reason: format!("password hashing failed: {e}"),
        })?;
    Ok(hash.to_string())
}

/// Returns `true` if `stored` is an Argon2 PHC string.
pub fn is_password_hash(stored: &str) -> bool {
    PasswordHash::new(stored)
        .map(|hash| hash.algorithm.as_str().starts_with("argon2"))
        .unwrap_or(false)
}

/// Checks `password` against a stored PHC string.
///
/// A stored value that does not parse never verifies.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(hash) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &hash)
        .is_ok()
}

/// Compares two byte slices in constant time.
///
/// Returns `false` immediately when lengths differ; the length of a
/// key is not secret.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
