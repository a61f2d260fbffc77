//! Password key derivation.
//!
//! Passwords are never stored. Each password set draws a fresh random salt
//! and stores the Argon2id output; verification recomputes the key and
//! compares it in constant time.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::{RngCore, rngs::OsRng};
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};

/// Length of the per-user random salt, in bytes.
pub const SALT_LEN: usize = 32;

/// Length of the derived key, in bytes.
pub const KEY_LEN: usize = 64;

// OWASP's minimum Argon2id configuration: 19 MiB, 2 passes, 1 lane.
const MEMORY_KIB: u32 = 19 * 1024;
const ITERATIONS: u32 = 2;
const LANES: u32 = 1;

/// A salt and the key derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKey {
    pub salt: Vec<u8>,
    pub key: Vec<u8>,
}

fn hasher() -> Result<Argon2<'static>> {
    let params = Params::new(MEMORY_KIB, ITERATIONS, LANES, Some(KEY_LEN))
        .map_err(|e| Error::Credential(e.to_string()))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Derive a key for `password` under a freshly generated salt.
pub fn derive(password: &str) -> Result<DerivedKey> {
    let mut salt = vec![0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let key = derive_with_salt(password, &salt)?;
    Ok(DerivedKey { salt, key })
}

/// Derive the key for `password` under an existing salt.
pub fn derive_with_salt(password: &str, salt: &[u8]) -> Result<Vec<u8>> {
    let mut key = vec![0u8; KEY_LEN];
    hasher()?
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| Error::Credential(e.to_string()))?;
    Ok(key)
}

/// Check `password` against a stored salt and key.
pub fn verify(password: &str, salt: &[u8], key: &[u8]) -> Result<bool> {
    let candidate = derive_with_salt(password, salt)?;
    Ok(candidate.ct_eq(key).into())
}
