//! Challenge solving: master password + server salts → session open secret.
//!
//! ```text
//! mixed   = password || hex(salt_password)
//! generic = BLAKE2b(mixed, key = hex(salt_generic_hash_key), 64)
//! derived = Argon2id(generic, salt = hex(salt_password_hash), 32)
//! secret  = hex(derived)
//! ```
//!
//! The master password itself never leaves the client.

use crate::crypto::{self, KdfParams, CryptoError, MAX_HASH_LEN, SEED_LEN};
use crate::{Result, VaultError};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// The three hex salts of a session challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeSalts {
    pub password: String,
    pub generic_hash_key: String,
    pub password_hash: String,
}

/// A server-issued session challenge.
///
/// A challenge without salts means the account does not use client-side
/// encryption and no secret has to be derived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Challenge {
    salts: Option<ChallengeSalts>,
}

impl Challenge {
    pub fn new(
        password: impl Into<String>,
        generic_hash_key: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        let salts = ChallengeSalts {
            password: password.into(),
            generic_hash_key: generic_hash_key.into(),
            password_hash: password_hash.into(),
        };
        let empty = salts.password.is_empty()
            && salts.generic_hash_key.is_empty()
            && salts.password_hash.is_empty();

        Self {
            salts: (!empty).then_some(salts),
        }
    }

    /// A challenge for an account without client-side encryption.
    pub fn none() -> Self {
        Self { salts: None }
    }

    pub fn salts(&self) -> Option<&ChallengeSalts> {
        self.salts.as_ref()
    }

    /// Whether solving this challenge needs the master password.
    pub fn requires_password(&self) -> bool {
        self.salts.is_some()
    }
}

/// Hex secret posted to the session open endpoint. Wiped on drop.
#[derive(Clone, Default)]
pub struct OpenSecret(Zeroizing<String>);

impl OpenSecret {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for OpenSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OpenSecret([REDACTED])")
    }
}

/// Solve a challenge at the wire-compatible interactive KDF cost.
pub fn solve(challenge: &Challenge, master_password: Option<&SecretString>) -> Result<OpenSecret> {
    solve_with(&KdfParams::interactive(), challenge, master_password)
}

/// Solve a challenge with explicit KDF parameters.
///
/// Pure and deterministic: identical inputs always produce the same
/// secret. The KDF is never invoked for a challenge without salts.
pub fn solve_with(
    params: &KdfParams,
    challenge: &Challenge,
    master_password: Option<&SecretString>,
) -> Result<OpenSecret> {
    let Some(salts) = challenge.salts() else {
        return Ok(OpenSecret::default());
    };
    let password = master_password.ok_or(VaultError::NeedsMasterKey)?;

    let salt_password = decode_salt(&salts.password, "password")?;
    let hash_key = decode_salt(&salts.generic_hash_key, "generic hash key")?;
    let kdf_salt = decode_salt(&salts.password_hash, "password hash")?;

    let mut mixed = Zeroizing::new(Vec::with_capacity(
        password.expose_secret().len() + salt_password.len(),
    ));
    mixed.extend_from_slice(password.expose_secret().as_bytes());
    mixed.extend_from_slice(&salt_password);

    let generic = crypto::generic_hash(&mixed, &hash_key, MAX_HASH_LEN).map_err(bad_challenge)?;
    let derived = crypto::derive_key_with(params, generic.expose(), &kdf_salt, SEED_LEN)
        .map_err(bad_challenge)?;

    Ok(OpenSecret(Zeroizing::new(derived.to_hex())))
}

fn decode_salt(value: &str, which: &str) -> Result<Vec<u8>> {
    hex::decode(value)
        .map_err(|e| VaultError::BadResponse(format!("Invalid {} salt: {}", which, e)))
}

fn bad_challenge(e: CryptoError) -> VaultError {
    match e {
        CryptoError::Exhausted => VaultError::CryptoExhausted,
        other => VaultError::BadResponse(format!("Unusable challenge: {}", other)),
    }
}
