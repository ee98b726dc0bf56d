//! Argon2id key derivation.
//!
//! Uses Argon2id v1.3 with the "interactive" cost profile:
//! - Memory cost: 64 MiB (65,536 KiB)
//! - Time cost: 2 iterations
//! - Parallelism: 1 lane
//! - Salt length: 16 bytes
//!
//! These match the parameters the server-side protocol was designed
//! around; changing them changes every derived secret.

use crate::crypto::{CryptoError, Result, SecretBytes, SALT_LEN};
use argon2::{Algorithm, Argon2, Block, Params, Version};
use serde::{Deserialize, Serialize};

/// Cost parameters for Argon2id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub mem_cost: u32,

    /// Time cost (number of passes)
    pub time_cost: u32,

    /// Parallelism (number of lanes)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

impl KdfParams {
    /// The wire-compatible interactive profile.
    pub const fn interactive() -> Self {
        Self {
            mem_cost: 65_536, // 64 MiB
            time_cost: 2,
            parallelism: 1,
        }
    }

    /// Verify that parameters are within the ranges Argon2 accepts
    pub fn validate(&self) -> Result<()> {
        if self.parallelism < 1 {
            return Err(CryptoError::KdfFailed(
                "Parallelism too low (minimum: 1)".to_string(),
            ));
        }
        if self.time_cost < 1 {
            return Err(CryptoError::KdfFailed(
                "Time cost too low (minimum: 1)".to_string(),
            ));
        }
        if self.mem_cost < 8 * self.parallelism {
            return Err(CryptoError::KdfFailed(format!(
                "Memory cost too low (minimum: {} KiB)",
                8 * self.parallelism
            )));
        }
        Ok(())
    }
}

/// Derive `out_len` bytes from `input` and a 16-byte `salt` at interactive cost.
pub fn derive_key(input: &[u8], salt: &[u8], out_len: usize) -> Result<SecretBytes> {
    derive_key_with(&KdfParams::interactive(), input, salt, out_len)
}

/// Derive `out_len` bytes from `input` and `salt` with explicit cost parameters.
///
/// The Argon2 working memory is reserved up front with a fallible
/// allocation so that memory pressure surfaces as
/// [`CryptoError::Exhausted`] instead of aborting the process.
pub fn derive_key_with(
    params: &KdfParams,
    input: &[u8],
    salt: &[u8],
    out_len: usize,
) -> Result<SecretBytes> {
    params.validate()?;

    if salt.len() != SALT_LEN {
        return Err(CryptoError::InvalidLength {
            what: "salt",
            got: salt.len(),
        });
    }

    let argon_params = Params::new(
        params.mem_cost,
        params.time_cost,
        params.parallelism,
        Some(out_len),
    )
    .map_err(|e| CryptoError::KdfFailed(format!("Invalid parameters: {}", e)))?;

    let block_count = argon_params.block_count();
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut memory: Vec<Block> = Vec::new();
    memory
        .try_reserve_exact(block_count)
        .map_err(|_| CryptoError::Exhausted)?;
    memory.resize(block_count, Block::default());

    let mut output = vec![0u8; out_len];
    argon2
        .hash_password_into_with_memory(input, salt, &mut output, &mut memory)
        .map_err(|e| CryptoError::KdfFailed(format!("Hashing failed: {}", e)))?;

    Ok(SecretBytes::new(output))
}

#[cfg(test)]
pub(crate) fn fast_params() -> KdfParams {
    KdfParams {
        mem_cost: 64,
        time_cost: 1,
        parallelism: 1,
    }
}
