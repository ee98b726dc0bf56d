//! Cryptographic primitives used by the session and keychain protocol.
//!
//! Three primitives, all with sizes fixed for wire compatibility:
//! - Argon2id key derivation at interactive cost
//! - Keyed BLAKE2b generic hash
//! - XSalsa20-Poly1305 secretbox (MAC prepended to the ciphertext)

pub mod cipher;
pub mod hash;
pub mod kdf;
pub mod zero;

pub use cipher::{open, random_nonce, seal};
pub use hash::generic_hash;
pub use kdf::{derive_key, derive_key_with, KdfParams};
pub use zero::SecretBytes;

use thiserror::Error;

/// Secretbox nonce length in bytes.
pub const NONCE_LEN: usize = 24;
/// Poly1305 authenticator length in bytes.
pub const MAC_LEN: usize = 16;
/// Secretbox key length in bytes.
pub const KEY_LEN: usize = 32;
/// Length of derived seeds (open secret, keychain decryption key).
pub const SEED_LEN: usize = 32;
/// Argon2id salt length in bytes.
pub const SALT_LEN: usize = 16;
/// Largest generic hash output.
pub const MAX_HASH_LEN: usize = 64;
/// Shortest key accepted by the keyed generic hash.
pub const HASH_KEY_MIN_LEN: usize = 16;
/// Longest key accepted by the keyed generic hash.
pub const HASH_KEY_MAX_LEN: usize = 64;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid {what} length: {got}")]
    InvalidLength { what: &'static str, got: usize },

    #[error("Key derivation failed: {0}")]
    KdfFailed(String),

    #[error("Key derivation could not reserve its working memory")]
    Exhausted,

    #[error("Authentication failed - data may have been tampered with")]
    AuthenticationFailed,

    #[error("Invalid hex encoding: {0}")]
    InvalidHex(String),

    #[error("Decrypted data is not valid UTF-8")]
    InvalidUtf8,
}

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Decode a hex string, mapping failures into [`CryptoError::InvalidHex`].
pub fn decode_hex(value: &str) -> Result<Vec<u8>> {
    hex::decode(value).map_err(|e| CryptoError::InvalidHex(e.to_string()))
}
