//! XSalsa20-Poly1305 secretbox encryption.
//!
//! Uses XSalsa20-Poly1305 with:
//! - 256-bit key
//! - 192-bit (24 byte) nonce
//! - 128-bit authenticator, prepended to the ciphertext
//!
//! The output layout is `mac(16) || ciphertext`, identical to libsodium's
//! `crypto_secretbox_easy`, so values produced by other clients of the
//! same vault decrypt here and vice versa.

use crate::crypto::{CryptoError, Result, KEY_LEN, MAC_LEN, NONCE_LEN};
use crypto_secretbox::aead::{self, Aead, KeyInit};
use crypto_secretbox::XSalsa20Poly1305;
use rand::rngs::OsRng;
use rand::RngCore;

fn cipher_for(key: &[u8]) -> Result<XSalsa20Poly1305> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidLength {
            what: "key",
            got: key.len(),
        });
    }
    Ok(XSalsa20Poly1305::new(aead::Key::<XSalsa20Poly1305>::from_slice(key)))
}

fn check_nonce(nonce: &[u8]) -> Result<&aead::Nonce<XSalsa20Poly1305>> {
    if nonce.len() != NONCE_LEN {
        return Err(CryptoError::InvalidLength {
            what: "nonce",
            got: nonce.len(),
        });
    }
    Ok(aead::Nonce::<XSalsa20Poly1305>::from_slice(nonce))
}

/// Generate a fresh random nonce from the OS RNG.
pub fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt and authenticate `plaintext`.
///
/// Returns `mac(16) || ciphertext`. Never reuse a nonce with the same key.
pub fn seal(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher_for(key)?;
    let nonce = check_nonce(nonce)?;

    cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// Verify and decrypt `ciphertext_with_mac`.
///
/// Fails with [`CryptoError::AuthenticationFailed`] if the authenticator
/// does not verify; never returns unauthenticated plaintext.
pub fn open(key: &[u8], nonce: &[u8], ciphertext_with_mac: &[u8]) -> Result<Vec<u8>> {
    if ciphertext_with_mac.len() < MAC_LEN {
        return Err(CryptoError::InvalidLength {
            what: "ciphertext",
            got: ciphertext_with_mac.len(),
        });
    }

    let cipher = cipher_for(key)?;
    let nonce = check_nonce(nonce)?;

    cipher
        .decrypt(nonce, ciphertext_with_mac)
        .map_err(|_| CryptoError::AuthenticationFailed)
}
