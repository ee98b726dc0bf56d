//! Zeroizing containers for key material.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Owned secret bytes that are wiped when dropped.
///
/// Used for derived seeds, keychain keys and intermediate hashes. `Debug`
/// prints only the length.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes {
    data: Vec<u8>,
}

impl SecretBytes {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow the raw bytes (use sparingly)
    pub fn expose(&self) -> &[u8] {
        &self.data
    }

    /// Hex-encode the secret. The caller owns the returned string.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.data)
    }
}

impl From<Vec<u8>> for SecretBytes {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl AsRef<[u8]> for SecretBytes {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes([REDACTED; {}])", self.data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_does_not_leak_contents() {
        let secret = SecretBytes::new(vec![0xAB; 4]);
        let rendered = format!("{:?}", secret);
        assert_eq!(rendered, "SecretBytes([REDACTED; 4])");
        assert!(!rendered.contains("ab"));
    }

    #[test]
    fn zeroize_clears_buffer() {
        let mut secret = SecretBytes::new(vec![1, 2, 3, 4, 5]);
        secret.zeroize();
        assert!(secret.is_empty());
    }

    #[test]
    fn to_hex_matches_contents() {
        let secret = SecretBytes::from(vec![0x00, 0xff, 0x10]);
        assert_eq!(secret.len(), 3);
        assert_eq!(secret.to_hex(), "00ff10");
    }
}
