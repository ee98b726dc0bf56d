//! Keyed BLAKE2b generic hash.

use crate::crypto::{CryptoError, Result, SecretBytes, HASH_KEY_MAX_LEN, HASH_KEY_MIN_LEN};
use blake2::digest::consts::{U16, U32, U64};
use blake2::digest::Mac;
use blake2::Blake2bMac;

/// Compute a keyed BLAKE2b digest of `input`.
///
/// `key` must be 16 to 64 bytes. `out_len` must be 16, 32 or 64; the
/// protocol only ever asks for the 64-byte maximum.
pub fn generic_hash(input: &[u8], key: &[u8], out_len: usize) -> Result<SecretBytes> {
    if !(HASH_KEY_MIN_LEN..=HASH_KEY_MAX_LEN).contains(&key.len()) {
        return Err(CryptoError::InvalidLength {
            what: "generic hash key",
            got: key.len(),
        });
    }

    let digest = match out_len {
        16 => keyed::<Blake2bMac<U16>>(input, key)?,
        32 => keyed::<Blake2bMac<U32>>(input, key)?,
        64 => keyed::<Blake2bMac<U64>>(input, key)?,
        other => {
            return Err(CryptoError::InvalidLength {
                what: "generic hash output",
                got: other,
            })
        }
    };

    Ok(SecretBytes::new(digest))
}

fn keyed<M: Mac + blake2::digest::KeyInit>(input: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let mut mac = <M as blake2::digest::KeyInit>::new_from_slice(key).map_err(|_| {
        CryptoError::InvalidLength {
            what: "generic hash key",
            got: key.len(),
        }
    })?;
    Mac::update(&mut mac, input);
    Ok(mac.finalize().into_bytes().to_vec())
}
