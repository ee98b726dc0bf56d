//! Keychain envelope and per-field encryption.
//!
//! Envelope layout (hex-encoded on the wire):
//! `kdf_salt(16) || nonce(24) || mac(16) || ciphertext`
//!
//! Field layout (hex-encoded): `nonce(24) || mac(16) || ciphertext`

use crate::crypto::{self, CryptoError, KdfParams, SecretBytes, KEY_LEN, MAC_LEN, NONCE_LEN, SALT_LEN, SEED_LEN};
use crate::{Result, VaultError};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use zeroize::Zeroizing;

/// Envelope entry understood by this protocol version.
pub const CSE_V1R1: &str = "CSEv1r1";

/// Raw keychain payload as returned by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeychainEnvelope {
    /// Envelope type → hex ciphertext. Only [`CSE_V1R1`] is read.
    #[serde(default)]
    pub keys: BTreeMap<String, String>,
    #[serde(default)]
    pub current: Option<String>,
}

/// Decrypted keychain: key id → raw key bytes, plus the key used for new writes.
#[derive(Debug, Clone, Default)]
pub struct Keychain {
    keys: HashMap<String, SecretBytes>,
    current: Option<String>,
}

/// Plaintext JSON inside the envelope.
#[derive(Serialize, Deserialize)]
struct KeychainPlaintext {
    keys: HashMap<String, String>,
    current: String,
}

impl Keychain {
    /// Keychain of an account without client-side encryption.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a keychain from raw 32-byte keys.
    pub fn from_keys(keys: HashMap<String, SecretBytes>, current: impl Into<String>) -> Self {
        Self {
            keys,
            current: Some(current.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn contains(&self, key_id: &str) -> bool {
        self.keys.contains_key(key_id)
    }

    /// Id of the key used for new writes.
    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn key(&self, key_id: &str) -> Option<&SecretBytes> {
        self.keys.get(key_id)
    }

    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

/// Outcome of decrypting a single field.
#[derive(Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// The plaintext (or the unencrypted value as stored).
    Plain(Zeroizing<String>),
    /// The field uses a key the current keychain does not hold; it becomes
    /// readable once the keychain is (re)loaded.
    AwaitingKeychain,
}

impl FieldValue {
    pub fn plain(&self) -> Option<&str> {
        match self {
            Self::Plain(value) => Some(value.as_str()),
            Self::AwaitingKeychain => None,
        }
    }
}

impl std::fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("Plain([REDACTED])"),
            Self::AwaitingKeychain => f.write_str("AwaitingKeychain"),
        }
    }
}

/// Decrypt the keychain envelope at the interactive KDF cost.
pub fn decrypt_envelope(envelope: &KeychainEnvelope, master_password: &SecretString) -> Result<Keychain> {
    decrypt_envelope_with(&KdfParams::interactive(), envelope, master_password)
}

/// Decrypt the keychain envelope with explicit KDF parameters.
///
/// An authenticator failure means the master password is wrong
/// ([`VaultError::InvalidMasterKey`]); malformed JSON behind a valid
/// authenticator means the keychain itself is damaged
/// ([`VaultError::CorruptedKeychain`]).
pub fn decrypt_envelope_with(
    params: &KdfParams,
    envelope: &KeychainEnvelope,
    master_password: &SecretString,
) -> Result<Keychain> {
    let Some(ciphertext) = envelope.keys.get(CSE_V1R1) else {
        return Ok(Keychain::empty());
    };

    let raw = hex::decode(ciphertext)
        .map_err(|e| VaultError::BadResponse(format!("Keychain is not hex: {}", e)))?;
    if raw.len() < SALT_LEN + NONCE_LEN + MAC_LEN {
        return Err(VaultError::BadResponse(format!(
            "Keychain too short: {} bytes",
            raw.len()
        )));
    }

    let (key_salt, payload) = raw.split_at(SALT_LEN);
    let decryption_key =
        crypto::derive_key_with(params, master_password.expose_secret().as_bytes(), key_salt, SEED_LEN)
            .map_err(|e| match e {
                CryptoError::Exhausted => VaultError::CryptoExhausted,
                other => VaultError::BadResponse(other.to_string()),
            })?;

    let (nonce, cipher) = payload.split_at(NONCE_LEN);
    let plaintext = Zeroizing::new(
        crypto::open(decryption_key.expose(), nonce, cipher).map_err(|e| match e {
            CryptoError::AuthenticationFailed => VaultError::InvalidMasterKey,
            other => VaultError::BadResponse(other.to_string()),
        })?,
    );

    let parsed: KeychainPlaintext = serde_json::from_slice(&plaintext)
        .map_err(|e| VaultError::CorruptedKeychain(e.to_string()))?;

    let mut keys = HashMap::with_capacity(parsed.keys.len());
    for (id, hex_key) in parsed.keys {
        let key = Zeroizing::new(hex_key);
        let bytes = hex::decode(key.as_str())
            .map_err(|_| VaultError::CorruptedKeychain(format!("Key {} is not hex", id)))?;
        if bytes.len() != KEY_LEN {
            return Err(VaultError::CorruptedKeychain(format!(
                "Key {} has {} bytes",
                id,
                bytes.len()
            )));
        }
        keys.insert(id, SecretBytes::new(bytes));
    }

    if !keys.contains_key(&parsed.current) {
        return Err(VaultError::CorruptedKeychain(format!(
            "Current key {} is missing",
            parsed.current
        )));
    }

    Ok(Keychain::from_keys(keys, parsed.current))
}

/// Encrypt a keychain into a [`CSE_V1R1`] envelope under the master password.
///
/// Inverse of [`decrypt_envelope_with`]; used to persist a keychain at rest.
pub fn seal_envelope_with(
    params: &KdfParams,
    keychain: &Keychain,
    master_password: &SecretString,
) -> Result<KeychainEnvelope> {
    let current = keychain
        .current_id()
        .ok_or_else(|| VaultError::CorruptedKeychain("No current key".to_string()))?;

    let plain = KeychainPlaintext {
        keys: keychain
            .keys
            .iter()
            .map(|(id, key)| (id.clone(), key.to_hex()))
            .collect(),
        current: current.to_string(),
    };
    let json = Zeroizing::new(
        serde_json::to_vec(&plain).map_err(|e| VaultError::CorruptedKeychain(e.to_string()))?,
    );

    let salt: [u8; SALT_LEN] = rand::random();
    let key = crypto::derive_key_with(params, master_password.expose_secret().as_bytes(), &salt, SEED_LEN)?;
    let nonce = crypto::random_nonce();
    let sealed = crypto::seal(key.expose(), &nonce, &json)?;

    let mut raw = Vec::with_capacity(SALT_LEN + NONCE_LEN + sealed.len());
    raw.extend_from_slice(&salt);
    raw.extend_from_slice(&nonce);
    raw.extend_from_slice(&sealed);

    let mut keys = BTreeMap::new();
    keys.insert(CSE_V1R1.to_string(), hex::encode(raw));
    Ok(KeychainEnvelope {
        keys,
        current: Some(CSE_V1R1.to_string()),
    })
}

/// Decrypt one encrypted field.
///
/// Empty values and empty key ids are returned unchanged: the field was
/// never encrypted. A key id the keychain does not hold yields
/// [`FieldValue::AwaitingKeychain`] rather than an error.
pub fn decrypt_field(value: &str, key_id: &str, keychain: &Keychain) -> Result<FieldValue> {
    if value.is_empty() || key_id.is_empty() {
        return Ok(FieldValue::Plain(Zeroizing::new(value.to_string())));
    }

    let Some(key) = keychain.key(key_id) else {
        return Ok(FieldValue::AwaitingKeychain);
    };

    let raw = crypto::decode_hex(value)?;
    if raw.len() < NONCE_LEN + MAC_LEN {
        return Err(VaultError::DecryptionFailed(format!(
            "Field too short: {} bytes",
            raw.len()
        )));
    }

    let (nonce, cipher) = raw.split_at(NONCE_LEN);
    let plaintext = crypto::open(key.expose(), nonce, cipher)?;
    let text = String::from_utf8(plaintext)
        .map_err(|_| VaultError::from(CryptoError::InvalidUtf8))?;

    Ok(FieldValue::Plain(Zeroizing::new(text)))
}

/// Encrypt one field with the keychain entry `key_id`.
pub fn encrypt_field(value: &str, key_id: &str, keychain: &Keychain) -> Result<String> {
    if value.is_empty() {
        return Ok(String::new());
    }

    let key = keychain
        .key(key_id)
        .ok_or_else(|| VaultError::UnknownKey(key_id.to_string()))?;

    let nonce = crypto::random_nonce();
    let sealed = crypto::seal(key.expose(), &nonce, value.as_bytes())?;

    let mut raw = Vec::with_capacity(NONCE_LEN + sealed.len());
    raw.extend_from_slice(&nonce);
    raw.extend_from_slice(&sealed);
    Ok(hex::encode(raw))
}

/// Encrypt one field with the keychain's current key.
///
/// Returns the ciphertext and the id of the key that was used.
pub fn encrypt_field_current(value: &str, keychain: &Keychain) -> Result<(String, String)> {
    let key_id = keychain.current_id().ok_or(VaultError::NeedsMasterKey)?;
    Ok((encrypt_field(value, key_id, keychain)?, key_id.to_string()))
}
