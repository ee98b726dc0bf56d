//! Error taxonomy shared by the session, keychain and sync layers.

use crate::crypto::CryptoError;
use crate::database::DatabaseError;
use crate::transport::TransportError;
use thiserror::Error;

/// Result type for vault client operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// General error type for vault client operations.
///
/// Every variant carries owned data only so that a single outcome can be
/// handed to several waiters (see [`crate::session::OpenOutcome`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("Request timed out: {0}")]
    NetworkTimeout(String),

    #[error("TLS validation failed: {0}")]
    TlsValidationFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected server response: {0}")]
    BadResponse(String),

    #[error("Client is no longer authorized; log in again")]
    Deauthorized,

    #[error("Master password required")]
    NeedsMasterKey,

    #[error("Master password rejected")]
    InvalidMasterKey,

    #[error("Keychain decrypted but its contents are corrupted: {0}")]
    CorruptedKeychain(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Key {0} is not in the keychain")]
    UnknownKey(String),

    #[error("No open session")]
    NoSession,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Key derivation ran out of resources")]
    CryptoExhausted,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// What the presentation layer should do about an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    /// Ask for the master password (again).
    PromptMasterPassword,
    /// Credentials were revoked; a full re-login is required.
    Relogin,
    /// Transient; report and allow the user to retry.
    Retry,
}

impl VaultError {
    pub fn user_action(&self) -> UserAction {
        match self {
            Self::NeedsMasterKey | Self::InvalidMasterKey => UserAction::PromptMasterPassword,
            Self::Deauthorized => UserAction::Relogin,
            _ => UserAction::Retry,
        }
    }

    /// Whether this error stems from the network rather than the data.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout(_) | Self::Network(_) | Self::TlsValidationFailed(_)
        )
    }
}

impl From<CryptoError> for VaultError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::Exhausted => Self::CryptoExhausted,
            other => Self::DecryptionFailed(other.to_string()),
        }
    }
}

impl From<TransportError> for VaultError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout(msg) => Self::NetworkTimeout(msg),
            TransportError::Tls(msg) => Self::TlsValidationFailed(msg),
            TransportError::Connect(msg) => Self::Network(msg),
            TransportError::Status(403) => Self::Deauthorized,
            TransportError::Status(code) => Self::BadResponse(format!("HTTP status {}", code)),
            TransportError::Malformed(msg) => Self::BadResponse(msg),
        }
    }
}

impl From<DatabaseError> for VaultError {
    fn from(e: DatabaseError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<std::io::Error> for VaultError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
