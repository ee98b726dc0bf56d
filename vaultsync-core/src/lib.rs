//! Vault Sync Core Library
//!
//! Client core for an end-to-end encrypted password vault: the challenge
//! protocol that opens a server session, the keychain that unlocks
//! encrypted fields, the session lifecycle and revision-based sync into a
//! local cache.

pub mod client;
pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod platform;
pub mod session;
pub mod sync;
pub mod transport;

pub use client::VaultClient;
pub use config::ClientConfig;
pub use crypto::{CryptoError, KdfParams, SecretBytes};
pub use database::{CachedEntity, DatabaseError, LocalStore, MemoryStore, SqliteStore};
pub use error::{Result, UserAction, VaultError};
pub use platform::{get_config_dir, get_data_dir, get_default_cache_path, get_default_config_path};
pub use session::{
    FieldValue, Keychain, MasterPasswordStore, MemoryPasswordStore, OpenOutcome, SessionManager,
    SessionSettings, SessionState,
};
pub use sync::{EntityType, SyncEngine, SyncRecord, SyncReport};
pub use transport::{HttpTransport, Transport, TransportError};
