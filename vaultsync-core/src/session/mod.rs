//! Server session: challenge solving, keychain handling and the session
//! lifecycle.

pub mod challenge;
pub mod credentials;
pub mod keepalive;
pub mod keychain;
pub mod manager;
pub mod state;

pub use challenge::{Challenge, OpenSecret};
pub use credentials::{MasterPasswordStore, MemoryPasswordStore, NoPasswordStore};
pub use keepalive::KeepAlivePolicy;
pub use keychain::{FieldValue, Keychain, KeychainEnvelope};
pub use manager::{SessionManager, SessionSettings};
pub use state::{OpenOutcome, Session, SessionState};
