//! Transport seam between the session/sync core and the server API.
//!
//! The core only talks to [`Transport`]; [`http::HttpTransport`] is the
//! production implementation. Transports never retry on their own: retry
//! policy lives in the session manager and sync engine.

pub mod http;
#[cfg(test)]
pub(crate) mod mock;

use crate::session::challenge::Challenge;
use crate::session::keychain::KeychainEnvelope;
use crate::sync::models::{EntityType, SyncRecord};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use http::HttpTransport;

/// Failures reported by a transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("TLS validation failed: {0}")]
    Tls(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Server returned HTTP {0}")]
    Status(u16),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl TransportError {
    /// The HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status(code) => Some(*code),
            _ => None,
        }
    }
}

/// Result type for transport calls
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Response of a successful call to the session "open" endpoint.
#[derive(Debug, Clone, Default)]
pub struct OpenedSession {
    /// Session code from the session header. `None` when the server omitted it.
    pub session_code: Option<String>,
    /// Encrypted keychain, present when client-side encryption is set up.
    pub keychain: Option<KeychainEnvelope>,
    /// Session lifetime advertised by the server.
    pub lifetime: Option<Duration>,
}

/// Server API consumed by the session manager and the sync engine.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Ask the server for a session challenge.
    async fn request_challenge(&self) -> TransportResult<Challenge>;

    /// Post the solved challenge secret and open a session.
    async fn open_session(&self, secret: &str) -> TransportResult<OpenedSession>;

    /// Extend the lifetime of an open session.
    async fn keep_alive(&self, session_code: &str) -> TransportResult<()>;

    /// Close a session on the server.
    async fn close_session(&self, session_code: &str) -> TransportResult<()>;

    /// List every entity of one type, as raw records.
    async fn list_entities(
        &self,
        entity_type: EntityType,
        session_code: Option<&str>,
    ) -> TransportResult<Vec<SyncRecord>>;
}
