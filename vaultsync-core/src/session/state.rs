//! Session lifecycle states and open outcomes.

use crate::{Result, VaultError};
use chrono::{DateTime, Utc};
use std::fmt;

/// Lifecycle state of the server session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Closed,
    RequestingChallenge,
    Solving,
    Opening,
    Open,
    Closing,
    /// Credentials were revoked. Absorbing until a re-login.
    Deauthorized,
    /// A challenge is pending and the master password is needed to solve it.
    NeedsMasterKey,
}

impl SessionState {
    pub fn is_open(self) -> bool {
        self == Self::Open
    }

    /// Whether the session is between two stable states.
    pub fn is_transitioning(self) -> bool {
        matches!(
            self,
            Self::RequestingChallenge | Self::Solving | Self::Opening | Self::Closing
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::RequestingChallenge => "requesting-challenge",
            Self::Solving => "solving",
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Deauthorized => "deauthorized",
            Self::NeedsMasterKey => "needs-master-key",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open server session. Exists only while the state is [`SessionState::Open`].
#[derive(Clone)]
pub struct Session {
    pub code: String,
    pub opened_at: DateTime<Utc>,
}

impl Session {
    pub fn new(code: String) -> Self {
        Self {
            code,
            opened_at: Utc::now(),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("code", &"[REDACTED]")
            .field("opened_at", &self.opened_at)
            .finish()
    }
}

/// Result of an `open_session` call, shared by every coalesced caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    Opened,
    NeedsMasterKey,
    InvalidMasterKey,
    Deauthorized,
    Failed(VaultError),
}

impl OpenOutcome {
    pub fn is_opened(&self) -> bool {
        matches!(self, Self::Opened)
    }

    /// Convert into a `Result` for callers that prefer `?`.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Opened => Ok(()),
            Self::NeedsMasterKey => Err(VaultError::NeedsMasterKey),
            Self::InvalidMasterKey => Err(VaultError::InvalidMasterKey),
            Self::Deauthorized => Err(VaultError::Deauthorized),
            Self::Failed(e) => Err(e),
        }
    }
}

impl From<VaultError> for OpenOutcome {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::NeedsMasterKey => Self::NeedsMasterKey,
            VaultError::InvalidMasterKey => Self::InvalidMasterKey,
            VaultError::Deauthorized => Self::Deauthorized,
            other => Self::Failed(other),
        }
    }
}
