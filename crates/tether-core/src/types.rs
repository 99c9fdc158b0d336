//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::SessionError;

/// Unique identifier for a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a fresh random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the stored connection a session was opened from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

/// Namespace for IDs derived from profile names
const PROFILE_NAMESPACE: Uuid = Uuid::from_u128(0x5d1c_7e42_0a9b_4f3e_b6a1_93c0_2e8f_4d17);

impl ConnectionId {
    /// Generate a fresh random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Stable ID for a named profile: equal names give equal IDs
    pub fn for_profile(name: &str) -> Self {
        Self(Uuid::new_v5(&PROFILE_NAMESPACE, name.as_bytes()))
    }

    /// Placeholder for "not assigned yet"
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authentication method configured for a connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthMethod {
    /// Password authentication
    #[default]
    Password,
    /// Private key (public key) authentication
    PublicKey,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Password => write!(f, "password"),
            AuthMethod::PublicKey => write!(f, "publicKey"),
        }
    }
}

/// Credential pulled from the secret store at open time.
///
/// Never serialized, and `Debug` never prints the secret material.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Plain password
    Password(String),
    /// Private key file with an optional passphrase
    PrivateKey {
        path: PathBuf,
        passphrase: Option<String>,
    },
}

impl Credential {
    /// The authentication method this credential is used with
    pub fn method(&self) -> AuthMethod {
        match self {
            Credential::Password(_) => AuthMethod::Password,
            Credential::PrivateKey { .. } => AuthMethod::PublicKey,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password(_) => f.write_str("Password(<redacted>)"),
            Credential::PrivateKey { path, passphrase } => f
                .debug_struct("PrivateKey")
                .field("path", path)
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

/// Terminal dimensions in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// Both dimensions are non-zero
    pub fn is_valid(&self) -> bool {
        self.cols > 0 && self.rows > 0
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Session has not been started
    #[default]
    Idle,
    /// Establishing the connection
    Connecting,
    /// Shell is live
    Connected,
    /// Waiting to retry; `attempt` counts from 1
    Reconnecting { attempt: u32 },
    /// Connection failed
    Failed(SessionError),
    /// Session was closed, locally or by the remote end
    Disconnected,
}

/// Semantic status for indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Ok,
    Pending,
    Error,
    None,
}

impl SessionState {
    /// Whether the session is holding or acquiring network resources
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::Connected | SessionState::Reconnecting { .. }
        )
    }

    /// Whether the shell is live
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }

    pub fn status(&self) -> StatusLevel {
        match self {
            SessionState::Connected => StatusLevel::Ok,
            SessionState::Reconnecting { .. } => StatusLevel::Pending,
            SessionState::Failed(_) => StatusLevel::Error,
            _ => StatusLevel::None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Reconnecting { attempt } => write!(f, "reconnecting ({})", attempt),
            SessionState::Failed(err) => write!(f, "failed ({})", err),
            SessionState::Disconnected => write!(f, "disconnected"),
        }
    }
}
