//! Engine error types
//!
//! [`ConnectError`] keeps the low-level cause of a failed connect attempt as a
//! structured value. It is folded into the closed [`SessionError`] taxonomy by
//! looking at which layer failed, never at the wording of a message.

use std::io;

use thiserror::Error;

use tether_core::{ErrorCode, SessionError, SessionId};

use crate::auth::{AuthError, KeyError};
use crate::channel::ChannelError;

/// Why a shell link could not be established
#[derive(Debug, Error)]
pub enum ConnectError {
    /// TCP connection actively refused
    #[error("Connection refused: {0}")]
    Refused(String),

    /// Host or network unreachable, or the name did not resolve
    #[error("Host unreachable: {0}")]
    Unreachable(String),

    /// Connect or handshake did not finish in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The host key verifier refused the server's key
    #[error("Host key verification failed: {0}")]
    HostKeyRejected(String),

    /// Authentication layer failure
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Session channel could not be set up
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Anything else, message preserved
    #[error("{0}")]
    Other(String),
}

impl From<io::Error> for ConnectError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => ConnectError::Refused(err.to_string()),
            io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
                ConnectError::Unreachable(err.to_string())
            }
            io::ErrorKind::TimedOut => ConnectError::Timeout(err.to_string()),
            _ => ConnectError::Other(err.to_string()),
        }
    }
}

impl From<russh::Error> for ConnectError {
    fn from(err: russh::Error) -> Self {
        match err {
            russh::Error::IO(io_err) => ConnectError::from(io_err),
            russh::Error::ConnectionTimeout => {
                ConnectError::Timeout("SSH connection timed out".to_string())
            }
            russh::Error::UnknownKey => {
                ConnectError::HostKeyRejected("server host key was not accepted".to_string())
            }
            russh::Error::NotAuthenticated | russh::Error::NoAuthMethod => {
                ConnectError::Auth(AuthError::Rejected)
            }
            other => ConnectError::Other(other.to_string()),
        }
    }
}

impl ConnectError {
    /// Taxonomy code for this failure
    pub fn code(&self) -> ErrorCode {
        match self {
            ConnectError::Refused(_) => ErrorCode::ConnectionRefused,
            ConnectError::Unreachable(_) => ErrorCode::HostUnreachable,
            ConnectError::Timeout(_) => ErrorCode::Timeout,
            ConnectError::Auth(AuthError::Key(KeyError::NotFound(_))) => ErrorCode::KeyNotFound,
            ConnectError::Auth(_) => ErrorCode::AuthFailed,
            ConnectError::HostKeyRejected(_) | ConnectError::Channel(_) | ConnectError::Other(_) => {
                ErrorCode::Unknown
            }
        }
    }
}

impl From<ConnectError> for SessionError {
    fn from(err: ConnectError) -> Self {
        SessionError::new(err.code(), err.to_string())
    }
}

/// Errors returned by session and registry operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// The session is not in the `connected` state
    #[error("Session not connected")]
    NotConnected,

    /// No session with this identifier is tracked
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// Channel-level failure
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Lifecycle failure
    #[error(transparent)]
    Session(#[from] SessionError),
}
