//! Core error types for tether

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Closed failure taxonomy surfaced to callers of the session engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    /// The server rejected the offered credential, or no credential could be offered
    AuthFailed,
    /// Connecting, handshaking or reconnecting took too long
    Timeout,
    /// The host or its network could not be reached
    HostUnreachable,
    /// The host actively refused the connection
    ConnectionRefused,
    /// The configured private key file does not exist
    KeyNotFound,
    /// Anything not classified above
    Unknown,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::AuthFailed => "authFailed",
            ErrorCode::Timeout => "timeout",
            ErrorCode::HostUnreachable => "hostUnreachable",
            ErrorCode::ConnectionRefused => "connectionRefused",
            ErrorCode::KeyNotFound => "keyNotFound",
            ErrorCode::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Typed session failure: a taxonomy code plus a human-readable message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct SessionError {
    /// Failure classification
    pub code: ErrorCode,
    /// Diagnostic message, usually the underlying error text
    pub message: String,
}

impl SessionError {
    /// Create a new session error
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Authentication failure
    pub fn auth_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthFailed, message)
    }

    /// Timeout failure
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    /// Missing private key
    pub fn key_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::KeyNotFound, message)
    }

    /// Unclassified failure, message preserved for diagnostics
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unknown, message)
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Profile lookup failed
    #[error("Unknown profile: {0}")]
    UnknownProfile(String),
}

/// Secret store errors
#[derive(Error, Debug)]
pub enum SecretError {
    /// The backing store could not be read
    #[error("Secret store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        let err = SessionError::auth_failed("Permission denied");
        assert_eq!(err.to_string(), "authFailed: Permission denied");
    }

    #[test]
    fn test_error_code_serde_names() {
        let json = serde_json::to_string(&ErrorCode::HostUnreachable).unwrap();
        assert_eq!(json, r#""hostUnreachable""#);
    }
}
