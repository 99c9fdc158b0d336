//! tether-core: Core abstractions and configuration for tether
//!
//! This crate provides the shared domain types, the session error taxonomy,
//! configuration structures and the secret store abstraction used by the
//! SSH engine and the CLI.

pub mod config;
pub mod error;
pub mod secrets;
pub mod types;

pub use error::{ErrorCode, SessionError};
pub use types::{
    AuthMethod, ConnectionId, Credential, SessionId, SessionState, StatusLevel, TerminalSize,
};
