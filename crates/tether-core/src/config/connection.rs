//! Connection metadata and the per-attempt configuration snapshot

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;
use crate::error::ConfigError;
use crate::types::{AuthMethod, ConnectionId, Credential};

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Stored connection metadata.
///
/// Persistence belongs to whoever owns the profile (the config file for the
/// CLI); the engine only ever reads it to build a [`ConnectionConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionProfile {
    /// Identifier used to key secrets for this connection. Left out of the
    /// file, it is derived from the profile's table key on load.
    #[serde(default = "ConnectionId::nil")]
    pub id: ConnectionId,

    /// Display name
    pub name: String,

    /// Remote host name or address
    pub host: String,

    /// Remote SSH port
    pub port: u16,

    /// Remote user
    pub username: String,

    /// How to authenticate
    pub auth_method: AuthMethod,

    /// Private key path for public key authentication
    pub key_path: Option<PathBuf>,

    /// Connection timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// SSH keepalive interval (0 disables keepalives)
    #[serde(with = "duration_secs")]
    pub keepalive_interval: Duration,
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        Self {
            id: ConnectionId::new(),
            name: String::new(),
            host: String::new(),
            port: DEFAULT_SSH_PORT,
            username: whoami::username(),
            auth_method: AuthMethod::Password,
            key_path: None,
            connect_timeout: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(60),
        }
    }
}

impl ConnectionProfile {
    /// Create a profile with default port, auth method and timeouts
    pub fn new(name: impl Into<String>, host: impl Into<String>, username: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: ConnectionId::for_profile(&name),
            name,
            host: host.into(),
            username: username.into(),
            ..Default::default()
        }
    }

    /// Parse an ad-hoc `[user@]host[:port]` target.
    ///
    /// IPv6 addresses are written bare (`::1`, always port 22) or bracketed
    /// (`[::1]:2222`).
    pub fn parse_target(target: &str) -> Result<Self, ConfigError> {
        let invalid = |what: &str| ConfigError::Invalid(format!("{} in '{}'", what, target));
        let parse_port = |port: &str| port.parse::<u16>().map_err(|_| invalid("Invalid port"));

        let (username, rest) = match target.rsplit_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user), rest),
            Some(_) => return Err(ConfigError::Invalid(format!("Empty user in '{}'", target))),
            None => (None, target),
        };

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, after) = bracketed
                .split_once(']')
                .ok_or_else(|| invalid("Unclosed '['"))?;
            match after {
                "" => (host, DEFAULT_SSH_PORT),
                _ => match after.strip_prefix(':') {
                    Some(port) => (host, parse_port(port)?),
                    None => return Err(invalid("Unexpected text after ']'")),
                },
            }
        } else {
            match rest.split_once(':') {
                Some((host, port)) if !port.contains(':') => (host, parse_port(port)?),
                _ => (rest, DEFAULT_SSH_PORT),
            }
        };

        let mut profile = Self {
            id: ConnectionId::for_profile(target),
            name: target.to_string(),
            host: host.to_string(),
            port,
            ..Default::default()
        };
        if let Some(user) = username {
            profile.username = user.to_string();
        }
        profile.validate()?;
        Ok(profile)
    }

    /// Check that the profile can be connected to
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".to_string()));
        }
        if self.username.trim().is_empty() {
            return Err(ConfigError::Invalid("username must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must not be 0".to_string()));
        }
        Ok(())
    }

    /// `user@host`, with `:port` when it is not the default
    pub fn display_address(&self) -> String {
        let host = bracket_ipv6(&self.host);
        if self.port == DEFAULT_SSH_PORT {
            format!("{}@{}", self.username, host)
        } else {
            format!("{}@{}:{}", self.username, host, self.port)
        }
    }

    /// Take an immutable snapshot for one connect cycle
    pub fn snapshot(&self, credential: Credential) -> ConnectionConfig {
        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            credential,
            connect_timeout: self.connect_timeout,
            keepalive_interval: self.keepalive_interval,
        }
    }
}

/// Immutable snapshot of everything needed to (re)connect a session
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credential: Credential,
    pub connect_timeout: Duration,
    pub keepalive_interval: Duration,
}

impl ConnectionConfig {
    /// Snapshot with the default timeouts (30 s connect, 60 s keepalive)
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        credential: Credential,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            credential,
            connect_timeout: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(60),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// `host:port` for logging and socket resolution
    pub fn address(&self) -> String {
        format!("{}:{}", bracket_ipv6(&self.host), self.port)
    }
}

/// IPv6 literals need brackets before a `:port` can follow them
fn bracket_ipv6(host: &str) -> Cow<'_, str> {
    if host.contains(':') && !host.starts_with('[') {
        Cow::Owned(format!("[{}]", host))
    } else {
        Cow::Borrowed(host)
    }
}
