//! Authentication negotiation
//!
//! The negotiator makes a single offer per connect attempt: the configured
//! password or private key, and only if the server accepts that method. A
//! rejection ends negotiation; there is no credential retry loop.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bitflags::bitflags;
use russh::client::{self, Handle};
use russh_keys::key::KeyPair;
use thiserror::Error;

use tether_core::{AuthMethod, Credential};

use crate::error::ConnectError;

bitflags! {
    /// Authentication methods a server accepts
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AuthMethods: u8 {
        const PASSWORD = 1 << 0;
        const PUBLIC_KEY = 1 << 1;
    }
}

/// Authentication failures
#[derive(Debug, Error)]
pub enum AuthError {
    /// The server rejected the offered credential
    #[error("Authentication rejected by server")]
    Rejected,

    /// The server does not accept the configured method, or the single
    /// attempt was already used
    #[error("Server does not accept the configured authentication method")]
    NoAcceptableMethod,

    /// The private key could not be loaded
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Private key loading failures
#[derive(Debug, Error)]
pub enum KeyError {
    /// Key file does not exist
    #[error("Private key not found at {}", .0.display())]
    NotFound(PathBuf),

    /// Key file exists but could not be read
    #[error("Failed to read private key {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Not a recognizable private key
    #[error("SSH key file has an invalid format: {0}")]
    InvalidKeyFormat(String),

    /// Recognized container, unsupported algorithm
    #[error("SSH key type is not supported: {0}")]
    UnsupportedKeyType(String),

    /// Encrypted key and no passphrase available
    #[error("A passphrase is required for this encrypted key")]
    PassphraseRequired,
}

/// One credential offer
pub enum AuthOffer {
    Password(String),
    PublicKey(Arc<KeyPair>),
}

impl AuthOffer {
    pub fn method(&self) -> AuthMethod {
        match self {
            AuthOffer::Password(_) => AuthMethod::Password,
            AuthOffer::PublicKey(_) => AuthMethod::PublicKey,
        }
    }
}

impl fmt::Debug for AuthOffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthOffer::Password(_) => f.write_str("Password(<redacted>)"),
            AuthOffer::PublicKey(_) => f.write_str("PublicKey(<redacted>)"),
        }
    }
}

/// Single-attempt authentication negotiator
pub struct AuthNegotiator {
    username: String,
    credential: Credential,
    attempted: bool,
}

impl AuthNegotiator {
    pub fn new(username: impl Into<String>, credential: Credential) -> Self {
        Self {
            username: username.into(),
            credential,
            attempted: false,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Decide what to offer given the methods the server accepts.
    ///
    /// Returns `Ok(None)` when negotiation is over: the method is not
    /// accepted, or an offer was already made.
    pub fn next_offer(&mut self, available: AuthMethods) -> Result<Option<AuthOffer>, AuthError> {
        if self.attempted {
            return Ok(None);
        }
        self.attempted = true;

        match &self.credential {
            Credential::Password(password) => {
                if !available.contains(AuthMethods::PASSWORD) {
                    return Ok(None);
                }
                Ok(Some(AuthOffer::Password(password.clone())))
            }
            Credential::PrivateKey { path, passphrase } => {
                if !available.contains(AuthMethods::PUBLIC_KEY) {
                    return Ok(None);
                }
                let key = load_private_key(path, passphrase.as_deref())?;
                Ok(Some(AuthOffer::PublicKey(Arc::new(key))))
            }
        }
    }

    /// Authenticate a freshly handshaken SSH connection
    pub async fn authenticate<H>(&mut self, handle: &mut Handle<H>) -> Result<(), ConnectError>
    where
        H: client::Handler,
    {
        // russh only reports success or failure, not the server's method
        // list, so offer against every method and let the server decide.
        let offer = self
            .next_offer(AuthMethods::all())?
            .ok_or(AuthError::NoAcceptableMethod)?;

        tracing::debug!(
            "Authenticating as '{}' with {}",
            self.username,
            offer.method()
        );

        let accepted = match offer {
            AuthOffer::Password(password) => {
                handle
                    .authenticate_password(self.username.clone(), password)
                    .await?
            }
            AuthOffer::PublicKey(key) => {
                handle
                    .authenticate_publickey(self.username.clone(), key)
                    .await?
            }
        };

        if !accepted {
            tracing::warn!("Server rejected credentials for '{}'", self.username);
            return Err(AuthError::Rejected.into());
        }

        tracing::debug!("Authentication successful");
        Ok(())
    }
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

/// Load and decode an OpenSSH or PEM private key.
///
/// Supported families are the ones russh-keys decodes: Ed25519 and ECDSA
/// (P-256, P-384, P-521).
pub fn load_private_key(path: &Path, passphrase: Option<&str>) -> Result<KeyPair, KeyError> {
    let path = expand_home(path);
    if !path.exists() {
        return Err(KeyError::NotFound(path));
    }

    let bytes = std::fs::read(&path).map_err(|source| KeyError::Unreadable {
        path: path.clone(),
        source,
    })?;
    let text = String::from_utf8(bytes)
        .map_err(|_| KeyError::InvalidKeyFormat("key file is not text".to_string()))?;

    russh_keys::decode_secret_key(&text, passphrase).map_err(|e| match e {
        russh_keys::Error::KeyIsEncrypted => KeyError::PassphraseRequired,
        russh_keys::Error::UnsupportedKeyType {
            key_type_string, ..
        } => KeyError::UnsupportedKeyType(key_type_string),
        other => KeyError::InvalidKeyFormat(other.to_string()),
    })
}
