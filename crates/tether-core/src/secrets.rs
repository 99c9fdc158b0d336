//! Credential lookup
//!
//! Secrets live in an external store keyed by connection ID. The engine only
//! reads them at open time to build a [`Credential`]; it never writes them.

use dashmap::DashMap;

use crate::config::ConnectionProfile;
use crate::error::{SecretError, SessionError};
use crate::types::{AuthMethod, ConnectionId, Credential};

/// Read access to stored secrets
pub trait SecretStore: Send + Sync {
    /// Password for a connection, if one is stored
    fn password(&self, connection: ConnectionId) -> Result<Option<String>, SecretError>;

    /// Passphrase for the connection's private key, if one is stored
    fn passphrase(&self, connection: ConnectionId) -> Result<Option<String>, SecretError>;
}

/// In-process secret store
#[derive(Default)]
pub struct MemorySecretStore {
    passwords: DashMap<ConnectionId, String>,
    passphrases: DashMap<ConnectionId, String>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_password(&self, connection: ConnectionId, password: impl Into<String>) {
        self.passwords.insert(connection, password.into());
    }

    pub fn set_passphrase(&self, connection: ConnectionId, passphrase: impl Into<String>) {
        self.passphrases.insert(connection, passphrase.into());
    }

    /// Forget everything stored for a connection
    pub fn remove(&self, connection: ConnectionId) {
        self.passwords.remove(&connection);
        self.passphrases.remove(&connection);
    }
}

impl SecretStore for MemorySecretStore {
    fn password(&self, connection: ConnectionId) -> Result<Option<String>, SecretError> {
        Ok(self.passwords.get(&connection).map(|p| p.value().clone()))
    }

    fn passphrase(&self, connection: ConnectionId) -> Result<Option<String>, SecretError> {
        Ok(self.passphrases.get(&connection).map(|p| p.value().clone()))
    }
}

/// Build the credential for a profile from the secret store
pub fn resolve_credential(
    profile: &ConnectionProfile,
    store: &dyn SecretStore,
) -> Result<Credential, SessionError> {
    let unavailable = |e: SecretError| SessionError::unknown(e.to_string());

    tracing::debug!(
        "Resolving {} credential for connection {}",
        profile.auth_method,
        profile.id
    );

    match profile.auth_method {
        AuthMethod::Password => {
            let password = store
                .password(profile.id)
                .map_err(unavailable)?
                .ok_or_else(|| {
                    SessionError::auth_failed("No password stored for this connection")
                })?;
            Ok(Credential::Password(password))
        }
        AuthMethod::PublicKey => {
            let path = profile
                .key_path
                .clone()
                .ok_or_else(|| SessionError::key_not_found("No SSH key path configured"))?;
            let passphrase = store.passphrase(profile.id).map_err(unavailable)?;
            Ok(Credential::PrivateKey { path, passphrase })
        }
    }
}
