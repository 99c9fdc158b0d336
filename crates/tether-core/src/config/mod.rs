//! Configuration management for tether

mod connection;
mod engine;
pub mod serde_utils;

pub use connection::{ConnectionConfig, ConnectionProfile, DEFAULT_SSH_PORT};
pub use engine::{EngineConfig, ReconnectConfig};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tether")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Contents of the tether config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Engine tuning
    pub engine: EngineConfig,

    /// Named connection profiles
    #[serde(deserialize_with = "serde_utils::profiles_by_name::deserialize")]
    pub profiles: BTreeMap<String, ConnectionProfile>,
}

impl ConfigFile {
    /// Look up a profile by name
    pub fn profile(&self, name: &str) -> Result<&ConnectionProfile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))
    }
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AuthMethod, ConnectionId};
    use std::time::Duration;

    #[test]
    fn test_load_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config::<ConfigFile>(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_config_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ConfigFile::default();
        let mut profile = ConnectionProfile::new("web", "10.0.0.5", "bob");
        profile.auth_method = AuthMethod::PublicKey;
        profile.key_path = Some(PathBuf::from("~/.ssh/id_ed25519"));
        config.profiles.insert("web".to_string(), profile);

        save_config(&path, &config).unwrap();
        let loaded: ConfigFile = load_config(&path).unwrap();

        let web = loaded.profile("web").unwrap();
        assert_eq!(web.host, "10.0.0.5");
        assert_eq!(web.port, 22);
        assert_eq!(web.auth_method, AuthMethod::PublicKey);
        assert_eq!(web.connect_timeout, Duration::from_secs(30));
        assert!(matches!(
            loaded.profile("db"),
            Err(ConfigError::UnknownProfile(_))
        ));
    }

    #[test]
    fn test_profile_ids_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[profiles.web]\nhost = \"10.0.0.5\"\nusername = \"bob\"\n\n\
             [profiles.db]\nhost = \"10.0.0.6\"\nusername = \"bob\"\n",
        )
        .unwrap();

        let first: ConfigFile = load_config(&path).unwrap();
        let second: ConfigFile = load_config(&path).unwrap();
        assert_eq!(first.profiles["web"].id, second.profiles["web"].id);
        assert_eq!(first.profiles["web"].id, ConnectionId::for_profile("web"));
        assert_ne!(first.profiles["web"].id, first.profiles["db"].id);
        assert_eq!(first.profiles["web"].name, "web");

        save_config(&path, &first).unwrap();
        let saved: ConfigFile = load_config(&path).unwrap();
        assert_eq!(saved.profiles["db"].id, first.profiles["db"].id);
    }

    #[test]
    fn test_explicit_profile_id_is_kept() {
        let toml = r#"
            [profiles.web]
            id = "2f1b6a3e-8c4d-4e5f-9a7b-0c1d2e3f4a5b"
            host = "10.0.0.5"
            username = "bob"
        "#;
        let config: ConfigFile = toml::from_str(toml).unwrap();
        assert_eq!(
            config.profiles["web"].id.to_string(),
            "2f1b6a3e-8c4d-4e5f-9a7b-0c1d2e3f4a5b"
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
            [engine]
            terminal_type = "vt100"

            [profiles.lab]
            host = "lab.local"
            username = "alice"
            port = 2222
        "#;
        let config: ConfigFile = toml::from_str(toml).unwrap();
        assert_eq!(config.engine.terminal_type, "vt100");
        assert_eq!(config.engine.reactor_threads, 1);
        assert_eq!(config.engine.reconnect.max_attempts, 5);

        let lab = config.profile("lab").unwrap();
        assert_eq!(lab.port, 2222);
        assert_eq!(lab.keepalive_interval, Duration::from_secs(60));
        assert_eq!(lab.auth_method, AuthMethod::Password);
    }
}
