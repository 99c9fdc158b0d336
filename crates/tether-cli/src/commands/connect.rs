//! Connect command implementation

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

use tether_core::config::{ConfigFile, ConnectionProfile};
use tether_core::secrets::MemorySecretStore;
use tether_core::AuthMethod;
use tether_ssh::auth::{load_private_key, KeyError};
use tether_ssh::{Reactor, SessionRegistry};

use crate::output::{print_error, print_info, print_success, print_warning};
use crate::terminal::{SessionEnd, TerminalSession};

/// Environment variable holding the password
pub const PASSWORD_ENV: &str = "TETHER_PASSWORD";

/// Environment variable holding the private key passphrase
pub const PASSPHRASE_ENV: &str = "TETHER_PASSPHRASE";

/// Flags of the connect command
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Profile name or `[user@]host[:port]`
    pub target: String,
    pub port: Option<u16>,
    pub identity: Option<PathBuf>,
    pub timeout: Option<u64>,
    pub keepalive: Option<u64>,
    pub auto_reconnect: bool,
}

/// Pick the named profile or parse an ad-hoc target, then apply the flags
pub fn resolve_profile(config: &ConfigFile, options: &ConnectOptions) -> Result<ConnectionProfile> {
    let mut profile = match config.profiles.get(&options.target) {
        Some(profile) => profile.clone(),
        None => ConnectionProfile::parse_target(&options.target)
            .with_context(|| format!("No profile or valid target named '{}'", options.target))?,
    };

    if let Some(port) = options.port {
        profile.port = port;
    }
    if let Some(identity) = &options.identity {
        profile.auth_method = AuthMethod::PublicKey;
        profile.key_path = Some(identity.clone());
    }
    if let Some(secs) = options.timeout {
        profile.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = options.keepalive {
        profile.keepalive_interval = Duration::from_secs(secs);
    }

    profile.validate()?;
    Ok(profile)
}

/// Execute the connect command: open a session and attach the terminal
pub async fn connect_command(
    config: ConfigFile,
    options: ConnectOptions,
    reactor: Reactor,
) -> Result<()> {
    let profile = resolve_profile(&config, &options)?;
    let secrets = gather_secrets(&profile)?;

    print_info(&format!("Connecting to {}...", profile.display_address()));

    let registry = SessionRegistry::ssh(reactor, config.engine);
    let id = match registry.open_profile(&profile, &secrets).await {
        Ok(id) => id,
        Err(e) => {
            print_error(&format!("Failed to connect: {}", e));
            return Err(e).context("Connection failed");
        }
    };

    print_success(&format!("Connected to {}", profile.display_address()));
    print_info("Press Ctrl+] to detach");

    let end = TerminalSession::new(&registry, id, options.auto_reconnect)
        .run()
        .await;
    registry.close_all().await;

    match end? {
        SessionEnd::Detached => print_success("Detached, session closed"),
        SessionEnd::Closed => print_success("Connection closed by remote host"),
        SessionEnd::Lost(reason) => {
            print_warning(&format!("Connection lost: {}", reason));
        }
        SessionEnd::Failed(err) => {
            print_error(&format!("Could not reconnect: {}", err));
            anyhow::bail!("Session ended after reconnect failure");
        }
    }

    Ok(())
}

/// Collect the secret for the profile's auth method from the environment or
/// an interactive prompt
fn gather_secrets(profile: &ConnectionProfile) -> Result<MemorySecretStore> {
    let secrets = MemorySecretStore::new();

    match profile.auth_method {
        AuthMethod::Password => {
            let password = match std::env::var(PASSWORD_ENV) {
                Ok(password) => password,
                Err(_) => prompt_secret(&format!("{}'s password: ", profile.display_address()))?,
            };
            secrets.set_password(profile.id, password);
        }
        AuthMethod::PublicKey => {
            // Unencrypted keys need no passphrase. Other key errors surface
            // from the connect itself.
            if let Some(path) = &profile.key_path {
                if let Err(KeyError::PassphraseRequired) = load_private_key(path, None) {
                    let passphrase = match std::env::var(PASSPHRASE_ENV) {
                        Ok(passphrase) => passphrase,
                        Err(_) => prompt_secret(&format!(
                            "Enter passphrase for key '{}': ",
                            path.display()
                        ))?,
                    };
                    secrets.set_passphrase(profile.id, passphrase);
                }
            }
        }
    }

    Ok(secrets)
}

/// Read a line from the terminal without echo
fn prompt_secret(prompt: &str) -> Result<String> {
    use std::io::Write;

    let mut stderr = std::io::stderr();
    write!(stderr, "{}", prompt)?;
    stderr.flush()?;

    enable_raw_mode().context("Cannot prompt for a secret without a terminal")?;
    let result = read_hidden_line();
    let _ = disable_raw_mode();
    writeln!(stderr)?;

    result
}

fn read_hidden_line() -> Result<String> {
    let mut line = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind == KeyEventKind::Release {
            continue;
        }
        match key.code {
            KeyCode::Enter => return Ok(line),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                anyhow::bail!("Interrupted");
            }
            KeyCode::Backspace => {
                line.pop();
            }
            KeyCode::Char(c) => line.push(c),
            _ => {}
        }
    }
}
