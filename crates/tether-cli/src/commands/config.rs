//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{format_profiles, print_error, print_info, print_success, print_warning};
use tether_core::config::{self, ConfigFile};

/// Resolve the config file path from the `--config` flag
pub fn config_path(config_path: Option<&PathBuf>) -> PathBuf {
    config_path
        .cloned()
        .unwrap_or_else(config::default_config_path)
}

/// Print a config value by dotted key, e.g. `engine.reconnect.max_attempts`
pub fn config_get(config_path: Option<&PathBuf>, key: &str) -> Result<()> {
    let path = self::config_path(config_path);

    if !path.exists() {
        print_error(&format!("Config file not found: {}", path.display()));
        print_info("Run 'tether config init' to create one");
        return Ok(());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let table: toml::Table =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    match lookup(&toml::Value::Table(table), key) {
        Some(toml::Value::String(s)) => println!("{}", s),
        Some(toml::Value::Table(t)) => print!("{}", toml::to_string_pretty(t)?),
        Some(value) => println!("{}", value),
        None => print_error(&format!("Key not found: {}", key)),
    }

    Ok(())
}

fn lookup<'a>(root: &'a toml::Value, key: &str) -> Option<&'a toml::Value> {
    key.split('.')
        .try_fold(root, |current, part| current.as_table()?.get(part))
}

/// Show the effective configuration
pub fn config_show(config_path: Option<&PathBuf>) -> Result<()> {
    let path = self::config_path(config_path);

    if !path.exists() {
        print_warning(&format!("No configuration file found at {}", path.display()));
        print_info("Run 'tether config init' to create one; showing defaults");
    } else {
        print_info(&format!("Configuration file: {}", path.display()));
    }
    println!();

    let config = load_or_default(&path)?;
    let engine = &config.engine;
    let reconnect = &engine.reconnect;

    println!("Engine:");
    println!("  reactor threads:  {}", engine.reactor_threads);
    println!("  terminal type:    {}", engine.terminal_type);
    println!("  inbound capacity: {}", engine.inbound_capacity);
    println!(
        "  reconnect:        {} attempts, {}s base x{} (max {}s, jitter {})",
        reconnect.max_attempts,
        reconnect.base_delay.as_secs(),
        reconnect.multiplier,
        reconnect.max_delay.as_secs(),
        reconnect.jitter
    );
    println!();
    println!("Profiles:");
    println!("{}", format_profiles(&config));

    Ok(())
}

/// Load the config file, falling back to defaults when it does not exist
pub fn load_or_default(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::default());
    }
    config::load_config(path)
        .with_context(|| format!("Invalid configuration file: {}", path.display()))
}

/// Initialize default configuration
pub fn config_init(config_path: Option<&PathBuf>, force: bool) -> Result<()> {
    let config_file = self::config_path(config_path);

    if let Some(config_dir) = config_file.parent() {
        if !config_dir.as_os_str().is_empty() && !config_dir.exists() {
            std::fs::create_dir_all(config_dir).with_context(|| {
                format!("Failed to create config directory: {}", config_dir.display())
            })?;
            print_success(&format!("Created config directory: {}", config_dir.display()));
        }
    }

    if config_file.exists() && !force {
        print_error(&format!(
            "Config file already exists: {}",
            config_file.display()
        ));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    std::fs::write(&config_file, generate_default_config())
        .with_context(|| format!("Failed to write config file: {}", config_file.display()))?;

    print_success(&format!(
        "Created configuration file: {}",
        config_file.display()
    ));
    Ok(())
}

/// Generate default configuration content
fn generate_default_config() -> String {
    r#"# tether configuration

[engine]
# Worker threads for the shared I/O reactor
reactor_threads = 1

# Terminal type sent with the PTY request
terminal_type = "xterm-256color"

# Output chunks buffered per session before the channel is throttled
inbound_capacity = 256

[engine.reconnect]
# Delay before the first retry, in seconds
base_delay = 1
# Backoff multiplier
multiplier = 2.0
# Attempts before giving up
max_attempts = 5
# Upper bound on a single delay, in seconds
max_delay = 60
# Jitter factor (0.0 to 1.0)
jitter = 0.0

# Example connection profile
# [profiles.web]
# host = "web.example.com"
# port = 22
# username = "deploy"
# auth_method = "publicKey"
# key_path = "~/.ssh/id_ed25519"
# connect_timeout = 30
# keepalive_interval = 60
"#
    .to_string()
}
