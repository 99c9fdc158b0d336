//! CLI command implementations

mod config;
mod connect;

pub use config::{config_get, config_init, config_path, config_show, load_or_default};
pub use connect::{connect_command, resolve_profile, ConnectOptions};
