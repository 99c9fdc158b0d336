//! tether CLI
//!
//! Interactive SSH shells that survive dropped connections:
//! - `connect` opens a shell from a named profile or `user@host[:port]`
//! - `config` manages the profile and engine configuration file

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tether_cli::commands::{self, ConnectOptions};
use tether_ssh::ReactorRuntime;

#[derive(Parser)]
#[command(name = "tether")]
#[command(author, version, about = "Interactive SSH shells that reconnect on their own")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an interactive shell
    Connect {
        /// Profile name or [user@]host[:port]
        target: String,
        /// Remote port (overrides the profile)
        #[arg(short, long)]
        port: Option<u16>,
        /// Private key for public key authentication
        #[arg(short, long)]
        identity: Option<PathBuf>,
        /// Connection timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
        /// Keepalive interval in seconds (0 disables)
        #[arg(short, long)]
        keepalive: Option<u64>,
        /// Exit instead of reconnecting when the connection drops
        #[arg(long)]
        no_reconnect: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the engine settings and profiles
    Show,
    /// Get a config value by dotted key
    Get { key: String },
    /// Show the config file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.command {
        Commands::Connect {
            target,
            port,
            identity,
            timeout,
            keepalive,
            no_reconnect,
        } => {
            let path = commands::config_path(cli.config.as_ref());
            let config = commands::load_or_default(&path)?;

            let runtime = ReactorRuntime::new(config.engine.reactor_threads)
                .context("Failed to start the I/O reactor")?;
            let options = ConnectOptions {
                target,
                port,
                identity,
                timeout,
                keepalive,
                auto_reconnect: !no_reconnect,
            };
            runtime.block_on(commands::connect_command(config, options, runtime.reactor()))?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(cli.config.as_ref())?,
            ConfigAction::Get { key } => commands::config_get(cli.config.as_ref(), &key)?,
            ConfigAction::Path => {
                println!("{}", commands::config_path(cli.config.as_ref()).display());
            }
            ConfigAction::Init { force } => commands::config_init(cli.config.as_ref(), force)?,
        },
    }

    Ok(())
}
