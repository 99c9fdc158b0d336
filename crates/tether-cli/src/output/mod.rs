//! Output formatting utilities for the CLI
//!
//! Colored status messages, the profile table shown by `config show`, and
//! the in-band notices printed while the terminal is in raw mode.

use std::io::Write;

use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use tabled::{settings::Style, Table, Tabled};

use tether_core::config::ConfigFile;
use tether_core::AuthMethod;

/// Format the configured connection profiles as an ASCII table
///
/// Returns "No profiles configured" when the file has none.
pub fn format_profiles(config: &ConfigFile) -> String {
    if config.profiles.is_empty() {
        return "No profiles configured".to_string();
    }

    #[derive(Tabled)]
    struct ProfileRow {
        #[tabled(rename = "PROFILE")]
        name: String,
        #[tabled(rename = "ADDRESS")]
        address: String,
        #[tabled(rename = "AUTH")]
        auth: String,
        #[tabled(rename = "TIMEOUT")]
        timeout: String,
        #[tabled(rename = "KEEPALIVE")]
        keepalive: String,
    }

    let rows: Vec<ProfileRow> = config
        .profiles
        .iter()
        .map(|(name, profile)| ProfileRow {
            name: name.clone(),
            address: profile.display_address(),
            auth: match (&profile.auth_method, &profile.key_path) {
                (AuthMethod::PublicKey, Some(path)) => format!("key {}", path.display()),
                (method, _) => method.to_string(),
            },
            timeout: format!("{}s", profile.connect_timeout.as_secs()),
            keepalive: match profile.keepalive_interval.as_secs() {
                0 => "off".to_string(),
                secs => format!("{}s", secs),
            },
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Print a notice while the terminal is in raw mode.
///
/// Raw mode disables output post-processing, so the line needs an explicit
/// carriage return.
pub fn print_notice(msg: &str) {
    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        Print("\r\n"),
        SetForegroundColor(Color::DarkGrey),
        Print(format!("[tether] {}", msg)),
        ResetColor,
        Print("\r\n")
    );
}

fn print_styled(mut out: impl Write, color: Color, symbol: &str, msg: &str) {
    let _ = crossterm::execute!(
        out,
        SetForegroundColor(color),
        Print(symbol),
        Print(" "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    print_styled(std::io::stdout(), Color::Green, "✓", msg);
}

/// Print an error message in red with an X prefix to stderr
pub fn print_error(msg: &str) {
    print_styled(std::io::stderr(), Color::Red, "✗", msg);
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    print_styled(std::io::stderr(), Color::Yellow, "⚠", msg);
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    print_styled(std::io::stdout(), Color::Cyan, "ℹ", msg);
}
