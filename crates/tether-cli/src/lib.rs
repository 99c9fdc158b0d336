//! tether-cli: Command-line interface for tether
//!
//! Provides the `tether` binary: connects to SSH servers from named
//! profiles or ad-hoc targets and runs an interactive shell that reconnects
//! on its own when the transport drops.

pub mod commands;
pub mod output;
pub mod terminal;
