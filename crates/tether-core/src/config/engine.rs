//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Tuning knobs for the session engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads for the shared I/O reactor.
    ///
    /// Terminal traffic is tiny; one thread serves many sessions.
    pub reactor_threads: usize,

    /// Terminal type sent with the PTY request
    pub terminal_type: String,

    /// Capacity of the inbound chunk queue per session
    pub inbound_capacity: usize,

    /// Reconnect backoff
    pub reconnect: ReconnectConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reactor_threads: 1,
            terminal_type: "xterm-256color".to_string(),
            inbound_capacity: 256,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Exponential backoff configuration for reconnect campaigns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the first retry
    #[serde(with = "duration_secs")]
    pub base_delay: Duration,

    /// Multiplier applied for each further attempt
    pub multiplier: f64,

    /// Attempts allowed before the session settles in `failed(timeout)`
    pub max_attempts: u32,

    /// Upper bound on a single delay
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,

    /// Jitter factor (0.0 to 1.0), added on top of the computed delay
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_attempts: 5,
            max_delay: Duration::from_secs(60),
            jitter: 0.0,
        }
    }
}
