//! Exponential backoff for reconnect campaigns

use std::time::Duration;

use tether_core::config::ReconnectConfig;

/// Backoff schedule and attempt cap for a session's reconnect campaign.
///
/// Unlike a stepping backoff, the delay is a pure function of the attempt
/// number: the session owns the counter, so a campaign spread across several
/// `reconnect()` calls still sees 1, 2, 4, 8, 16 s with the defaults.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    base: Duration,
    /// Upper bound on a single delay
    max_delay: Duration,
    /// Multiplier
    multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    jitter: f64,
    /// Attempts allowed per campaign
    max_attempts: u32,
}

impl ReconnectPolicy {
    /// Create a policy from configuration
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self {
            base: config.base_delay,
            max_delay: config.max_delay,
            multiplier: config.multiplier,
            jitter: config.jitter.clamp(0.0, 1.0),
            max_attempts: config.max_attempts,
        }
    }

    /// Create a policy with custom parameters and no jitter
    pub fn new(base: Duration, multiplier: f64, max_attempts: u32, max_delay: Duration) -> Self {
        Self {
            base,
            max_delay,
            multiplier,
            jitter: 0.0,
            max_attempts,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether `attempt` (1-based) may still be made
    pub fn allows(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.max_attempts
    }

    /// Delay to wait before `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        let delay = if secs.is_finite() && secs < self.max_delay.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            self.max_delay
        };

        if self.jitter > 0.0 {
            let jitter_amount = delay.as_secs_f64() * self.jitter * rand::random::<f64>();
            delay + Duration::from_secs_f64(jitter_amount)
        } else {
            delay
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}
