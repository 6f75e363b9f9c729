use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long the terminal waits for a ledger confirmation, and how it
/// escalates before asking the operator to recheck manually.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationPolicy {
    /// Observation window after a successful submission (milliseconds).
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    /// Automatic one-shot rechecks after the window elapsed.
    #[serde(default = "default_recheck_attempts")]
    pub recheck_attempts: u32,
    /// Delay before the first automatic recheck (milliseconds).
    #[serde(default = "default_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Factor applied to the delay after each recheck.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,
}

fn default_window_ms() -> u64 {
    15_000
}
fn default_recheck_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    2_000
}
fn default_backoff_multiplier() -> u32 {
    2
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            recheck_attempts: default_recheck_attempts(),
            initial_backoff_ms: default_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl ConfirmationPolicy {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Delays to wait before each automatic recheck, in order.
    pub fn backoff_schedule(&self) -> Vec<Duration> {
        let mut delay = self.initial_backoff_ms;
        (0..self.recheck_attempts)
            .map(|_| {
                let current = Duration::from_millis(delay);
                delay = delay.saturating_mul(u64::from(self.backoff_multiplier.max(1)));
                current
            })
            .collect()
    }
}
