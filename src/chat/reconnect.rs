//! Reconnect Policies
//!
//! Decides how long to wait before the next connection attempt after the
//! socket drops.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// When to retry after a disconnect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Same delay forever
    Fixed {
        #[serde(default = "default_fixed_delay")]
        delay_ms: u64,
    },
    /// Doubling delay, capped, optionally jittered, optionally giving up
    Backoff {
        #[serde(default = "default_base_delay")]
        base_ms: u64,
        #[serde(default = "default_max_delay")]
        max_ms: u64,
        #[serde(default)]
        max_attempts: Option<u32>,
        #[serde(default)]
        jitter: bool,
    },
    /// Only reconnect when asked to
    Manual,
}

fn default_fixed_delay() -> u64 {
    5000
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    30_000
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Fixed {
            delay_ms: default_fixed_delay(),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (0 for the first retry after a
    /// successful connection), or `None` to stop retrying
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        match self {
            ReconnectPolicy::Fixed { delay_ms } => Some(Duration::from_millis(*delay_ms)),
            ReconnectPolicy::Backoff {
                base_ms,
                max_ms,
                max_attempts,
                jitter,
            } => {
                if max_attempts.map_or(false, |max| attempt >= max) {
                    return None;
                }

                let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
                let capped = base_ms.saturating_mul(factor).min(*max_ms);

                let delay = if *jitter && capped > 1 {
                    rand::thread_rng().gen_range(capped / 2..=capped)
                } else {
                    capped
                };

                Some(Duration::from_millis(delay))
            }
            ReconnectPolicy::Manual => None,
        }
    }
}
