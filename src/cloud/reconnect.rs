//! Hub reconnection policy.
//!
//! The default is to connect once at startup and stay down after a
//! failure or drop.  `Backoff` opts in to exponential retry
//! (`initial_ms`, doubling, capped at `max_ms`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Single connect attempt; no automatic retry.
    #[default]
    Never,
    /// Exponential backoff.  `max_attempts == 0` retries forever.
    Backoff {
        initial_ms: u64,
        max_ms: u64,
        max_attempts: u32,
    },
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt number `attempt` (0-based count of
    /// consecutive failures so far), or `None` to give up.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        match *self {
            Self::Never => None,
            Self::Backoff {
                initial_ms,
                max_ms,
                max_attempts,
            } => {
                if max_attempts != 0 && attempt >= max_attempts {
                    return None;
                }
                let factor = 1u64.checked_shl(attempt.min(63)).unwrap_or(u64::MAX);
                let ms = initial_ms.saturating_mul(factor).min(max_ms);
                Some(Duration::from_millis(ms))
            }
        }
    }
}
