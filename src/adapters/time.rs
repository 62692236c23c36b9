//! System clock adapter.
//!
//! Wall time for measurement timestamps plus monotonic uptime for
//! status logging.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::app::ports::ClockPort;

pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Seconds since this clock was created (monotonic).
    pub fn uptime_secs(&self) -> u64 {
        self.start.elapsed().as_secs()
    }
}

impl ClockPort for SystemClock {
    /// Milliseconds since the Unix epoch; 0 if the wall clock is set
    /// before 1970.
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64)
    }
}
