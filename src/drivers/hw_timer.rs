//! Periodic tick timer.
//!
//! Runs a callback on its own thread at a fixed period.  Deadlines are
//! absolute, so a slow tick shortens the following wait instead of
//! drifting the cadence; if a tick overruns a whole period the missed
//! ticks are skipped, not replayed.
//!
//! The thread parks on the shared [`Shutdown`] signal between ticks, so
//! stopping never waits for a full period.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::shutdown::Shutdown;

/// Spawn a named periodic timer thread.  The first tick fires
/// immediately.
pub fn spawn_periodic<F>(
    name: &str,
    period: Duration,
    shutdown: Arc<Shutdown>,
    mut tick: F,
) -> std::io::Result<JoinHandle<()>>
where
    F: FnMut() + Send + 'static,
{
    let label = name.to_string();
    thread::Builder::new().name(label.clone()).spawn(move || {
        info!("hw_timer: '{}' started ({} ms)", label, period.as_millis());
        let mut next = Instant::now();
        loop {
            if shutdown.is_triggered() {
                break;
            }
            tick();

            next += period;
            let now = Instant::now();
            if next <= now {
                let behind = now - next;
                let skipped = (behind.as_nanos() / period.as_nanos().max(1)) as u32 + 1;
                warn!("hw_timer: '{}' overran, skipping {} tick(s)", label, skipped);
                next += period * skipped;
            }
            if shutdown.wait_timeout(next - Instant::now().min(next)) {
                break;
            }
        }
        info!("hw_timer: '{}' stopped", label);
    })
}
