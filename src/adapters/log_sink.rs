//! Log-based state listener.
//!
//! Implements [`StateListener`] by writing every observable change to
//! the log.  Stands in for the display layer on a headless host.

use log::info;

use crate::app::events::StateChange;
use crate::app::ports::StateListener;

/// Adapter that logs every [`StateChange`].
#[derive(Default)]
pub struct LogStateListener;

impl LogStateListener {
    pub fn new() -> Self {
        Self
    }
}

impl StateListener for LogStateListener {
    fn on_state_changed(&mut self, change: &StateChange) {
        match change {
            StateChange::PercentRemaining(pct) => {
                info!("STATE | remaining={:.1}%", pct * 100.0);
            }
            StateChange::Band(band) => {
                info!("STATE | band={}", band);
            }
            StateChange::RemoteMessage(msg) => {
                info!("STATE | remote level='{}'", msg);
            }
        }
    }
}
