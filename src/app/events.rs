//! Observable loop state and its change notifications.
//!
//! The [`ControlLoop`](super::service::ControlLoop) publishes a
//! [`StateChange`] through every registered
//! [`StateListener`](super::ports::StateListener) whenever a field of
//! [`MonitorState`] actually changes value.

use crate::control::band::Band;

/// Point-in-time copy of the externally visible state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonitorState {
    /// Last in-range normalized reading, in [0, 1].
    pub percent_remaining: f64,
    /// Level string from the most recent remote command.
    pub last_remote_message: Option<String>,
    /// Band of the most recent reading (in range or not).
    pub current_band: Option<Band>,
}

/// One field of [`MonitorState`] changed.
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    PercentRemaining(f64),
    RemoteMessage(String),
    Band(Band),
}
