//! Port traits: the boundary between the control loop and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ControlLoop (domain)
//! ```
//!
//! Hardware capabilities are the `embedded-hal` traits and the hub is
//! [`HubClient`](crate::cloud::hub::HubClient); the ports here cover
//! what is left: state observers, configuration storage and wall time.

use crate::config::SystemConfig;

use super::events::StateChange;

// ───────────────────────────────────────────────────────────────
// State listener (driven adapter: domain → UI / logging)
// ───────────────────────────────────────────────────────────────

/// Observer of the loop's externally visible state.
///
/// Listeners are called synchronously, in registration order, on
/// whichever loop thread made the change.  They must return quickly
/// and must not call back into the loop.
pub trait StateListener {
    fn on_state_changed(&mut self, change: &StateChange);
}

// ───────────────────────────────────────────────────────────────
// Configuration port
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations validate before persisting; invalid ranges are
/// rejected with [`ConfigError::ValidationFailed`], not clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Timestamp source for measurements.
pub trait ClockPort {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// No stored config (first run).
    NotFound,
    /// Stored config could not be parsed.
    Corrupted,
    /// A config field failed range validation.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl std::error::Error for ConfigError {}
