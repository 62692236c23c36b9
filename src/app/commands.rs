//! Inbound commands to the control loop.
//!
//! A decoded [`RemoteCommand`] is interpreted exactly once into an
//! [`AppCommand`]; the loop only ever matches on this enum.

use crate::cloud::payload::{LEVEL_COMMAND_NAME, LEVEL_PARAM_NAME, RemoteCommand};
use crate::control::band::Band;
use crate::error::CommandError;

/// Commands the hub can send into the application core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    /// Operator-announced level.  `band` is `None` when the string is
    /// not one of the known band names.
    SetLevel { level: String, band: Option<Band> },

    /// A command this device does not implement.
    Unsupported(String),
}

impl AppCommand {
    pub fn from_remote(cmd: RemoteCommand) -> Result<Self, CommandError> {
        if cmd.name != LEVEL_COMMAND_NAME {
            return Ok(Self::Unsupported(cmd.name));
        }
        let RemoteCommand { mut parameters, .. } = cmd;
        let level = parameters
            .remove(LEVEL_PARAM_NAME)
            .ok_or(CommandError::MissingParameter(LEVEL_PARAM_NAME))?;
        let band = level.parse().ok();
        Ok(Self::SetLevel { level, band })
    }

    /// Whether applying this command drives the actuator on.
    pub fn wants_actuator_on(&self) -> bool {
        matches!(self, Self::SetLevel { band: Some(Band::Critical), .. })
    }
}
