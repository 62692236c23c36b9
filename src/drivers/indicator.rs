//! Alarm indicator driver (single GPIO output).
//!
//! Lit while the reservoir is in the `Critical` band, dark otherwise.
//! The driver is a dumb actuator: the control loop decides the band.
//!
//! ## Availability
//!
//! A board without a usable output line is constructed with `None`.
//! Every call then returns [`ActuatorError::Unavailable`] and the rest
//! of the loop carries on without local actuation.

use embedded_hal::digital::OutputPin;
use log::{debug, warn};

use crate::control::band::Band;
use crate::error::ActuatorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorState {
    Unavailable,
    Off,
    On,
}

pub struct Indicator<PIN> {
    pin: Option<PIN>,
    /// Last level successfully written; `None` until the first write.
    lit: Option<bool>,
    writes: u32,
}

impl<PIN: OutputPin> Indicator<PIN> {
    /// Take ownership of the output line and force it to the off level.
    ///
    /// The line's electrical level is undefined until the first write.
    pub fn new(pin: Option<PIN>) -> Self {
        let mut ind = Self {
            pin,
            lit: None,
            writes: 0,
        };
        if ind.pin.is_none() {
            warn!("Indicator: no output line, local actuation disabled");
        } else if let Err(e) = ind.switch(false) {
            warn!("Indicator: initial off write failed: {}", e);
        }
        ind
    }

    /// `on = (band == Critical)`.
    pub fn set_band(&mut self, band: Band) -> Result<(), ActuatorError> {
        self.switch(band == Band::Critical)
    }

    /// Drive the line.  Skips the hardware write when the level is
    /// already in place.
    pub fn switch(&mut self, on: bool) -> Result<(), ActuatorError> {
        let Some(pin) = self.pin.as_mut() else {
            return Err(ActuatorError::Unavailable);
        };
        if self.lit == Some(on) {
            return Ok(());
        }

        let res = if on { pin.set_high() } else { pin.set_low() };
        if res.is_err() {
            // Forget the cached level so the next call re-issues the write.
            self.lit = None;
            return Err(ActuatorError::GpioWriteFailed);
        }

        self.writes = self.writes.saturating_add(1);
        self.lit = Some(on);
        debug!("Indicator: {}", if on { "ON" } else { "OFF" });
        Ok(())
    }

    pub fn state(&self) -> IndicatorState {
        match (self.pin.is_some(), self.lit) {
            (false, _) => IndicatorState::Unavailable,
            (true, Some(true)) => IndicatorState::On,
            (true, _) => IndicatorState::Off,
        }
    }

    pub fn is_on(&self) -> bool {
        self.lit == Some(true)
    }

    /// Hardware writes issued so far.
    pub fn write_count(&self) -> u32 {
        self.writes
    }

    /// Give the line back.
    pub fn release(self) -> Option<PIN> {
        self.pin
    }
}
