//! Simulated GPIO output line.
//!
//! Clones share the same electrical level, so a test (or the host
//! binary) keeps one clone as a probe while the other is owned by the
//! [`Indicator`](crate::drivers::indicator::Indicator).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embedded_hal::digital::{self, ErrorKind, ErrorType, OutputPin};
use log::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimGpioError;

impl digital::Error for SimGpioError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

#[derive(Default)]
struct LineState {
    high: AtomicBool,
    fail: AtomicBool,
    writes: AtomicU32,
}

#[derive(Clone)]
pub struct SimulatedLine {
    gpio: u8,
    state: Arc<LineState>,
}

impl SimulatedLine {
    pub fn gpio(&self) -> u8 {
        self.gpio
    }

    pub fn is_high(&self) -> bool {
        self.state.high.load(Ordering::Relaxed)
    }

    pub fn write_count(&self) -> u32 {
        self.state.writes.load(Ordering::Relaxed)
    }

    /// Make writes fail until cleared.
    pub fn set_fail(&self, fail: bool) {
        self.state.fail.store(fail, Ordering::Relaxed);
    }

    fn write(&self, high: bool) -> Result<(), SimGpioError> {
        if self.state.fail.load(Ordering::Relaxed) {
            return Err(SimGpioError);
        }
        self.state.high.store(high, Ordering::Relaxed);
        self.state.writes.fetch_add(1, Ordering::Relaxed);
        debug!("sim-gpio: GPIO{} -> {}", self.gpio, if high { "high" } else { "low" });
        Ok(())
    }
}

/// Open `pin` as an output.  `None` when no pin is configured.
pub fn open_line(pin: Option<u8>) -> Option<SimulatedLine> {
    let gpio = pin?;
    info!("sim-gpio: GPIO{} opened as output", gpio);
    Some(SimulatedLine {
        gpio,
        state: Arc::new(LineState::default()),
    })
}

impl ErrorType for SimulatedLine {
    type Error = SimGpioError;
}

impl OutputPin for SimulatedLine {
    fn set_low(&mut self) -> Result<(), SimGpioError> {
        self.write(false)
    }

    fn set_high(&mut self) -> Result<(), SimGpioError> {
        self.write(true)
    }
}
