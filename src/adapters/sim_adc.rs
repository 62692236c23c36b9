//! Simulated MCP3008 on an SPI bus.
//!
//! Answers the channel-0 single-ended request with a 10-bit sample in
//! the chip's framing (`B9..B8` in the low bits of byte 1, `B7..B0` in
//! byte 2).  The undefined upper bits of byte 1 are driven high so the
//! decoder's masking is exercised on every read.
//!
//! The sample value, per-read drift and fault injection are controlled
//! through an [`AdcProbe`] that stays with the caller after the device
//! itself is handed to the sampler thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU16, AtomicU32, Ordering};

use embedded_hal::spi::{self, ErrorKind, ErrorType, Operation, SpiDevice};
use log::info;

use crate::config::BusConfig;
use crate::error::Error;
use crate::pins;

const MAX_RAW: u16 = 1023;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimBusError;

impl spi::Error for SimBusError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

#[derive(Default)]
struct AdcState {
    raw: AtomicU16,
    drift: AtomicI32,
    fail: AtomicBool,
    transfers: AtomicU32,
}

/// Caller-side control of a [`SimulatedAdc`].
#[derive(Clone)]
pub struct AdcProbe {
    state: Arc<AdcState>,
}

impl AdcProbe {
    /// Set the next sample (clamped to 10 bits).
    pub fn set_raw(&self, raw: u16) {
        self.state.raw.store(raw.min(MAX_RAW), Ordering::Relaxed);
    }

    pub fn raw(&self) -> u16 {
        self.state.raw.load(Ordering::Relaxed)
    }

    /// Change the sample by `step` after every read.
    pub fn set_drift(&self, step: i32) {
        self.state.drift.store(step, Ordering::Relaxed);
    }

    /// Make transactions fail until cleared.
    pub fn set_fail(&self, fail: bool) {
        self.state.fail.store(fail, Ordering::Relaxed);
    }

    pub fn transfers(&self) -> u32 {
        self.state.transfers.load(Ordering::Relaxed)
    }
}

pub struct SimulatedAdc {
    state: Arc<AdcState>,
}

impl SimulatedAdc {
    /// A device with its probe, starting at `raw`.
    pub fn new(raw: u16) -> (Self, AdcProbe) {
        let state = Arc::new(AdcState::default());
        let probe = AdcProbe {
            state: state.clone(),
        };
        probe.set_raw(raw);
        (Self { state }, probe)
    }

    /// Open the simulated device described by `bus`.
    pub fn open(bus: &BusConfig, raw: u16) -> Result<(Self, AdcProbe), Error> {
        if bus.controller.is_empty() {
            return Err(Error::Init("no SPI controller configured"));
        }
        if bus.chip_select > 1 {
            return Err(Error::Init("SPI chip select out of range"));
        }
        info!(
            "sim-adc: {} CS{} @ {} Hz",
            bus.controller, bus.chip_select, bus.clock_hz
        );
        Ok(Self::new(raw))
    }

    fn respond(&self, request: &[u8]) -> [u8; pins::ADC_FRAME_LEN] {
        let single_ended_ch0 = request.len() >= 2
            && request[0] == pins::MCP3008_CONFIG[0]
            && request[1] & 0xF0 == pins::MCP3008_CONFIG[1];
        let raw = if single_ended_ch0 { self.sample() } else { 0 };
        [0x00, 0xFC | ((raw >> 8) as u8 & 0x03), (raw & 0xFF) as u8]
    }

    fn sample(&self) -> u16 {
        let raw = self.state.raw.load(Ordering::Relaxed);
        let drift = self.state.drift.load(Ordering::Relaxed);
        if drift != 0 {
            let next = (i32::from(raw) + drift).clamp(0, i32::from(MAX_RAW));
            self.state.raw.store(next as u16, Ordering::Relaxed);
        }
        raw
    }
}

impl ErrorType for SimulatedAdc {
    type Error = SimBusError;
}

impl SpiDevice for SimulatedAdc {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), SimBusError> {
        if self.state.fail.load(Ordering::Relaxed) {
            return Err(SimBusError);
        }
        self.state.transfers.fetch_add(1, Ordering::Relaxed);
        for op in operations {
            match op {
                Operation::Transfer(read, write) => {
                    let frame = self.respond(write);
                    for (dst, src) in read.iter_mut().zip(frame.iter()) {
                        *dst = *src;
                    }
                }
                Operation::TransferInPlace(buf) => {
                    let frame = self.respond(buf);
                    for (dst, src) in buf.iter_mut().zip(frame.iter()) {
                        *dst = *src;
                    }
                }
                Operation::Read(buf) => buf.fill(0),
                Operation::Write(_) | Operation::DelayNs(_) => {}
            }
        }
        Ok(())
    }
}
