//! Load-cell sensor read through an MCP3008 10-bit ADC on SPI.
//!
//! Each read is one full-duplex transaction of a fixed 3-byte frame.  The
//! sensor owns the bus handle for its whole lifetime; dropping it releases
//! the bus.
//!
//! ## Frame layout
//!
//! ```text
//! write: [0x01][0x80][0x00]          start bit, single-ended CH0
//! read:  [ -- ][xxxx xxBB][BBBB BBBB] 10-bit result, MSBs in byte 1
//! ```

use embedded_hal::spi::SpiDevice;
use log::debug;

use crate::error::{BusFault, Error};
use crate::pins;

/// Extract the 10-bit conversion result from a response frame.
///
/// Only the low two bits of byte 1 contribute; byte 0 is ignored.
pub fn decode_frame(frame: &[u8; pins::ADC_FRAME_LEN]) -> u16 {
    (u16::from(frame[1] & 0x03) << 8) | u16::from(frame[2])
}

/// Command frame sent on every transaction.
pub fn request_frame() -> [u8; pins::ADC_FRAME_LEN] {
    [pins::MCP3008_CONFIG[0], pins::MCP3008_CONFIG[1], 0x00]
}

pub struct WeightSensor<SPI> {
    spi: SPI,
    total_reads: u32,
    last_raw: Option<u16>,
}

impl<SPI: SpiDevice> WeightSensor<SPI> {
    pub fn new(spi: SPI) -> Self {
        Self {
            spi,
            total_reads: 0,
            last_raw: None,
        }
    }

    /// One bus transaction → one raw sample in `0..=1023`.
    ///
    /// No retry within a call; the caller's timer retries on its next tick.
    pub fn read_raw(&mut self) -> Result<u16, Error> {
        self.total_reads = self.total_reads.saturating_add(1);

        let write = request_frame();
        let mut read = [0u8; pins::ADC_FRAME_LEN];
        self.spi
            .transfer(&mut read, &write)
            .map_err(|_| Error::from(BusFault::TransferFailed))?;

        let raw = decode_frame(&read);
        debug!("ADC is {}", raw);
        self.last_raw = Some(raw);
        Ok(raw)
    }

    pub fn total_reads(&self) -> u32 {
        self.total_reads
    }

    pub fn last_raw(&self) -> Option<u16> {
        self.last_raw
    }
}
