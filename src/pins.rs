//! Peripheral assignments for the monitor board.
//!
//! Single source of truth for the bus and line numbers.  Values here are
//! the defaults; [`SystemConfig`](crate::config::SystemConfig) may override
//! the actuator pin and bus parameters.

// ---------------------------------------------------------------------------
// Load-cell ADC (MCP3008 on SPI0)
// ---------------------------------------------------------------------------

/// Friendly name of the SPI controller the ADC is wired to.
pub const SPI_CONTROLLER_NAME: &str = "SPI0";
/// Chip-select line 0 (physical pin 24 on the Pi header).
pub const SPI_CHIP_SELECT_LINE: u8 = 0;
/// 0.5 MHz; the ADC expects idle-low clock polarity (mode 0).
pub const SPI_CLOCK_HZ: u32 = 500_000;

/// Start bit + single-ended channel 0 selection.
/// `00000001 10000000` followed by a don't-care byte.
pub const MCP3008_CONFIG: [u8; 2] = [0x01, 0x80];

/// Every ADC exchange is one fixed 3-byte full-duplex frame.
pub const ADC_FRAME_LEN: usize = 3;

// ---------------------------------------------------------------------------
// Alarm output
// ---------------------------------------------------------------------------

/// Digital output driving the alarm LED (HIGH = on).
pub const ALARM_LED_GPIO: u8 = 4;
