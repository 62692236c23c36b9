//! System configuration parameters
//!
//! All tunable parameters for the LevelWatch monitor.  Every section is
//! `#[serde(default)]`, so a config file only needs the fields it changes.
//! Values are loaded through [`ConfigPort`](crate::app::ports::ConfigPort).

use serde::{Deserialize, Serialize};

use crate::cloud::reconnect::ReconnectPolicy;
use crate::pins;
use crate::sensors::calibration::Calibration;

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Identity registered with the hub.  Empty = derive from the MAC.
    pub device_id: String,

    // --- Timing ---
    /// ADC sampling period (milliseconds)
    pub sample_interval_ms: u32,
    /// Stop the host binary after this many seconds (None = until Enter)
    pub run_for_secs: Option<u64>,

    // --- Hardware ---
    /// GPIO number of the alarm output.  None = no actuator fitted.
    pub actuator_pin: Option<u8>,
    pub bus: BusConfig,

    // --- Measurement ---
    pub calibration: Calibration,
    pub domain: MeasurementDomain,

    // --- Hub ---
    pub hub: HubConfig,
    pub profile: DeviceProfile,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            sample_interval_ms: 300,
            run_for_secs: None,
            actuator_pin: Some(pins::ALARM_LED_GPIO),
            bus: BusConfig::default(),
            calibration: Calibration::default(),
            domain: MeasurementDomain::default(),
            hub: HubConfig::default(),
            profile: DeviceProfile::default(),
        }
    }
}

impl SystemConfig {
    /// Reject values that would make the loop meaningless.
    ///
    /// Invalid ranges are rejected, not clamped.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.sample_interval_ms == 0 {
            return Err("sample_interval_ms must be > 0");
        }
        if self.calibration.full_scale <= 0 {
            return Err("calibration.full_scale must be > 0");
        }
        if self.calibration.span < 0 {
            return Err("calibration.span must be >= 0");
        }
        if !self.domain.min.is_finite() || !self.domain.max.is_finite() {
            return Err("domain bounds must be finite");
        }
        if self.domain.max <= self.domain.min {
            return Err("domain.max must be above domain.min");
        }
        if self.bus.clock_hz == 0 {
            return Err("bus.clock_hz must be > 0");
        }
        Ok(())
    }
}

/// Expected physical operating range of the measured quantity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MeasurementDomain {
    /// Reading of an empty reservoir
    pub min: f64,
    /// Reading of a full reservoir
    pub max: f64,
}

impl Default for MeasurementDomain {
    fn default() -> Self {
        Self {
            min: 500.0,
            max: 1180.0,
        }
    }
}

/// SPI bus parameters for the ADC.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub controller: String,
    pub chip_select: u8,
    pub clock_hz: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            controller: pins::SPI_CONTROLLER_NAME.to_string(),
            chip_select: pins::SPI_CHIP_SELECT_LINE,
            clock_hz: pins::SPI_CLOCK_HZ,
        }
    }
}

/// Hub endpoint and pre-provisioned credentials.
#[derive(Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HubConfig {
    pub host_name: String,
    pub shared_access_key: String,
    pub reconnect: ReconnectPolicy,
}

impl core::fmt::Debug for HubConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HubConfig")
            .field("host_name", &self.host_name)
            .field("shared_access_key", &"<redacted>")
            .field("reconnect", &self.reconnect)
            .finish()
    }
}

/// Static hardware metadata announced once per connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceProfile {
    pub manufacturer: String,
    pub model_number: String,
    pub serial_number: String,
    pub firmware_version: String,
    pub platform: String,
    pub processor: String,
    pub installed_ram: String,
    pub latitude: f64,
    pub longitude: f64,
    pub simulated: bool,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            manufacturer: "Interlink".into(),
            model_number: "30-81794".into(),
            serial_number: "12345".into(),
            firmware_version: env!("CARGO_PKG_VERSION").into(),
            platform: "Linux".into(),
            processor: "ARM".into(),
            installed_ram: "1GB".into(),
            latitude: 47.1234,
            longitude: -122.34567,
            simulated: false,
        }
    }
}
