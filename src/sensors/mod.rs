//! Sensor subsystem: the load-cell driver and its calibration.
//!
//! [`weight::WeightSensor`] produces raw ADC counts;
//! [`calibration::MetricConverter`] turns each count into a
//! [`Measurement`] that the control loop consumes exactly once.

pub mod calibration;
pub mod weight;

/// One converted bus read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Milliseconds since the Unix epoch at sampling time.
    pub timestamp_ms: u64,
    /// 10-bit ADC count.
    pub raw: u16,
    /// Engineering-unit value after calibration.
    pub derived: f64,
}
