//! Linear load-cell calibration.
//!
//! The ADC reading falls as the load rises, so the transfer function is a
//! decreasing line:
//!
//! ```text
//! derived = base_offset + ((full_scale - raw) * span) / full_scale
//! ```
//!
//! Evaluated in integer arithmetic with truncating division, then widened
//! to `f64`.

use serde::{Deserialize, Serialize};

use super::Measurement;

/// Device-specific calibration constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Derived value reported at `raw == full_scale`.
    pub base_offset: i32,
    /// Derived range covered between `raw == full_scale` and `raw == 0`.
    pub span: i32,
    /// ADC full-scale count (10-bit converter = 1024).
    pub full_scale: i32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            base_offset: 20,
            span: 1980,
            full_scale: 1024,
        }
    }
}

/// Pure raw-count → engineering-unit converter.
#[derive(Debug, Clone, Copy)]
pub struct MetricConverter {
    cal: Calibration,
}

impl MetricConverter {
    pub fn new(cal: Calibration) -> Self {
        Self { cal }
    }

    /// Convert one raw sample.
    pub fn convert(&self, raw: u16) -> f64 {
        let full_scale = i64::from(self.cal.full_scale);
        if full_scale <= 0 {
            return f64::from(self.cal.base_offset);
        }
        let scaled = (full_scale - i64::from(raw)) * i64::from(self.cal.span) / full_scale;
        (i64::from(self.cal.base_offset) + scaled) as f64
    }

    /// Wrap a raw sample and its conversion into a [`Measurement`].
    pub fn measure(&self, raw: u16, timestamp_ms: u64) -> Measurement {
        Measurement {
            timestamp_ms,
            raw,
            derived: self.convert(raw),
        }
    }
}
