//! Severity band classification of the reservoir level.
//!
//! The derived reading is normalised against the configured operating
//! domain and bucketed with fixed thresholds:
//!
//! ```text
//!   pct <= 0.2        → Critical
//!   0.2 < pct <= 0.5  → Warning
//!   pct > 0.5         → Good
//! ```
//!
//! Readings that normalise outside `[0, 1]` are hardware glitches.  They
//! are still classified (see [`BandClassifier::classify`]); the caller
//! decides what else they may touch via [`is_plausible`].

use core::fmt;
use core::str::FromStr;

use crate::config::MeasurementDomain;

const CRITICAL_THRESHOLD: f64 = 0.2;
const WARNING_THRESHOLD: f64 = 0.5;

/// Discrete severity state.  Not a scale: bands are compared only for
/// equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Good,
    Warning,
    Critical,
}

impl Band {
    /// Wire and display name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Warning => "Warning",
            Self::Critical => "Critical",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for level strings that name no band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBand;

impl fmt::Display for UnknownBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown severity level")
    }
}

impl FromStr for Band {
    type Err = UnknownBand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Good" => Ok(Self::Good),
            "Warning" => Ok(Self::Warning),
            "Critical" => Ok(Self::Critical),
            _ => Err(UnknownBand),
        }
    }
}

/// True when a normalised reading can be shown as "percent remaining".
pub fn is_plausible(pct: f64) -> bool {
    (0.0..=1.0).contains(&pct)
}

#[derive(Debug, Clone, Copy)]
pub struct BandClassifier {
    domain: MeasurementDomain,
}

impl BandClassifier {
    pub fn new(domain: MeasurementDomain) -> Self {
        Self { domain }
    }

    /// `(derived - min) / (max - min)`; not clamped.
    pub fn normalize(&self, derived: f64) -> f64 {
        (derived - self.domain.min) / (self.domain.max - self.domain.min)
    }

    /// Each threshold belongs to the lower band.
    pub fn classify(&self, pct: f64) -> Band {
        if pct <= CRITICAL_THRESHOLD {
            Band::Critical
        } else if pct <= WARNING_THRESHOLD {
            Band::Warning
        } else {
            Band::Good
        }
    }
}
