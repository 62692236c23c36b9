//! Fuzz target for ADC frame decoding and the sample pipeline.

#![no_main]

use levelwatch::config::MeasurementDomain;
use levelwatch::control::band::BandClassifier;
use levelwatch::sensors::calibration::{Calibration, MetricConverter};
use levelwatch::sensors::weight::decode_frame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|frame: [u8; 3]| {
    let raw = decode_frame(&frame);
    assert!(raw <= 1023);

    let derived = MetricConverter::new(Calibration::default()).convert(raw);
    let pct = BandClassifier::new(MeasurementDomain::default()).normalize(derived);
    let _ = BandClassifier::new(MeasurementDomain::default()).classify(pct);
});
