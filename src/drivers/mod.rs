//! Actuator driver and timing helpers.

pub mod hw_timer;
pub mod indicator;
