//! Control-side domain logic: turning readings into severity decisions.

pub mod band;
