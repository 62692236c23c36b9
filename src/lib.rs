//! LevelWatch monitor library.
//!
//! Samples a load cell through an SPI ADC, classifies the remaining
//! level into severity bands, drives an alarm output and keeps a
//! telemetry/command channel open to a remote hub.  Hardware and hub
//! access go through `embedded-hal` and [`cloud::hub`] traits, so the
//! whole loop runs against the simulated adapters on a host.

#![deny(unused_must_use)]

pub mod app;
pub mod cloud;
pub mod config;
pub mod error;
pub mod pins;
pub mod shutdown;

pub mod adapters;
pub mod control;
pub mod drivers;
pub mod sensors;
