//! Application core.
//!
//! The control loop that ties sampling, classification, actuation and
//! the hub together.  Everything outside the loop is reached through
//! the traits in [`ports`], the `embedded-hal` traits, or
//! [`HubClient`](crate::cloud::hub::HubClient), so the whole core runs
//! against mocks in tests.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
