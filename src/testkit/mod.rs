//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`agent`] - [`MockAgent`](agent::MockAgent), a scriptable
//!   [`TransportAgent`](crate::lifecycle::TransportAgent), and
//!   [`GatedAgent`](agent::GatedAgent), which parks calls so tests can race
//!   them against other callers.
//! - [`config`] - Canonical test configurations.

pub mod agent;
pub mod config;
