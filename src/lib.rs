//! Virtual energy plant for exercising an external energy management system.
//!
//! The plant (grid connection, tariff, PV, storage, flexible generators and
//! a fleet of EV charge points) is simulated tick by tick and mirrored into a
//! key/value [`store`]. Commands written to the store are applied to the
//! plant between ticks. Scripted [`scenario`]s and the [`suite`] runner put
//! the plant into reproducible situations and [`report`] how often the
//! controller intervened.

#[cfg(feature = "api")]
pub mod api;
pub mod cli;
pub mod command;
pub mod config;
pub mod devices;
pub mod io;
pub mod model;
pub mod publish;
pub mod report;
pub mod rng;
pub mod runtime;
pub mod scenario;
/// Per-tick physics: clock, tariff, power balance and result types.
pub mod sim;
pub mod simulator;
pub mod store;
pub mod suite;
