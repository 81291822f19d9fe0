//! Vigil Test Kit
//!
//! Shared fixtures for unit and scenario tests: snapshot builders,
//! position factories, and a test configuration.

#![warn(clippy::all)]

pub mod helpers;

pub use helpers::{t0, test_config, test_position, SnapshotBuilder};
