//! Test support for the engine crates
//!
//! Shared logging bootstrap and helpers for generating collision-free ids
//! and names across unit and integration tests.

pub mod logging;
pub mod unique_helpers;
