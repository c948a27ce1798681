//! Engine state - the assembled, shareable handle.

pub mod engine;
