//! Infrastructure layer - database bootstrap and engine assembly.

pub mod db;
pub mod state;
