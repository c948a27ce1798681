//! Engine services: concurrency primitives, the mutation coordinator,
//! timers and the game flow built on top of them.

pub mod coordinator;
pub mod dispatch;
pub mod faults;
pub mod game_flow;
pub mod liveness;
pub mod locks;
pub mod registry;
pub mod timers;
