//! Coordinator
//!
//! The outer loop: decide which phase runs next, execute it with a
//! deadline, absorb the result, persist, repeat until a stop condition.

mod config;
mod core;
mod observer;

pub use config::CoordinatorConfig;
pub use core::{Coordinator, CoordinatorHandle, StopReason};
pub use observer::spawn_observer;
