//! Dimensional scheduler
//!
//! Ranks candidate phases against the active objective's dimensional
//! profile. Phase signatures are live: they drift with outcomes unless the
//! compatibility flag pins them static.

mod config;
mod core;

pub use config::SchedulerConfig;
pub use core::{DimensionalScheduler, PhaseScore};
