//! Correlation engine
//!
//! Aggregates findings from the investigation phase and links pairs that
//! match known cross-component relations.

mod engine;

pub use engine::{CORRELATION_WINDOW, CorrelationEngine};
