//! Pattern learning
//!
//! Executions are distilled into patterns; patterns with enough confidence
//! bias scheduling; the optimizer keeps the pattern table from rotting.

mod optimizer;
mod recognition;

pub use optimizer::{OptimizerReport, PatternOptimizer};
pub use recognition::{ExecutionSample, PatternRecognition, RecommendedAction, Recommendation};
