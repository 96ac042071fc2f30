//! Coordinator configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Knobs for the outer loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Hard iteration cap; 0 means unbounded
    #[serde(rename = "max-iterations")]
    pub max_iterations: u64,

    /// Per-phase execution deadline in milliseconds
    #[serde(rename = "phase-timeout-ms")]
    pub phase_timeout_ms: u64,

    /// Grace period after a deadline before the phase is abandoned
    #[serde(rename = "grace-period-ms")]
    pub grace_period_ms: u64,

    /// Run the pattern optimizer every this many iterations
    #[serde(rename = "optimizer-interval")]
    pub optimizer_interval: u64,

    /// Validate architecture every this many iterations
    #[serde(rename = "architecture-check-interval")]
    pub architecture_check_interval: u64,

    /// Identical decisions with no progress before meta-reasoning fires
    #[serde(rename = "loop-window")]
    pub loop_window: usize,

    /// Recursion bound for meta-reasoning
    #[serde(rename = "meta-recursion-cap")]
    pub meta_recursion_cap: u32,

    /// Consecutive phase errors that stop the loop
    #[serde(rename = "consecutive-error-cap")]
    pub consecutive_error_cap: u64,

    /// Consecutive save failures that stop the loop
    #[serde(rename = "save-failure-cap")]
    pub save_failure_cap: u64,

    /// Master objective completion that ends the run
    #[serde(rename = "completion-threshold")]
    pub completion_threshold: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 0,
            phase_timeout_ms: 30 * 60 * 1000,
            grace_period_ms: 10_000,
            optimizer_interval: 50,
            architecture_check_interval: 5,
            loop_window: 5,
            meta_recursion_cap: 61,
            consecutive_error_cap: 10,
            save_failure_cap: 3,
            completion_threshold: 0.95,
        }
    }
}

impl CoordinatorConfig {
    pub fn phase_timeout(&self) -> Duration {
        Duration::from_millis(self.phase_timeout_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}
