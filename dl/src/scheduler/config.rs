//! Scheduler configuration

use serde::{Deserialize, Serialize};

/// Weights and knobs for the dimensional scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Weight of profile fit
    #[serde(rename = "fit-weight")]
    pub fit_weight: f64,

    /// Weight of phase readiness (inverse recent failure rate)
    #[serde(rename = "readiness-weight")]
    pub readiness_weight: f64,

    /// Weight of the not-just-run bonus
    #[serde(rename = "recency-weight")]
    pub recency_weight: f64,

    /// Weight of the dimensional-drift alignment term
    #[serde(rename = "velocity-weight")]
    pub velocity_weight: f64,

    /// Smoothing factor for live signature updates
    #[serde(rename = "signature-alpha")]
    pub signature_alpha: f64,

    /// Damping applied to the extrapolated objective drift
    pub damping: f64,

    /// Compatibility mode: keep the default signatures fixed
    #[serde(rename = "static-signatures")]
    pub static_signatures: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fit_weight: 0.5,
            readiness_weight: 0.3,
            recency_weight: 0.1,
            velocity_weight: 0.1,
            signature_alpha: 0.15,
            damping: 0.5,
            static_signatures: false,
        }
    }
}
