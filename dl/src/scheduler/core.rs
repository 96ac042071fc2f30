//! Dimensional scoring and phase selection

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::domain::{DIMENSION_COUNT, Dimension, DimensionalProfile, PhaseKind, PhaseRecord};

use super::config::SchedulerConfig;

/// Objective profile snapshots kept for drift extrapolation
const PROFILE_HISTORY: usize = 3;

/// Score breakdown for one candidate, for logging and tests
#[derive(Debug, Clone)]
pub struct PhaseScore {
    pub phase: PhaseKind,
    pub fit: f64,
    pub readiness: f64,
    pub recency: f64,
    pub velocity: f64,
    pub total: f64,
}

/// Ranks candidate phases against the active objective
pub struct DimensionalScheduler {
    config: SchedulerConfig,
    signatures: HashMap<PhaseKind, DimensionalProfile>,
    last_run: HashMap<PhaseKind, u64>,
    objective_history: VecDeque<DimensionalProfile>,
}

impl DimensionalScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let signatures = PhaseKind::ALL
            .iter()
            .map(|kind| (*kind, default_signature(*kind)))
            .collect();
        Self {
            config,
            signatures,
            last_run: HashMap::new(),
            objective_history: VecDeque::new(),
        }
    }

    pub fn signature(&self, phase: PhaseKind) -> DimensionalProfile {
        self.signatures.get(&phase).copied().unwrap_or_default()
    }

    /// Snapshot the active objective's profile for drift prediction
    pub fn observe_objective(&mut self, profile: DimensionalProfile) {
        self.objective_history.push_back(profile);
        while self.objective_history.len() > PROFILE_HISTORY {
            self.objective_history.pop_front();
        }
    }

    /// Score one candidate at the given iteration
    pub fn score(
        &self,
        phase: PhaseKind,
        objective: &DimensionalProfile,
        record: Option<&PhaseRecord>,
        iteration: u64,
    ) -> PhaseScore {
        let signature = self.signature(phase);

        let fit = signature.fit(objective);
        let readiness = 1.0 - record.map(|r| r.recent_failure_rate(5)).unwrap_or(0.0);
        let recency = match self.last_run.get(&phase) {
            None => 1.0,
            Some(last) => (((iteration.saturating_sub(*last)) as f64) / 5.0).min(1.0),
        };
        let velocity = match self.predicted_drift() {
            Some(predicted) => signature.fit(&predicted),
            // Without enough history the term is neutral: same as fit
            None => fit,
        };

        let total = self.config.fit_weight * fit
            + self.config.readiness_weight * readiness
            + self.config.recency_weight * recency
            + self.config.velocity_weight * velocity;

        PhaseScore {
            phase,
            fit,
            readiness,
            recency,
            velocity,
            total,
        }
    }

    /// Pick the best candidate; ties go to the least recently run
    pub fn pick(
        &self,
        candidates: &[PhaseKind],
        objective: &DimensionalProfile,
        records: &std::collections::BTreeMap<PhaseKind, PhaseRecord>,
        iteration: u64,
    ) -> Option<PhaseKind> {
        let mut scores: Vec<PhaseScore> = candidates
            .iter()
            .map(|phase| self.score(*phase, objective, records.get(phase), iteration))
            .collect();

        scores.sort_by(|a, b| {
            b.total
                .partial_cmp(&a.total)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    // Least recently run first (never-run counts as oldest)
                    let last_a = self.last_run.get(&a.phase).copied().unwrap_or(0);
                    let last_b = self.last_run.get(&b.phase).copied().unwrap_or(0);
                    last_a.cmp(&last_b)
                })
        });

        if let Some(best) = scores.first() {
            debug!(
                phase = %best.phase,
                fit = best.fit,
                readiness = best.readiness,
                recency = best.recency,
                velocity = best.velocity,
                total = best.total,
                "Scheduler pick"
            );
        }
        scores.first().map(|s| s.phase)
    }

    /// Fold an execution outcome into the phase's signature
    ///
    /// The signature is smoothed against the objective's dominant
    /// dimensions: pulled toward them on success, pushed away on failure.
    /// Components stay clamped to [0, 1] throughout.
    pub fn record_outcome(&mut self, phase: PhaseKind, success: bool, objective: &DimensionalProfile, iteration: u64) {
        self.last_run.insert(phase, iteration);

        if self.config.static_signatures {
            return;
        }

        let alpha = self.config.signature_alpha;
        let dominant = objective.dominant(3);
        if let Some(signature) = self.signatures.get_mut(&phase) {
            for dim in dominant {
                let current = signature.get(dim);
                let delta = if success {
                    alpha * (1.0 - current)
                } else {
                    -alpha * current
                };
                signature.nudge(dim, delta);
            }
        }
    }

    /// Damped linear extrapolation of the objective's profile drift
    fn predicted_drift(&self) -> Option<DimensionalProfile> {
        if self.objective_history.len() < 2 {
            return None;
        }
        let newest = self.objective_history.back()?;
        let previous = self.objective_history.get(self.objective_history.len() - 2)?;

        let mut predicted = *newest;
        for i in 0..DIMENSION_COUNT {
            let drift = newest.0[i] - previous.0[i];
            predicted.0[i] = (newest.0[i] + self.config.damping * drift).clamp(0.0, 1.0);
        }
        Some(predicted)
    }
}

/// Default dimensional signature per phase kind
fn default_signature(kind: PhaseKind) -> DimensionalProfile {
    use Dimension::*;
    let pairs: &[(Dimension, f64)] = match kind {
        PhaseKind::Planning => &[(Temporal, 0.8), (Context, 0.7), (Architecture, 0.5)],
        PhaseKind::Coding => &[(Functional, 0.9), (Data, 0.5), (State, 0.4)],
        PhaseKind::Qa => &[(Error, 0.7), (Functional, 0.6), (Data, 0.4)],
        PhaseKind::Debugging => &[(Error, 0.9), (State, 0.6), (Functional, 0.4)],
        PhaseKind::Refactoring => &[(Architecture, 0.6), (Functional, 0.5), (Context, 0.4)],
        PhaseKind::Investigation => &[(Context, 0.8), (Error, 0.5), (Data, 0.5)],
        PhaseKind::Documentation => &[(Architecture, 0.7), (Context, 0.6)],
        PhaseKind::ProjectPlanning => &[(Temporal, 0.7), (Architecture, 0.6), (Context, 0.5)],
        PhaseKind::ToolDesign => &[(Integration, 0.7), (Functional, 0.5)],
        PhaseKind::ToolEvaluation => &[(Integration, 0.6), (Error, 0.5)],
        PhaseKind::PromptDesign => &[(Context, 0.7), (Functional, 0.4)],
        PhaseKind::PromptImprovement => &[(Context, 0.6), (Error, 0.4)],
        PhaseKind::RoleDesign => &[(Context, 0.6), (Integration, 0.4)],
        PhaseKind::RoleImprovement => &[(Context, 0.5), (Error, 0.4)],
    };
    DimensionalProfile::from_pairs(pairs)
}
