//! Pattern recognition over phase executions

use std::path::Path;
use std::sync::{Arc, Mutex};

use eyre::Result;
use tracing::debug;

use crate::domain::{PhaseKind, Pattern, PatternKind, hash_content};
use patternstore::{Filter, IndexValue, Store};

/// Default smoothing factor toward the empirical frequency
pub const DEFAULT_ALPHA: f64 = 0.2;

/// Confidence floor for recommendations
pub const RECOMMENDATION_THRESHOLD: f64 = 0.8;

/// One finished phase execution, as fed by the coordinator
#[derive(Debug, Clone)]
pub struct ExecutionSample {
    pub phase: PhaseKind,
    pub success: bool,
    pub tool_calls: Vec<String>,
    pub duration_ms: u64,

    /// Free-form context tag (dominant objective dimensions, task kind)
    pub context: String,
}

/// What a matched pattern suggests doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecommendedAction {
    RunPhase(PhaseKind),
    AvoidPhase(PhaseKind),
    PreferTools(Vec<String>),
}

/// A recommendation returned for the coordinator's decision step
#[derive(Debug, Clone)]
pub struct Recommendation {
    pub pattern: Pattern,
    pub action: RecommendedAction,
}

/// Mines patterns from executions and answers recommendation queries
pub struct PatternRecognition {
    store: Arc<Mutex<Store>>,
    alpha: f64,
    last_phase: Mutex<Option<PhaseKind>>,
}

impl PatternRecognition {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            store: Arc::new(Mutex::new(Store::open(db_path)?)),
            alpha: DEFAULT_ALPHA,
            last_phase: Mutex::new(None),
        })
    }

    /// Shared handle to the backing store (used by the optimizer)
    pub fn store(&self) -> Arc<Mutex<Store>> {
        self.store.clone()
    }

    /// Record one execution: extract candidates of all four kinds, hash
    /// their signatures and fold the observation into the table.
    ///
    /// Each candidate is observed with "was the pattern confirmed this
    /// run": an outcome pattern confirms itself by occurring, a tool-usage
    /// or transition pattern confirms when the execution succeeded.
    pub fn record_execution(&self, sample: &ExecutionSample) -> Result<()> {
        let mut descriptors: Vec<(PatternKind, String, bool)> = Vec::new();

        if !sample.tool_calls.is_empty() {
            descriptors.push((
                PatternKind::ToolUsage,
                format!("tool_usage phase={} tools={}", sample.phase, sample.tool_calls.join(">")),
                sample.success,
            ));
        }

        let outcome_kind = if sample.success { PatternKind::Success } else { PatternKind::Failure };
        descriptors.push((
            outcome_kind,
            format!("{} phase={} context={}", outcome_kind, sample.phase, sample.context),
            true,
        ));

        let previous = {
            let mut last = self.last_phase.lock().unwrap();
            last.replace(sample.phase)
        };
        if let Some(from) = previous {
            descriptors.push((
                PatternKind::PhaseTransition,
                format!("phase_transition from={} to={}", from, sample.phase),
                sample.success,
            ));
        }

        let mut store = self.store.lock().unwrap();
        for (kind, descriptor, confirmed) in descriptors {
            let signature = format!("{}-{}", kind, hash_content(&descriptor));
            let mut pattern = match store.get::<Pattern>(&signature)? {
                Some(existing) => existing,
                None => Pattern::new(kind, &signature, &descriptor),
            };
            let is_new = pattern.observation_count == 0;
            pattern.observe(confirmed, self.alpha);

            if is_new {
                store.create(pattern)?;
            } else {
                store.update(pattern)?;
            }
        }

        debug!(phase = %sample.phase, success = sample.success, "Recorded execution for pattern mining");
        Ok(())
    }

    /// Patterns above the confidence threshold that match the current
    /// context, mapped to actions.
    pub fn recommendations(&self, current_phase: Option<PhaseKind>) -> Result<Vec<Recommendation>> {
        let store = self.store.lock().unwrap();
        let confident: Vec<Pattern> = store.list(&[
            Filter::gte("confidence", IndexValue::Float(RECOMMENDATION_THRESHOLD)),
            Filter::eq("archived", IndexValue::Int(0)),
        ])?;

        let mut recommendations = Vec::new();
        for pattern in confident {
            let fields = parse_descriptor(&pattern.description);
            let action = match pattern.kind {
                PatternKind::PhaseTransition => {
                    let from = fields.get("from").and_then(|v| v.parse::<PhaseKind>().ok());
                    let to = fields.get("to").and_then(|v| v.parse::<PhaseKind>().ok());
                    match (from, to, current_phase) {
                        // Only relevant when we are at the transition source
                        (Some(from), Some(to), Some(current)) if from == current => {
                            Some(RecommendedAction::RunPhase(to))
                        }
                        _ => None,
                    }
                }
                PatternKind::Success => fields
                    .get("phase")
                    .and_then(|v| v.parse::<PhaseKind>().ok())
                    .map(RecommendedAction::RunPhase),
                PatternKind::Failure => fields
                    .get("phase")
                    .and_then(|v| v.parse::<PhaseKind>().ok())
                    .map(RecommendedAction::AvoidPhase),
                PatternKind::ToolUsage => fields
                    .get("tools")
                    .map(|tools| RecommendedAction::PreferTools(tools.split('>').map(String::from).collect())),
            };

            if let Some(action) = action {
                recommendations.push(Recommendation { pattern, action });
            }
        }

        recommendations.sort_by(|a, b| {
            b.pattern
                .confidence
                .partial_cmp(&a.pattern.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(recommendations)
    }

    /// All live (non-archived) patterns
    pub fn live_patterns(&self) -> Result<Vec<Pattern>> {
        let store = self.store.lock().unwrap();
        Ok(store.list(&[Filter::eq("archived", IndexValue::Int(0))])?)
    }
}

/// Parse `key=value` fields out of a pattern descriptor
fn parse_descriptor(description: &str) -> std::collections::HashMap<String, String> {
    description
        .split_whitespace()
        .filter_map(|token| token.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
