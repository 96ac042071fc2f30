//! Learned execution patterns
//!
//! Patterns live in the patternstore (indexed by kind, confidence and
//! recency) so optimizer passes and recommendation lookups stay cheap.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use patternstore::{IndexValue, Record, now_ms};

/// What kind of regularity a pattern captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    ToolUsage,
    Failure,
    Success,
    PhaseTransition,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolUsage => "tool_usage",
            Self::Failure => "failure",
            Self::Success => "success",
            Self::PhaseTransition => "phase_transition",
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A scored observation about past executions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    /// Deterministic signature hash; doubles as the record id
    pub signature: String,

    pub kind: PatternKind,

    /// Human-readable rendering of what the pattern describes
    pub description: String,

    /// Confidence in [0, 1], smoothed toward the empirical frequency
    pub confidence: f64,

    pub observation_count: u64,
    pub successful_observations: u64,

    pub first_seen: i64,
    pub last_seen: i64,

    /// Archived patterns are kept for audit but never recommended
    pub archived: bool,

    pub updated_at: i64,
}

impl Pattern {
    pub fn new(kind: PatternKind, signature: impl Into<String>, description: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            signature: signature.into(),
            kind,
            description: description.into(),
            confidence: 0.0,
            observation_count: 0,
            successful_observations: 0,
            first_seen: now,
            last_seen: now,
            archived: false,
            updated_at: now,
        }
    }

    /// Fold in one observation, smoothing confidence toward the empirical
    /// frequency with factor `alpha`.
    pub fn observe(&mut self, success: bool, alpha: f64) {
        self.observation_count += 1;
        if success {
            self.successful_observations += 1;
        }

        let empirical = self.effectiveness();
        let alpha = alpha.clamp(0.0, 1.0);
        self.confidence = ((1.0 - alpha) * self.confidence + alpha * empirical).clamp(0.0, 1.0);

        self.last_seen = now_ms();
        self.updated_at = self.last_seen;
    }

    /// successes / observations, in [0, 1]
    pub fn effectiveness(&self) -> f64 {
        if self.observation_count == 0 {
            0.0
        } else {
            self.successful_observations as f64 / self.observation_count as f64
        }
    }

    /// Merge another pattern into this one (optimizer duplicate collapse):
    /// observations sum, confidence averages, timestamps widen.
    pub fn merge(&mut self, other: &Pattern) {
        self.observation_count += other.observation_count;
        self.successful_observations += other.successful_observations;
        self.confidence = ((self.confidence + other.confidence) / 2.0).clamp(0.0, 1.0);
        self.first_seen = self.first_seen.min(other.first_seen);
        self.last_seen = self.last_seen.max(other.last_seen);
        self.updated_at = now_ms();
    }

    /// Days since the pattern was last observed
    pub fn days_since_seen(&self) -> i64 {
        (now_ms() - self.last_seen) / (24 * 60 * 60 * 1000)
    }
}

impl Record for Pattern {
    fn id(&self) -> &str {
        &self.signature
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "patterns"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        HashMap::from([
            ("kind".to_string(), IndexValue::String(self.kind.as_str().to_string())),
            ("confidence".to_string(), IndexValue::Float(self.confidence)),
            ("last_seen".to_string(), IndexValue::Int(self.last_seen)),
            (
                "archived".to_string(),
                IndexValue::Int(if self.archived { 1 } else { 0 }),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_moves_confidence_toward_frequency() {
        let mut pattern = Pattern::new(PatternKind::Success, "sig-1", "coding succeeds after read");
        for _ in 0..50 {
            pattern.observe(true, 0.2);
        }
        assert!(pattern.confidence > 0.9);
        assert_eq!(pattern.effectiveness(), 1.0);
    }

    #[test]
    fn test_observe_mixed_outcomes() {
        let mut pattern = Pattern::new(PatternKind::ToolUsage, "sig-2", "x");
        for i in 0..40 {
            pattern.observe(i % 2 == 0, 0.2);
        }
        assert!((pattern.effectiveness() - 0.5).abs() < f64::EPSILON);
        assert!(pattern.confidence > 0.0 && pattern.confidence < 1.0);
    }

    #[test]
    fn test_confidence_bounded() {
        let mut pattern = Pattern::new(PatternKind::Failure, "sig-3", "x");
        for _ in 0..1000 {
            pattern.observe(true, 0.9);
            assert!((0.0..=1.0).contains(&pattern.confidence));
        }
    }

    #[test]
    fn test_merge_sums_observations() {
        let mut a = Pattern::new(PatternKind::Success, "sig-a", "x");
        let mut b = Pattern::new(PatternKind::Success, "sig-b", "x");
        for _ in 0..10 {
            a.observe(true, 0.2);
            b.observe(false, 0.2);
        }

        let confidence_a = a.confidence;
        let confidence_b = b.confidence;
        a.merge(&b);

        assert_eq!(a.observation_count, 20);
        assert_eq!(a.successful_observations, 10);
        assert!((a.confidence - (confidence_a + confidence_b) / 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_indexed_fields() {
        let pattern = Pattern::new(PatternKind::PhaseTransition, "sig-t", "planning then coding");
        let fields = pattern.indexed_fields();
        assert_eq!(
            fields.get("kind"),
            Some(&IndexValue::String("phase_transition".to_string()))
        );
        assert!(fields.contains_key("confidence"));
        assert!(fields.contains_key("last_seen"));
    }
}
