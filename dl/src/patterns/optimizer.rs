//! Pattern optimizer
//!
//! Runs every K coordinator iterations: prunes noise, merges duplicates,
//! archives stale patterns and compacts the backing store.

use eyre::Result;
use tracing::{debug, info};

use crate::domain::Pattern;
use patternstore::now_ms;

use super::recognition::PatternRecognition;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// What one optimizer pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizerReport {
    pub pruned: usize,
    pub merged: usize,
    pub archived: usize,
    pub retained: usize,
}

/// Maintenance pass over the pattern table
pub struct PatternOptimizer {
    /// Patterns below this confidence are removed
    pub min_confidence: f64,

    /// Description similarity at or above this merges two patterns
    pub similarity_threshold: f64,

    /// Patterns unseen for longer than this are archived
    pub archive_days: i64,
}

impl Default for PatternOptimizer {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            similarity_threshold: 0.85,
            archive_days: 90,
        }
    }
}

impl PatternOptimizer {
    /// Run one pass. Post-conditions: every retained pattern has
    /// confidence in [0, 1], at least one observation, and a unique
    /// signature.
    pub fn run(&self, recognition: &PatternRecognition) -> Result<OptimizerReport> {
        self.run_at(recognition, now_ms())
    }

    /// Same as [`run`], with an explicit clock for tests
    pub fn run_at(&self, recognition: &PatternRecognition, now: i64) -> Result<OptimizerReport> {
        let store = recognition.store();
        let mut store = store.lock().unwrap();
        let mut report = OptimizerReport::default();

        let mut patterns: Vec<Pattern> = store.list(&[])?;

        // Prune low-confidence noise
        patterns.retain(|pattern| {
            if !pattern.archived && pattern.confidence < self.min_confidence {
                let _ = store.delete::<Pattern>(&pattern.signature);
                report.pruned += 1;
                false
            } else {
                true
            }
        });

        // Merge near-duplicates: the pattern with more observations
        // absorbs the other
        let mut merged_away: Vec<String> = Vec::new();
        for i in 0..patterns.len() {
            if merged_away.contains(&patterns[i].signature) {
                continue;
            }
            for j in (i + 1)..patterns.len() {
                if merged_away.contains(&patterns[j].signature) {
                    continue;
                }
                if patterns[i].kind != patterns[j].kind {
                    continue;
                }
                let similarity = jaccard(&patterns[i].description, &patterns[j].description);
                if similarity >= self.similarity_threshold {
                    let (keep, drop) = if patterns[i].observation_count >= patterns[j].observation_count {
                        (i, j)
                    } else {
                        (j, i)
                    };
                    let absorbed = patterns[drop].clone();
                    patterns[keep].merge(&absorbed);

                    debug!(
                        keep = %patterns[keep].signature,
                        drop = %absorbed.signature,
                        similarity,
                        "Merging near-duplicate patterns"
                    );
                    store.update(patterns[keep].clone())?;
                    store.delete::<Pattern>(&absorbed.signature)?;
                    merged_away.push(absorbed.signature);
                    report.merged += 1;
                }
            }
        }
        patterns.retain(|p| !merged_away.contains(&p.signature));

        // Archive patterns unseen for too long
        for pattern in patterns.iter_mut() {
            if !pattern.archived && (now - pattern.last_seen) / DAY_MS > self.archive_days {
                pattern.archived = true;
                store.update(pattern.clone())?;
                report.archived += 1;
            }
        }

        report.retained = patterns.len();
        store.compact()?;

        info!(?report, "Optimizer pass complete");
        Ok(report)
    }
}

/// Jaccard similarity over whitespace/punctuation tokens
fn jaccard(a: &str, b: &str) -> f64 {
    let tokens_a: std::collections::HashSet<&str> =
        a.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).collect();
    let tokens_b: std::collections::HashSet<&str> =
        b.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).collect();

    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 1.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    intersection as f64 / union as f64
}
