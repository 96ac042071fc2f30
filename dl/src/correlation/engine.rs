//! Pairwise correlation of cross-component findings

use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;

use crate::domain::{Correlation, CorrelationKind, Finding, FindingComponent};

/// Window inside which "A precedes B" counts as related
pub const CORRELATION_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Holds the findings of the current run and produces correlations
///
/// The engine keeps no long-term state: consumers read correlations from
/// the pipeline state where the investigation phase stores them.
pub struct CorrelationEngine {
    findings: Mutex<Vec<Finding>>,
    window_ms: i64,
}

impl CorrelationEngine {
    pub fn new() -> Self {
        Self {
            findings: Mutex::new(Vec::new()),
            window_ms: CORRELATION_WINDOW.as_millis() as i64,
        }
    }

    /// Add one finding to the current run
    pub fn add_finding(&self, finding: Finding) {
        debug!(component = finding.component.as_str(), kind = %finding.kind, "Finding added");
        self.findings.lock().unwrap().push(finding);
    }

    pub fn pending_count(&self) -> usize {
        self.findings.lock().unwrap().len()
    }

    /// Correlate all pending findings and clear the buffer
    ///
    /// Relations checked, cause before effect within the window:
    /// - configuration change precedes a code-change failure
    /// - code change precedes a performance regression
    /// - architecture finding coincides with an integration conflict
    pub fn correlate(&self) -> Vec<Correlation> {
        let findings = std::mem::take(&mut *self.findings.lock().unwrap());
        let mut correlations = Vec::new();

        for cause in &findings {
            for effect in &findings {
                let gap = effect.at - cause.at;
                if gap < 0 || gap > self.window_ms {
                    continue;
                }

                let matched = match (cause.component, effect.component) {
                    (FindingComponent::Configuration, FindingComponent::CodeChange) if effect.kind == "error" => {
                        Some((
                            CorrelationKind::ConfigPrecedesFailure,
                            format!("configuration change '{}' preceded error '{}'", cause.kind, effect.kind),
                        ))
                    }
                    (FindingComponent::CodeChange, FindingComponent::Performance)
                        if effect.kind == "regression" =>
                    {
                        Some((
                            CorrelationKind::ChangePrecedesRegression,
                            format!("code change '{}' preceded performance regression", cause.kind),
                        ))
                    }
                    (FindingComponent::Architecture, FindingComponent::CodeChange)
                        if effect.kind == "integration_conflict" =>
                    {
                        Some((
                            CorrelationKind::ArchitectureIntegration,
                            format!("architecture finding '{}' coincides with integration conflict", cause.kind),
                        ))
                    }
                    _ => None,
                };

                if let Some((kind, description)) = matched {
                    // Closer in time means higher confidence
                    let confidence = 1.0 - (gap as f64 / self.window_ms as f64) * 0.5;
                    correlations.push(Correlation::new(
                        kind,
                        confidence,
                        description,
                        cause.clone(),
                        effect.clone(),
                    ));
                }
            }
        }

        debug!(count = correlations.len(), "Correlation pass complete");
        correlations
    }
}

impl Default for CorrelationEngine {
    fn default() -> Self {
        Self::new()
    }
}
