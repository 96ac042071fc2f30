//! ToolCreator - turns repeated unknown-tool attempts into proposals
//!
//! Models keep inventing tools they wish existed. The creator records every
//! name that failed the whitelist; once the same name has been attempted in
//! enough distinct contexts, it synthesizes a proposal with the parameters
//! inferred from the accumulated call sites and hands it to the tool design
//! phase.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, info};

/// Distinct attempts required before a proposal is synthesized
pub const DEFAULT_PROPOSAL_THRESHOLD: usize = 5;

/// A synthesized tool proposal for the tool design phase
#[derive(Debug, Clone, Serialize)]
pub struct ToolProposal {
    pub name: String,

    /// Union of argument keys observed across the call sites
    pub inferred_parameters: BTreeSet<String>,

    /// Phases that attempted the call
    pub observed_phases: BTreeSet<String>,

    pub attempt_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AttemptContext {
    phase: String,
    arg_keys: BTreeSet<String>,
}

/// Tracks unresolved tool names across phase executions
///
/// One instance lives for the whole coordinator lifetime and is injected
/// into the handler (never constructed inside it).
pub struct ToolCreator {
    threshold: usize,
    attempts: Mutex<HashMap<String, HashSet<AttemptContext>>>,
    proposed: Mutex<HashSet<String>>,
}

impl ToolCreator {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            attempts: Mutex::new(HashMap::new()),
            proposed: Mutex::new(HashSet::new()),
        }
    }

    /// Record an attempt to call a tool that did not resolve
    pub fn record_unknown(&self, name: &str, phase: &str, arguments: &serde_json::Value) {
        let arg_keys: BTreeSet<String> = arguments
            .as_object()
            .map(|obj| obj.keys().cloned().collect())
            .unwrap_or_default();

        let context = AttemptContext {
            phase: phase.to_string(),
            arg_keys,
        };

        let mut attempts = self.attempts.lock().unwrap();
        let contexts = attempts.entry(name.to_string()).or_default();
        if contexts.insert(context) {
            debug!(tool = name, phase, contexts = contexts.len(), "Recorded unknown tool attempt");
        }
    }

    /// Distinct contexts recorded for a name
    pub fn attempt_count(&self, name: &str) -> usize {
        self.attempts.lock().unwrap().get(name).map(|c| c.len()).unwrap_or(0)
    }

    /// Names past the threshold that have not been proposed yet
    pub fn pending_proposal_count(&self) -> usize {
        let attempts = self.attempts.lock().unwrap();
        let proposed = self.proposed.lock().unwrap();
        attempts
            .iter()
            .filter(|(name, contexts)| contexts.len() >= self.threshold && !proposed.contains(*name))
            .count()
    }

    /// Drain proposals whose names crossed the threshold
    ///
    /// Each name is proposed at most once.
    pub fn take_proposals(&self) -> Vec<ToolProposal> {
        let attempts = self.attempts.lock().unwrap();
        let mut proposed = self.proposed.lock().unwrap();

        let mut proposals = Vec::new();
        for (name, contexts) in attempts.iter() {
            if contexts.len() >= self.threshold && !proposed.contains(name) {
                let mut inferred_parameters = BTreeSet::new();
                let mut observed_phases = BTreeSet::new();
                for context in contexts {
                    inferred_parameters.extend(context.arg_keys.iter().cloned());
                    observed_phases.insert(context.phase.clone());
                }

                info!(tool = %name, attempts = contexts.len(), "Synthesizing tool proposal");
                proposals.push(ToolProposal {
                    name: name.clone(),
                    inferred_parameters,
                    observed_phases,
                    attempt_count: contexts.len(),
                });
                proposed.insert(name.clone());
            }
        }

        proposals.sort_by(|a, b| a.name.cmp(&b.name));
        proposals
    }
}

impl Default for ToolCreator {
    fn default() -> Self {
        Self::new(DEFAULT_PROPOSAL_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_proposal_below_threshold() {
        let creator = ToolCreator::new(5);
        for i in 0..4 {
            creator.record_unknown("open", &format!("phase-{}", i), &json!({"path": "x"}));
        }
        assert_eq!(creator.attempt_count("open"), 4);
        assert!(creator.take_proposals().is_empty());
    }

    #[test]
    fn test_proposal_after_five_distinct_contexts() {
        let creator = ToolCreator::new(5);
        for i in 0..5 {
            creator.record_unknown("open", &format!("phase-{}", i), &json!({"path": "x", "mode": "r"}));
        }

        let proposals = creator.take_proposals();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].name, "open");
        assert!(proposals[0].inferred_parameters.contains("path"));
        assert!(proposals[0].inferred_parameters.contains("mode"));
        assert_eq!(proposals[0].attempt_count, 5);
    }

    #[test]
    fn test_duplicate_contexts_not_counted() {
        let creator = ToolCreator::new(5);
        for _ in 0..10 {
            creator.record_unknown("open", "coding", &json!({"path": "x"}));
        }
        // Same phase + same arg keys = one context
        assert_eq!(creator.attempt_count("open"), 1);
        assert!(creator.take_proposals().is_empty());
    }

    #[test]
    fn test_distinct_arg_shapes_count_as_contexts() {
        let creator = ToolCreator::new(3);
        creator.record_unknown("open", "coding", &json!({"path": "x"}));
        creator.record_unknown("open", "coding", &json!({"path": "x", "mode": "r"}));
        creator.record_unknown("open", "coding", &json!({"url": "y"}));

        let proposals = creator.take_proposals();
        assert_eq!(proposals.len(), 1);
        assert!(proposals[0].inferred_parameters.contains("url"));
    }

    #[test]
    fn test_proposed_once() {
        let creator = ToolCreator::new(2);
        creator.record_unknown("open", "a", &json!({"x": 1}));
        creator.record_unknown("open", "b", &json!({"x": 1}));

        assert_eq!(creator.take_proposals().len(), 1);
        assert!(creator.take_proposals().is_empty());

        // More attempts do not resurrect the proposal
        creator.record_unknown("open", "c", &json!({"x": 1}));
        assert!(creator.take_proposals().is_empty());
    }
}
