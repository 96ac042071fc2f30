//! ToolValidator - rolling effectiveness metrics and deprecation
//!
//! Every dispatch reports back here. The validator owns the per-tool
//! metric record and applies the deprecation rule; deprecated tools still
//! execute, the handler just emits a warning alongside.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use serde::Serialize;
use tracing::{info, warn};

use patternstore::now_ms;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Deprecation rule constants
const DEPRECATION_MAX_SUCCESS_RATE: f64 = 0.2;
const DEPRECATION_MIN_CALLS: u64 = 20;
const DEPRECATION_STALE_DAYS: i64 = 30;

/// Rolling metrics for one tool
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolMetrics {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,

    /// Calls broken down by issuing phase
    pub per_phase: BTreeMap<String, u64>,

    /// Failure counts by error kind
    pub error_kinds: BTreeMap<String, u64>,

    pub total_duration_ms: u64,
    pub first_use: Option<i64>,
    pub last_use: Option<i64>,
    pub last_success: Option<i64>,
}

impl ToolMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.successes as f64 / self.calls as f64
        }
    }

    pub fn average_duration_ms(&self) -> u64 {
        if self.calls == 0 { 0 } else { self.total_duration_ms / self.calls }
    }
}

/// Process-wide tool effectiveness tracker
pub struct ToolValidator {
    metrics: Mutex<HashMap<String, ToolMetrics>>,
    deprecated: Mutex<HashSet<String>>,
}

impl ToolValidator {
    pub fn new() -> Self {
        Self {
            metrics: Mutex::new(HashMap::new()),
            deprecated: Mutex::new(HashSet::new()),
        }
    }

    /// Record one dispatch outcome
    pub fn record(&self, tool: &str, success: bool, phase: &str, duration_ms: u64, error_kind: Option<&str>) {
        let now = now_ms();
        let mut metrics = self.metrics.lock().unwrap();
        let entry = metrics.entry(tool.to_string()).or_default();

        entry.calls += 1;
        entry.total_duration_ms += duration_ms;
        *entry.per_phase.entry(phase.to_string()).or_default() += 1;
        entry.first_use.get_or_insert(now);
        entry.last_use = Some(now);

        if success {
            entry.successes += 1;
            entry.last_success = Some(now);
        } else {
            entry.failures += 1;
            if let Some(kind) = error_kind {
                *entry.error_kinds.entry(kind.to_string()).or_default() += 1;
            }
        }
    }

    /// Effectiveness in [0, 1]: success rate damped while the sample is
    /// small, so a tool is not judged on its first couple of calls.
    pub fn effectiveness(&self, tool: &str) -> f64 {
        let metrics = self.metrics.lock().unwrap();
        match metrics.get(tool) {
            Some(m) => {
                let damp = (m.calls as f64 / 5.0).min(1.0);
                (m.success_rate() * damp).clamp(0.0, 1.0)
            }
            None => 0.0,
        }
    }

    pub fn metrics(&self, tool: &str) -> Option<ToolMetrics> {
        self.metrics.lock().unwrap().get(tool).cloned()
    }

    /// Tools currently matching the deprecation rule, evaluated at `now`:
    /// `success_rate < 0.2 AND calls >= 20 AND days_since_last_success > 30`
    pub fn deprecation_candidates_at(&self, now: i64) -> Vec<String> {
        let metrics = self.metrics.lock().unwrap();
        let mut candidates: Vec<String> = metrics
            .iter()
            .filter(|(_, m)| {
                let stale_since = m.last_success.or(m.first_use).unwrap_or(now);
                m.success_rate() < DEPRECATION_MAX_SUCCESS_RATE
                    && m.calls >= DEPRECATION_MIN_CALLS
                    && (now - stale_since) / DAY_MS > DEPRECATION_STALE_DAYS
            })
            .map(|(name, _)| name.clone())
            .collect();
        candidates.sort();
        candidates
    }

    pub fn deprecation_candidates(&self) -> Vec<String> {
        self.deprecation_candidates_at(now_ms())
    }

    /// Apply the rule and mark new candidates; returns the newly marked
    pub fn refresh_deprecations(&self) -> Vec<String> {
        let candidates = self.deprecation_candidates();
        let mut deprecated = self.deprecated.lock().unwrap();
        let mut newly = Vec::new();
        for name in candidates {
            if deprecated.insert(name.clone()) {
                warn!(tool = %name, "Tool marked deprecated");
                newly.push(name);
            }
        }
        newly
    }

    pub fn is_deprecated(&self, tool: &str) -> bool {
        self.deprecated.lock().unwrap().contains(tool)
    }

    /// Manual deprecation (tool evaluation phase)
    pub fn mark_deprecated(&self, tool: &str) {
        info!(tool, "Tool deprecated by evaluation");
        self.deprecated.lock().unwrap().insert(tool.to_string());
    }
}

impl Default for ToolValidator {
    fn default() -> Self {
        Self::new()
    }
}
