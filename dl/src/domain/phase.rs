//! Phase kinds and per-phase execution records

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use patternstore::now_ms;

/// Bound on per-phase run history
pub const RUN_HISTORY_CAP: usize = 20;

/// Every executable phase in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Planning,
    Coding,
    Qa,
    Debugging,
    Refactoring,
    Investigation,
    Documentation,
    ProjectPlanning,
    ToolDesign,
    ToolEvaluation,
    PromptDesign,
    PromptImprovement,
    RoleDesign,
    RoleImprovement,
}

impl PhaseKind {
    /// All phases in declaration order
    pub const ALL: [PhaseKind; 14] = [
        PhaseKind::Planning,
        PhaseKind::Coding,
        PhaseKind::Qa,
        PhaseKind::Debugging,
        PhaseKind::Refactoring,
        PhaseKind::Investigation,
        PhaseKind::Documentation,
        PhaseKind::ProjectPlanning,
        PhaseKind::ToolDesign,
        PhaseKind::ToolEvaluation,
        PhaseKind::PromptDesign,
        PhaseKind::PromptImprovement,
        PhaseKind::RoleDesign,
        PhaseKind::RoleImprovement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Coding => "coding",
            Self::Qa => "qa",
            Self::Debugging => "debugging",
            Self::Refactoring => "refactoring",
            Self::Investigation => "investigation",
            Self::Documentation => "documentation",
            Self::ProjectPlanning => "project_planning",
            Self::ToolDesign => "tool_design",
            Self::ToolEvaluation => "tool_evaluation",
            Self::PromptDesign => "prompt_design",
            Self::PromptImprovement => "prompt_improvement",
            Self::RoleDesign => "role_design",
            Self::RoleImprovement => "role_improvement",
        }
    }

    /// Upper-case stem used for the phase's IPC mailbox documents
    /// (`PLANNING_READ.md` / `PLANNING_WRITE.md`)
    pub fn document_stem(&self) -> String {
        self.as_str().to_uppercase()
    }
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PhaseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PhaseKind::ALL
            .iter()
            .find(|kind| kind.as_str() == s.to_lowercase())
            .copied()
            .ok_or_else(|| format!("Unknown phase: {}", s))
    }
}

/// One entry in a phase's bounded run history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub success: bool,
    pub duration_ms: u64,
    pub summary: String,
    pub at: i64,
}

/// Per-phase execution aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub kind: PhaseKind,
    pub total_runs: u64,
    pub successful_runs: u64,
    pub consecutive_failures: u64,
    pub total_duration_ms: u64,

    /// Last [`RUN_HISTORY_CAP`] executions, oldest first
    pub history: VecDeque<RunRecord>,

    pub updated_at: i64,
}

impl PhaseRecord {
    pub fn new(kind: PhaseKind) -> Self {
        Self {
            kind,
            total_runs: 0,
            successful_runs: 0,
            consecutive_failures: 0,
            total_duration_ms: 0,
            history: VecDeque::new(),
            updated_at: now_ms(),
        }
    }

    /// Fold one execution into the aggregate
    pub fn record_run(&mut self, success: bool, duration_ms: u64, summary: impl Into<String>) {
        self.total_runs += 1;
        self.total_duration_ms += duration_ms;
        if success {
            self.successful_runs += 1;
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
        }

        self.history.push_back(RunRecord {
            success,
            duration_ms,
            summary: summary.into(),
            at: now_ms(),
        });
        while self.history.len() > RUN_HISTORY_CAP {
            self.history.pop_front();
        }

        self.updated_at = now_ms();
    }

    pub fn average_duration_ms(&self) -> u64 {
        if self.total_runs == 0 {
            0
        } else {
            self.total_duration_ms / self.total_runs
        }
    }

    /// Failure rate over the last `n` history entries, in [0, 1]
    pub fn recent_failure_rate(&self, n: usize) -> f64 {
        let recent: Vec<&RunRecord> = self.history.iter().rev().take(n).collect();
        if recent.is_empty() {
            return 0.0;
        }
        let failures = recent.iter().filter(|r| !r.success).count();
        failures as f64 / recent.len() as f64
    }

    /// Invariant: failures in a row can never exceed total failures
    pub fn validate(&self) -> Result<(), String> {
        if self.consecutive_failures > self.total_runs - self.successful_runs {
            return Err(format!(
                "phase {} has consecutive_failures {} > total failures {}",
                self.kind,
                self.consecutive_failures,
                self.total_runs - self.successful_runs
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_kind_roundtrip() {
        for kind in PhaseKind::ALL {
            let parsed: PhaseKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_document_stem() {
        assert_eq!(PhaseKind::Planning.document_stem(), "PLANNING");
        assert_eq!(PhaseKind::ProjectPlanning.document_stem(), "PROJECT_PLANNING");
    }

    #[test]
    fn test_record_run_counters() {
        let mut record = PhaseRecord::new(PhaseKind::Coding);
        record.record_run(true, 100, "ok");
        record.record_run(false, 200, "failed");
        record.record_run(false, 300, "failed again");

        assert_eq!(record.total_runs, 3);
        assert_eq!(record.successful_runs, 1);
        assert_eq!(record.consecutive_failures, 2);
        assert_eq!(record.average_duration_ms(), 200);
    }

    #[test]
    fn test_consecutive_failures_reset_on_success() {
        let mut record = PhaseRecord::new(PhaseKind::Qa);
        record.record_run(false, 10, "f");
        record.record_run(false, 10, "f");
        record.record_run(true, 10, "s");
        assert_eq!(record.consecutive_failures, 0);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_history_capped() {
        let mut record = PhaseRecord::new(PhaseKind::Coding);
        for i in 0..30 {
            record.record_run(true, i, format!("run {}", i));
        }
        assert_eq!(record.history.len(), RUN_HISTORY_CAP);
        assert_eq!(record.history.back().unwrap().summary, "run 29");
    }

    #[test]
    fn test_recent_failure_rate() {
        let mut record = PhaseRecord::new(PhaseKind::Debugging);
        for _ in 0..5 {
            record.record_run(false, 10, "f");
        }
        for _ in 0..5 {
            record.record_run(true, 10, "s");
        }
        assert!((record.recent_failure_rate(10) - 0.5).abs() < f64::EPSILON);
        assert_eq!(record.recent_failure_rate(5), 0.0);
    }
}
