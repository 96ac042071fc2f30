//! Phase framework
//!
//! Every phase implements one entry point and receives its collaborators
//! through [`PhaseContext`] - a phase never constructs shared components.

mod analyzer;
mod coding;
pub(crate) mod context;
mod conversation;
mod debugging;
mod design;
mod documentation;
mod driver;
mod investigation;
mod planning;
mod project_planning;
mod qa;
mod refactoring;

pub use analyzer::{Analyzer, Findings, ImportGraphAnalyzer, SourceMetricsAnalyzer};
pub use coding::CodingPhase;
pub use context::{Collaborators, PhaseContext};
pub use conversation::{Conversation, ConversationEntry, EntryTag, PruneMode, PrunePolicy};
pub use debugging::DebuggingPhase;
pub use design::{
    PromptDesignPhase, PromptImprovementPhase, RoleDesignPhase, RoleImprovementPhase, ToolDesignPhase,
    ToolEvaluationPhase,
};
pub use documentation::DocumentationPhase;
pub use driver::{DEFAULT_MAX_TURNS, DriveOptions, DriveReport, drive};
pub use investigation::InvestigationPhase;
pub use planning::PlanningPhase;
pub use project_planning::ProjectPlanningPhase;
pub use qa::QaPhase;
pub use refactoring::RefactoringPhase;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{PhaseKind, Task};

/// Why a phase result reports failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseErrorKind {
    /// Retryable: model timeout, transport hiccup
    Transient,
    /// Not retryable without intervention
    Fatal,
    /// The phase deadline expired
    Timeout,
    /// A task-type tool budget was overrun
    BudgetExceeded,
}

/// Execution telemetry carried on every result
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PhaseTelemetry {
    pub duration_ms: u64,
    pub tool_calls: u32,
    pub model_calls: u32,
}

/// What one phase execution produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseResult {
    pub success: bool,
    pub summary: String,

    pub files_created: Vec<String>,
    pub files_modified: Vec<String>,

    /// Names of the tools the phase invoked, in issue order
    pub tools_used: Vec<String>,

    pub issues_raised: u32,
    pub issues_fixed: u32,
    pub messages_published: u32,

    /// Suggestion for the coordinator's next decision
    pub next_phase_hint: Option<PhaseKind>,

    pub error_kind: Option<PhaseErrorKind>,

    pub telemetry: PhaseTelemetry,
}

impl PhaseResult {
    pub fn ok(summary: impl Into<String>) -> Self {
        Self {
            success: true,
            summary: summary.into(),
            files_created: Vec::new(),
            files_modified: Vec::new(),
            tools_used: Vec::new(),
            issues_raised: 0,
            issues_fixed: 0,
            messages_published: 0,
            next_phase_hint: None,
            error_kind: None,
            telemetry: PhaseTelemetry::default(),
        }
    }

    pub fn failed(summary: impl Into<String>, kind: PhaseErrorKind) -> Self {
        Self {
            success: false,
            error_kind: Some(kind),
            ..Self::ok(summary)
        }
    }

    pub fn with_hint(mut self, hint: PhaseKind) -> Self {
        self.next_phase_hint = Some(hint);
        self
    }
}

/// A named, self-contained unit of work executed by the coordinator
#[async_trait]
pub trait Phase: Send + Sync {
    fn kind(&self) -> PhaseKind;

    /// Run the phase against the current state
    ///
    /// Errors never escape this boundary: implementations convert every
    /// failure into a `PhaseResult` with `success = false`.
    async fn execute(&self, ctx: &mut PhaseContext, task: Option<Task>) -> PhaseResult;
}
