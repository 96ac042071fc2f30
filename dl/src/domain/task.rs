//! Task - a concrete unit of intended work

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::id::generate_id;
use super::priority::Priority;
use patternstore::now_ms;

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created but not yet picked up
    #[default]
    Pending,
    /// A phase is working on it
    InProgress,
    /// Done and verified
    Completed,
    /// Abandoned after repeated failures
    Failed,
    /// QA attached at least one issue; must go to debugging or refactoring
    NeedsFixes,
    /// Waiting on another task or external input
    Blocked,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::NeedsFixes => write!(f, "needs_fixes"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

/// Kind of defect attached to a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingMethod,
    Duplicate,
    IntegrationConflict,
    DeadCode,
    Complexity,
    ArchitectureViolation,
    BugFix,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingMethod => "missing_method",
            Self::Duplicate => "duplicate",
            Self::IntegrationConflict => "integration_conflict",
            Self::DeadCode => "dead_code",
            Self::Complexity => "complexity",
            Self::ArchitectureViolation => "architecture_violation",
            Self::BugFix => "bug_fix",
        }
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Defect severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    #[default]
    Minor,
    Major,
    Critical,
}

/// A defect payload attached to a `needs_fixes` task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: IssueSeverity,
    pub description: String,
    /// Name of the phase that found it
    pub found_by: String,
}

impl Issue {
    pub fn new(kind: IssueKind, severity: IssueSeverity, description: impl Into<String>, found_by: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            description: description.into(),
            found_by: found_by.into(),
        }
    }
}

/// A concrete unit of work attached to one or more target files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Stable identifier
    pub id: String,

    /// Short imperative title
    pub title: String,

    /// What needs doing and why
    pub description: String,

    /// Current lifecycle status
    pub status: TaskStatus,

    /// Files this task creates or modifies (project-relative)
    pub target_files: BTreeSet<String>,

    /// Scheduling priority
    pub priority: Priority,

    /// How many times a phase has attempted this task
    pub attempts: u32,

    /// Parent objective id, if linked
    pub objective: Option<String>,

    /// Free-form analysis payload produced by planning or QA
    #[serde(default)]
    pub analysis: serde_json::Value,

    /// Defect payload; required while status is `needs_fixes`
    pub issue: Option<Issue>,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Task {
    /// Create a new pending task with a generated id
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        let title = title.into();
        let now = now_ms();
        Self {
            id: generate_id("task", &title),
            title,
            description: description.into(),
            status: TaskStatus::Pending,
            target_files: BTreeSet::new(),
            priority: Priority::Normal,
            attempts: 0,
            objective: None,
            analysis: serde_json::Value::Null,
            issue: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a task with a specific id (for tests and recovery)
    pub fn with_id(id: impl Into<String>, title: impl Into<String>) -> Self {
        let mut task = Self::new("", "");
        task.id = id.into();
        task.title = title.into();
        task
    }

    /// Add a target file
    pub fn with_target_file(mut self, path: impl Into<String>) -> Self {
        self.target_files.insert(path.into());
        self.updated_at = now_ms();
        self
    }

    /// Link to an objective
    pub fn with_objective(mut self, objective_id: impl Into<String>) -> Self {
        self.objective = Some(objective_id.into());
        self.updated_at = now_ms();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self.updated_at = now_ms();
        self
    }

    /// Update the status
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = now_ms();
    }

    /// Attach a defect and move to `needs_fixes`
    pub fn mark_needs_fixes(&mut self, issue: Issue) {
        self.issue = Some(issue);
        self.set_status(TaskStatus::NeedsFixes);
    }

    /// Record another attempt
    pub fn record_attempt(&mut self) {
        self.attempts += 1;
        self.updated_at = now_ms();
    }

    /// Check if the task is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Validate the needs_fixes invariant: an issue payload and at least
    /// one target file must be present.
    pub fn validate(&self) -> Result<(), String> {
        if self.status == TaskStatus::NeedsFixes {
            if self.issue.is_none() {
                return Err(format!("task {} is needs_fixes without an issue payload", self.id));
            }
            if self.target_files.is_empty() {
                return Err(format!("task {} is needs_fixes without target files", self.id));
            }
        }
        Ok(())
    }
}
