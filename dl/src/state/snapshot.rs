//! The persisted pipeline state and its invariants

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::bus::Message;
use crate::domain::{
    Correlation, FileRecord, FileStatus, Objective, ObjectiveTier, PhaseKind, PhaseRecord, Task, TaskStatus,
    hash_content,
};

/// Bound on the recent message log kept inside the snapshot
pub const RECENT_MESSAGE_CAP: usize = 200;

/// Everything the pipeline persists between iterations
///
/// The coordinator holds the sole mutable handle (through
/// [`crate::state::StateStore`]); phases mutate through `update`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineState {
    pub tasks: BTreeMap<String, Task>,
    pub files: BTreeMap<String, FileRecord>,
    pub phases: BTreeMap<PhaseKind, PhaseRecord>,
    pub objectives: Vec<Objective>,

    /// Bounded log of recent bus traffic for post-hoc inspection
    pub recent_messages: VecDeque<Message>,

    pub correlations: Vec<Correlation>,

    /// Free-form metrics (counters, gauges) keyed by name
    pub metrics: BTreeMap<String, serde_json::Value>,

    /// Coordinator iteration counter
    pub iteration: u64,
}

impl PipelineState {
    /// Insert or replace a task, registering any target files the file
    /// mapping does not know yet (invariant 1 requires every referenced
    /// file to exist in the mapping).
    pub fn upsert_task(&mut self, task: Task) {
        for path in &task.target_files {
            self.files
                .entry(path.clone())
                .or_insert_with(|| planned_file_record(path));
        }
        self.tasks.insert(task.id.clone(), task);
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    /// Tasks in the given status, oldest first
    pub fn tasks_with_status(&self, status: TaskStatus) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.values().filter(|t| t.status == status).collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    pub fn pending_tasks(&self) -> Vec<&Task> {
        self.tasks_with_status(TaskStatus::Pending)
    }

    pub fn needs_fixes_tasks(&self) -> Vec<&Task> {
        self.tasks_with_status(TaskStatus::NeedsFixes)
    }

    pub fn completed_task_count(&self) -> usize {
        self.tasks.values().filter(|t| t.status == TaskStatus::Completed).count()
    }

    /// Per-phase record, created on first access
    pub fn phase_record_mut(&mut self, kind: PhaseKind) -> &mut PhaseRecord {
        self.phases.entry(kind).or_insert_with(|| PhaseRecord::new(kind))
    }

    /// The active objective: highest tier, least complete first
    pub fn active_objective(&self) -> Option<&Objective> {
        self.objectives
            .iter()
            .filter(|o| o.completion < 1.0)
            .max_by(|a, b| {
                a.tier
                    .cmp(&b.tier)
                    .then(b.completion.partial_cmp(&a.completion).unwrap_or(std::cmp::Ordering::Equal))
            })
    }

    /// The master (primary-tier) objective, if any
    pub fn master_objective(&self) -> Option<&Objective> {
        self.objectives.iter().find(|o| o.tier == ObjectiveTier::Primary)
    }

    pub fn objective_mut(&mut self, id: &str) -> Option<&mut Objective> {
        self.objectives.iter_mut().find(|o| o.id == id)
    }

    /// Append to the bounded recent message log
    pub fn record_message(&mut self, msg: Message) {
        self.recent_messages.push_back(msg);
        while self.recent_messages.len() > RECENT_MESSAGE_CAP {
            self.recent_messages.pop_front();
        }
    }

    /// Track a file observation, creating the record when new
    pub fn observe_file(&mut self, path: &str, content: &str, status: FileStatus, pipeline_created: bool) {
        match self.files.get_mut(path) {
            Some(record) => record.observe(content, status),
            None => {
                let mut record = if pipeline_created {
                    FileRecord::created(path, content)
                } else {
                    FileRecord::modified(path, content)
                };
                record.status = status;
                self.files.insert(path.to_string(), record);
            }
        }
    }

    /// Validate every cross-entity invariant; the first violation aborts a
    /// save attempt.
    pub fn validate(&self) -> Result<(), String> {
        // 1. Every task references files known to the file mapping, and
        //    needs_fixes tasks carry an issue + targets.
        for task in self.tasks.values() {
            task.validate()?;
            for path in &task.target_files {
                if !self.files.contains_key(path) {
                    return Err(format!("task {} references untracked file {}", task.id, path));
                }
            }
        }

        // 2. Phase counters stay coherent.
        for record in self.phases.values() {
            record.validate()?;
        }

        // 5. Objective profiles stay inside the unit cube.
        for objective in &self.objectives {
            if !objective.profile.in_bounds() {
                return Err(format!("objective {} has an out-of-bounds profile", objective.id));
            }
            if !(0.0..=1.0).contains(&objective.completion) {
                return Err(format!("objective {} has completion outside [0, 1]", objective.id));
            }
        }

        // Correlation confidences are clamped at construction; re-check
        // anyway since the snapshot may have been hand-edited.
        for corr in &self.correlations {
            if !(0.0..=1.0).contains(&corr.confidence) {
                return Err(format!("correlation {} has confidence outside [0, 1]", corr.id));
            }
        }

        Ok(())
    }
}

/// Placeholder record for a task target that has not been written yet
fn planned_file_record(path: &str) -> FileRecord {
    FileRecord {
        path: path.to_string(),
        content_hash: hash_content(""),
        status: FileStatus::Created,
        revision: 0,
        pipeline_created: true,
        updated_at: patternstore::now_ms(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DimensionalProfile, Issue, IssueKind, IssueSeverity};

    #[test]
    fn test_upsert_task_registers_target_files() {
        let mut state = PipelineState::default();
        state.upsert_task(Task::new("t", "").with_target_file("src/api.rs"));

        assert!(state.files.contains_key("src/api.rs"));
        assert!(state.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_untracked_target() {
        let mut state = PipelineState::default();
        let task = Task::new("t", "").with_target_file("ghost.rs");
        state.tasks.insert(task.id.clone(), task);

        assert!(state.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_broken_needs_fixes() {
        let mut state = PipelineState::default();
        let mut task = Task::new("t", "").with_target_file("a.rs");
        task.set_status(TaskStatus::NeedsFixes); // no issue attached
        state.upsert_task(task);

        assert!(state.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_bounds_profile() {
        let mut state = PipelineState::default();
        let mut objective = Objective::new("o", ObjectiveTier::Primary);
        objective.profile = DimensionalProfile([2.0; 8]);
        state.objectives.push(objective);

        assert!(state.validate().is_err());
    }

    #[test]
    fn test_needs_fixes_query() {
        let mut state = PipelineState::default();
        let mut task = Task::new("fix it", "").with_target_file("a.rs");
        task.mark_needs_fixes(Issue::new(IssueKind::BugFix, IssueSeverity::Major, "broken", "qa"));
        state.upsert_task(task);
        state.upsert_task(Task::new("other", ""));

        assert_eq!(state.needs_fixes_tasks().len(), 1);
        assert_eq!(state.pending_tasks().len(), 1);
    }

    #[test]
    fn test_active_objective_prefers_primary() {
        let mut state = PipelineState::default();
        state.objectives.push(Objective::new("secondary", ObjectiveTier::Secondary));
        state.objectives.push(Objective::new("primary", ObjectiveTier::Primary));

        assert_eq!(state.active_objective().unwrap().title, "primary");
    }

    #[test]
    fn test_recent_messages_bounded() {
        let mut state = PipelineState::default();
        for _ in 0..(RECENT_MESSAGE_CAP + 50) {
            state.record_message(Message::broadcast(
                crate::bus::MessageType::MetricsUpdated,
                "x",
                serde_json::json!({}),
            ));
        }
        assert_eq!(state.recent_messages.len(), RECENT_MESSAGE_CAP);
    }

    #[test]
    fn test_observe_file_transitions() {
        let mut state = PipelineState::default();
        state.observe_file("a.rs", "v1", FileStatus::Created, true);
        state.observe_file("a.rs", "v2", FileStatus::QaPassed, true);

        let record = &state.files["a.rs"];
        assert_eq!(record.status, FileStatus::QaPassed);
        assert_eq!(record.revision, 2);
    }

    #[test]
    fn test_state_serde_roundtrip() {
        let mut state = PipelineState::default();
        state.upsert_task(Task::new("t", "").with_target_file("a.rs"));
        state.objectives.push(Objective::new("o", ObjectiveTier::Primary));
        state.iteration = 7;

        let json = serde_json::to_string(&state).unwrap();
        let back: PipelineState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.iteration, 7);
        assert_eq!(back.tasks.len(), 1);
        assert_eq!(back.objectives.len(), 1);
    }
}
