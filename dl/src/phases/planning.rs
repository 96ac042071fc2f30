//! Planning phase
//!
//! Reads the master plan and the current state, produces new tasks, and
//! touches the strategic documents only once the master objective crosses
//! its completion threshold.

use async_trait::async_trait;
use eyre::Result;
use serde_json::json;
use tracing::info;

use crate::bus::{Message, MessageType};
use crate::domain::{Objective, ObjectiveTier, PhaseKind, Priority, Task};
use crate::ipc::SharedDoc;
use crate::llm::SpecialistKind;

use super::driver::{DriveOptions, drive};
use super::{Phase, PhaseContext, PhaseErrorKind, PhaseResult};

/// Master-plan completion threshold for strategic document updates
pub const COMPLETION_THRESHOLD: f64 = 0.95;

pub struct PlanningPhase;

#[async_trait]
impl Phase for PlanningPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Planning
    }

    async fn execute(&self, ctx: &mut PhaseContext, _task: Option<Task>) -> PhaseResult {
        match self.run(ctx).await {
            Ok(result) => result,
            Err(err) => PhaseResult::failed(format!("planning failed: {}", err), PhaseErrorKind::Transient),
        }
    }
}

impl PlanningPhase {
    async fn run(&self, ctx: &mut PhaseContext) -> Result<PhaseResult> {
        let master_plan = ctx.docs.read_shared(SharedDoc::MasterPlan).await?;
        let inbox = ctx.docs.take_inbox().await?;
        let snapshot = ctx.state.snapshot().await;

        let mut messages_published = 0u32;

        // Make sure a master objective exists before any scheduling needs one
        let objective_id = match snapshot.master_objective() {
            Some(objective) => objective.id.clone(),
            None => {
                let title = first_heading(&master_plan).unwrap_or_else(|| "Deliver the master plan".to_string());
                let objective = Objective::new(&title, ObjectiveTier::Primary)
                    .with_profile(crate::domain::DimensionalProfile::from_pairs(&[
                        (crate::domain::Dimension::Functional, 0.7),
                        (crate::domain::Dimension::Temporal, 0.5),
                    ]));
                let id = objective.id.clone();
                info!(objective = %id, "Creating master objective");

                ctx.state.update(|state| state.objectives.push(objective.clone())).await?;
                ctx.bus.publish(Message::broadcast(
                    MessageType::ObjectiveAdded,
                    "planning",
                    json!({"objective_id": id, "title": title}),
                ));
                messages_published += 1;
                id
            }
        };

        let task_summary = snapshot
            .tasks
            .values()
            .map(|t| format!("- [{}] {} ({})", t.status, t.title, t.id))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = ctx.prompts.render(
            "planning",
            &json!({
                "master_plan": master_plan,
                "task_summary": task_summary,
                "inbox": inbox,
            }),
        )?;

        let report = drive(
            ctx,
            DriveOptions::new(SpecialistKind::Reasoning, planning_system_prompt(), prompt)
                .with_tools(&["read_file", "list_directory", "search"]),
        )
        .await?;

        // Parse the proposed tasks from the final answer
        let mut created = 0u32;
        if let Some(text) = &report.final_text {
            for (title, files, priority) in parse_task_lines(text) {
                let already_known = ctx
                    .state
                    .snapshot()
                    .await
                    .tasks
                    .values()
                    .any(|t| t.title == title && !t.is_terminal());
                if already_known {
                    continue;
                }

                let mut task = Task::new(&title, "planned from master plan").with_objective(&objective_id);
                task.priority = priority;
                for file in files {
                    task.target_files.insert(file);
                }
                let task_id = task.id.clone();

                ctx.state
                    .update(|state| {
                        state.upsert_task(task.clone());
                        if let Some(objective) = state.objective_mut(&objective_id) {
                            objective.link_task(&task_id);
                        }
                    })
                    .await?;

                ctx.bus.publish(Message::broadcast(
                    MessageType::TaskCreated,
                    "planning",
                    json!({"task_id": task_id, "title": title}),
                ));
                messages_published += 1;
                created += 1;
            }
        }

        // Refresh objective completion; strategic docs only move once the
        // master plan crosses the threshold.
        let completion = self.refresh_completion(ctx, &objective_id).await?;
        if completion >= COMPLETION_THRESHOLD {
            ctx.docs
                .write_shared_section(
                    SharedDoc::MasterPlan,
                    "Status",
                    &format!("Master objective at {:.0}% - complete.", completion * 100.0),
                )
                .await?;
            ctx.bus.publish(Message::broadcast(
                MessageType::ObjectiveCompleted,
                "planning",
                json!({"objective_id": objective_id, "completion": completion}),
            ));
            messages_published += 1;
        }

        ctx.docs
            .write_status(&format!("Planned {} new task(s); completion {:.0}%", created, completion * 100.0))
            .await?;

        let pending = ctx.state.snapshot().await.pending_tasks().len();
        let mut result = PhaseResult::ok(format!("created {} task(s), {} pending", created, pending));
        result.messages_published = messages_published;
        result.telemetry.model_calls = report.model_calls;
        result.tools_used = report.tool_names();
        result.telemetry.tool_calls = report.tool_call_count();
        if pending > 0 {
            result = result.with_hint(PhaseKind::Coding);
        }
        Ok(result)
    }

    /// Completion = completed tasks / linked tasks
    async fn refresh_completion(&self, ctx: &PhaseContext, objective_id: &str) -> Result<f64> {
        ctx.state
            .update(|state| {
                let (done, total) = match state.objectives.iter().find(|o| o.id == objective_id) {
                    Some(objective) if !objective.task_ids.is_empty() => {
                        let done = objective
                            .task_ids
                            .iter()
                            .filter(|id| {
                                state
                                    .tasks
                                    .get(*id)
                                    .map(|t| t.status == crate::domain::TaskStatus::Completed)
                                    .unwrap_or(false)
                            })
                            .count();
                        (done, objective.task_ids.len())
                    }
                    _ => (0, 0),
                };

                let completion = if total == 0 { 0.0 } else { done as f64 / total as f64 };
                if let Some(objective) = state.objective_mut(objective_id) {
                    objective.set_completion(completion);
                }
                completion
            })
            .await
            .map_err(Into::into)
    }
}

fn planning_system_prompt() -> &'static str {
    "You are the planning phase of an autonomous development pipeline. \
     Propose small, file-scoped tasks. End your answer with one line per task:\n\
     TASK: <title> | FILES: <comma-separated paths> | PRIORITY: <low|normal|high|critical>"
}

fn first_heading(markdown: &str) -> Option<String> {
    markdown
        .lines()
        .find(|line| line.starts_with("# "))
        .map(|line| line.trim_start_matches('#').trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse `TASK: title | FILES: a,b | PRIORITY: p` lines
fn parse_task_lines(text: &str) -> Vec<(String, Vec<String>, Priority)> {
    let mut tasks = Vec::new();
    for line in text.lines() {
        let Some(rest) = line.trim().strip_prefix("TASK:") else {
            continue;
        };

        let mut title = String::new();
        let mut files = Vec::new();
        let mut priority = Priority::Normal;

        for (i, part) in rest.split('|').enumerate() {
            let part = part.trim();
            if i == 0 {
                title = part.to_string();
            } else if let Some(list) = part.strip_prefix("FILES:") {
                files = list
                    .split(',')
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .collect();
            } else if let Some(p) = part.strip_prefix("PRIORITY:") {
                priority = p.trim().parse().unwrap_or(Priority::Normal);
            }
        }

        if !title.is_empty() {
            tasks.push((title, files, priority));
        }
    }
    tasks
}
