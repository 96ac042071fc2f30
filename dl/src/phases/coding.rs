//! Coding phase
//!
//! Picks a pending task, drives the coding specialist to apply the edits
//! through tool calls, then hands the result to QA. Coding never approves
//! its own output.

use async_trait::async_trait;
use eyre::Result;
use serde_json::json;
use tracing::info;

use crate::bus::{Message, MessageType};
use crate::domain::{FileStatus, PhaseKind, Task, TaskStatus};
use crate::llm::SpecialistKind;

use super::driver::{DriveOptions, drive};
use super::{Phase, PhaseContext, PhaseErrorKind, PhaseResult};

pub struct CodingPhase;

#[async_trait]
impl Phase for CodingPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Coding
    }

    async fn execute(&self, ctx: &mut PhaseContext, task: Option<Task>) -> PhaseResult {
        match self.run(ctx, task).await {
            Ok(result) => result,
            Err(err) => PhaseResult::failed(format!("coding failed: {}", err), PhaseErrorKind::Transient),
        }
    }
}

impl CodingPhase {
    async fn run(&self, ctx: &mut PhaseContext, task: Option<Task>) -> Result<PhaseResult> {
        let task = match task {
            Some(task) => task,
            None => match ctx.state.snapshot().await.pending_tasks().first() {
                Some(task) => (*task).clone(),
                None => {
                    return Ok(PhaseResult::ok("no pending tasks").with_hint(PhaseKind::Planning));
                }
            },
        };

        info!(task = %task.id, "Coding picks up task");
        ctx.state
            .update(|state| {
                if let Some(t) = state.task_mut(&task.id) {
                    t.set_status(TaskStatus::InProgress);
                    t.record_attempt();
                }
            })
            .await?;

        let target_files: Vec<String> = task.target_files.iter().cloned().collect();
        let prompt = ctx.prompts.render(
            "coding",
            &json!({
                "task_title": task.title,
                "task_description": task.description,
                "target_files": target_files.join(", "),
            }),
        )?;

        let report = drive(
            ctx,
            DriveOptions::new(SpecialistKind::Coding, coding_system_prompt(), prompt)
                .with_tools(&["read_file", "write_file", "edit_file", "list_directory", "search"]),
        )
        .await?;

        let changed = !report.files_created.is_empty() || !report.files_modified.is_empty();
        if !changed {
            ctx.state
                .update(|state| {
                    if let Some(t) = state.task_mut(&task.id) {
                        t.set_status(TaskStatus::Pending);
                    }
                })
                .await?;
            return Ok(PhaseResult::failed(
                format!("task {} produced no file changes", task.id),
                PhaseErrorKind::Transient,
            ));
        }

        // Record file effects and publish the corresponding events
        let mut messages_published = 0u32;
        for (paths, created) in [(&report.files_created, true), (&report.files_modified, false)] {
            for path in paths {
                let content = tokio::fs::read_to_string(ctx.project_root.join(path))
                    .await
                    .unwrap_or_default();
                let status = if created { FileStatus::Created } else { FileStatus::Modified };
                ctx.state
                    .update(|state| state.observe_file(path, &content, status, created))
                    .await?;

                let message_type = if created { MessageType::FileCreated } else { MessageType::FileModified };
                ctx.bus.publish(Message::broadcast(
                    message_type,
                    "coding",
                    json!({"path": path, "task_id": task.id}),
                ));
                messages_published += 1;
            }
        }

        // Hand off to QA; the task is not completed until review passes
        ctx.bus.publish(Message::to(
            "qa",
            MessageType::TaskUpdated,
            "coding",
            json!({"task_id": task.id, "action": "review_requested"}),
        ));
        messages_published += 1;
        ctx.docs
            .write_status(&format!(
                "Applied edits for task {} ({} created, {} modified); awaiting QA",
                task.id,
                report.files_created.len(),
                report.files_modified.len()
            ))
            .await?;

        let mut result = PhaseResult::ok(format!("task {} edited, awaiting review", task.id)).with_hint(PhaseKind::Qa);
        result.tools_used = report.tool_names();
        result.telemetry.tool_calls = report.tool_call_count();
        result.files_created = report.files_created;
        result.files_modified = report.files_modified;
        result.messages_published = messages_published;
        result.telemetry.model_calls = report.model_calls;
        Ok(result)
    }
}

fn coding_system_prompt() -> &'static str {
    "You are the coding phase of an autonomous development pipeline. Apply \
     the requested changes using the available tools. Read files before \
     editing them. Do not review or approve your own work."
}
