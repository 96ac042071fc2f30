//! Debugging phase
//!
//! Consumes `needs_fixes` tasks, applies fixes through tool calls, and
//! broadcasts resolution when the defect is gone.

use async_trait::async_trait;
use eyre::Result;
use serde_json::json;
use tracing::info;

use crate::bus::{Message, MessageType};
use crate::domain::{FileStatus, PhaseKind, Task, TaskStatus};
use crate::llm::SpecialistKind;

use super::driver::{DriveOptions, drive};
use super::{Phase, PhaseContext, PhaseErrorKind, PhaseResult};

pub struct DebuggingPhase;

#[async_trait]
impl Phase for DebuggingPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Debugging
    }

    async fn execute(&self, ctx: &mut PhaseContext, task: Option<Task>) -> PhaseResult {
        match self.run(ctx, task).await {
            Ok(result) => result,
            Err(err) => PhaseResult::failed(format!("debugging failed: {}", err), PhaseErrorKind::Transient),
        }
    }
}

impl DebuggingPhase {
    async fn run(&self, ctx: &mut PhaseContext, task: Option<Task>) -> Result<PhaseResult> {
        let task = match task {
            Some(task) => task,
            None => match ctx.state.snapshot().await.needs_fixes_tasks().first() {
                Some(task) => (*task).clone(),
                None => return Ok(PhaseResult::ok("no defects waiting")),
            },
        };

        let Some(issue) = task.issue.clone() else {
            // Should be unreachable given the needs_fixes invariant
            return Ok(PhaseResult::failed(
                format!("task {} has no issue payload", task.id),
                PhaseErrorKind::Fatal,
            ));
        };

        info!(task = %task.id, kind = %issue.kind, "Debugging a defect");
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
            "debugging",
            &json!({
                "issue_description": issue.description,
                "target_files": target_files.join(", "),
            }),
        )?;

        let report = drive(
            ctx,
            DriveOptions::new(SpecialistKind::Coding, debugging_system_prompt(), prompt)
                .with_tools(&["read_file", "edit_file", "write_file", "search"]),
        )
        .await?;

        let fixed = !report.files_modified.is_empty() || !report.files_created.is_empty();
        if !fixed {
            ctx.state
                .update(|state| {
                    if let Some(t) = state.task_mut(&task.id) {
                        // Keep it routed to debugging; the issue stands
                        t.set_status(TaskStatus::NeedsFixes);
                    }
                })
                .await?;
            return Ok(PhaseResult::failed(
                format!("no fix applied for task {}", task.id),
                PhaseErrorKind::Transient,
            ));
        }

        for path in report.files_modified.iter().chain(report.files_created.iter()) {
            let content = tokio::fs::read_to_string(ctx.project_root.join(path))
                .await
                .unwrap_or_default();
            ctx.state
                .update(|state| state.observe_file(path, &content, FileStatus::Modified, false))
                .await?;
        }

        ctx.state
            .update(|state| {
                if let Some(t) = state.task_mut(&task.id) {
                    t.set_status(TaskStatus::Completed);
                }
            })
            .await?;

        ctx.bus.publish(Message::broadcast(
            MessageType::IssueResolved,
            "debugging",
            json!({"task_id": task.id, "kind": issue.kind.as_str(), "files": target_files}),
        ));
        ctx.bus.publish(Message::broadcast(
            MessageType::TaskCompleted,
            "debugging",
            json!({"task_id": task.id}),
        ));

        ctx.docs
            .write_status(&format!("Resolved {} in task {}", issue.kind, task.id))
            .await?;

        let mut result = PhaseResult::ok(format!("resolved {} in task {}", issue.kind, task.id)).with_hint(PhaseKind::Qa);
        result.issues_fixed = 1;
        result.messages_published = 2;
        result.tools_used = report.tool_names();
        result.telemetry.tool_calls = report.tool_call_count();
        result.files_modified = report.files_modified;
        result.files_created = report.files_created;
        result.telemetry.model_calls = report.model_calls;
        Ok(result)
    }
}

fn debugging_system_prompt() -> &'static str {
    "You are the debugging phase of an autonomous development pipeline. \
     Read the affected files, find the fault, apply a minimal fix with the \
     available tools."
}
