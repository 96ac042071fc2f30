//! Refactoring phase
//!
//! Issue-typed tasks get an issue-kind-specific workflow: a dedicated
//! prompt, a required first tool, and a hard tool-call budget. Simple
//! kinds get short workflows, complex ones multi-step analysis. Budget
//! overruns abort the attempt.

use async_trait::async_trait;
use eyre::Result;
use serde_json::json;
use tracing::{info, warn};

use crate::bus::{Message, MessageType};
use crate::domain::{FileStatus, IssueKind, PhaseKind, Task, TaskStatus};
use crate::llm::SpecialistKind;

use super::driver::{DriveOptions, DriveReport, drive};
use super::{Phase, PhaseContext, PhaseErrorKind, PhaseResult};

/// Per-issue-kind workflow parameters
struct Workflow {
    required_first: &'static str,
    /// Tools that must all appear at least once
    required_tools: &'static [&'static str],
    min_calls: u32,
    max_calls: u32,
    instructions: &'static str,
}

fn workflow_for(kind: IssueKind) -> Workflow {
    match kind {
        IssueKind::MissingMethod => Workflow {
            required_first: "read_file",
            required_tools: &["read_file"],
            min_calls: 1,
            max_calls: 3,
            instructions: "Read the file, then add the missing method with a single edit.",
        },
        IssueKind::Duplicate => Workflow {
            required_first: "compare_files",
            required_tools: &["compare_files"],
            min_calls: 1,
            max_calls: 3,
            instructions: "Compare the duplicated files, then merge them, keeping one canonical copy.",
        },
        IssueKind::IntegrationConflict => Workflow {
            required_first: "read_file",
            required_tools: &["read_file", "read_architecture"],
            min_calls: 5,
            max_calls: 8,
            instructions: "Read every involved file and the architecture document, then resolve the \
                           conflict so both sides respect the documented boundaries.",
        },
        IssueKind::DeadCode => Workflow {
            required_first: "analyze_usage",
            required_tools: &["analyze_usage"],
            min_calls: 2,
            max_calls: 3,
            instructions: "Analyze usage of the suspect symbol. Remove it if unused, otherwise report why it stays.",
        },
        IssueKind::Complexity => Workflow {
            required_first: "read_file",
            required_tools: &["read_file"],
            min_calls: 3,
            max_calls: 5,
            instructions: "Read the file and its call sites, then simplify, or report why the complexity is inherent.",
        },
        IssueKind::ArchitectureViolation => Workflow {
            required_first: "read_architecture",
            required_tools: &["read_architecture"],
            min_calls: 2,
            max_calls: 3,
            instructions: "Read the architecture document, then move or rename the offending code, or report.",
        },
        IssueKind::BugFix => Workflow {
            required_first: "read_file",
            required_tools: &["read_file"],
            min_calls: 2,
            max_calls: 3,
            instructions: "Read the file, then commit a minimal fix.",
        },
    }
}

pub struct RefactoringPhase;

#[async_trait]
impl Phase for RefactoringPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Refactoring
    }

    async fn execute(&self, ctx: &mut PhaseContext, task: Option<Task>) -> PhaseResult {
        match self.run(ctx, task).await {
            Ok(result) => result,
            Err(err) => PhaseResult::failed(format!("refactoring failed: {}", err), PhaseErrorKind::Transient),
        }
    }
}

impl RefactoringPhase {
    async fn run(&self, ctx: &mut PhaseContext, task: Option<Task>) -> Result<PhaseResult> {
        let task = match task {
            Some(task) => task,
            None => match ctx.state.snapshot().await.needs_fixes_tasks().first() {
                Some(task) => (*task).clone(),
                None => return Ok(PhaseResult::ok("no issue-typed tasks waiting")),
            },
        };

        let Some(issue) = task.issue.clone() else {
            return Ok(PhaseResult::failed(
                format!("task {} has no issue payload", task.id),
                PhaseErrorKind::Fatal,
            ));
        };
        let workflow = workflow_for(issue.kind);

        info!(task = %task.id, kind = %issue.kind, budget = workflow.max_calls, "Refactoring workflow starts");
        ctx.state
            .update(|state| {
                if let Some(t) = state.task_mut(&task.id) {
                    t.set_status(TaskStatus::InProgress);
                    t.record_attempt();
                }
            })
            .await?;

        let target_files: Vec<String> = task.target_files.iter().cloned().collect();
        let prompt = format!(
            "Issue kind: {}\nDescription: {}\nTarget files: {}\n\n{}\n\nStart with the {} tool.",
            issue.kind,
            issue.description,
            target_files.join(", "),
            workflow.instructions,
            workflow.required_first,
        );

        let report = drive(
            ctx,
            DriveOptions::new(SpecialistKind::Coding, refactoring_system_prompt(), prompt)
                .with_tools(&[
                    "read_file",
                    "write_file",
                    "edit_file",
                    "compare_files",
                    "analyze_usage",
                    "read_architecture",
                    "search",
                ])
                .with_max_tool_calls(workflow.max_calls),
        )
        .await?;

        // The tool-call validator: budget and required tooling
        if report.budget_exceeded {
            warn!(task = %task.id, "Attempt budget exceeded");
            self.requeue(ctx, &task.id).await?;
            return Ok(PhaseResult::failed(
                format!("attempt_budget_exceeded: task {} used more than {} calls", task.id, workflow.max_calls),
                PhaseErrorKind::BudgetExceeded,
            ));
        }
        if let Some(violation) = validate_workflow(&workflow, &report) {
            self.requeue(ctx, &task.id).await?;
            return Ok(PhaseResult::failed(
                format!("workflow violation for task {}: {}", task.id, violation),
                PhaseErrorKind::Transient,
            ));
        }

        // Completion: a file change, or an explanatory report for the
        // kinds that allow one
        let changed = !report.files_modified.is_empty() || !report.files_created.is_empty();
        let report_allowed = matches!(
            issue.kind,
            IssueKind::DeadCode | IssueKind::Complexity | IssueKind::ArchitectureViolation
        );
        let reported = report.final_text.as_deref().map(|t| !t.trim().is_empty()).unwrap_or(false);

        if !changed && !(report_allowed && reported) {
            self.requeue(ctx, &task.id).await?;
            return Ok(PhaseResult::failed(
                format!("task {} reached no completion signal", task.id),
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
            "refactoring",
            json!({"task_id": task.id, "kind": issue.kind.as_str()}),
        ));
        ctx.docs
            .write_status(&format!("Completed {} workflow for task {}", issue.kind, task.id))
            .await?;

        let mut result = PhaseResult::ok(format!("{} workflow completed for task {}", issue.kind, task.id));
        result.issues_fixed = 1;
        result.messages_published = 1;
        result.tools_used = report.tool_names();
        result.telemetry.tool_calls = report.tool_call_count();
        result.files_modified = report.files_modified;
        result.files_created = report.files_created;
        result.telemetry.model_calls = report.model_calls;
        Ok(result)
    }

    async fn requeue(&self, ctx: &PhaseContext, task_id: &str) -> Result<()> {
        ctx.state
            .update(|state| {
                if let Some(t) = state.task_mut(task_id) {
                    t.set_status(TaskStatus::NeedsFixes);
                }
            })
            .await?;
        Ok(())
    }
}

/// Enforce the required first tool, the required tool set, and the
/// minimum call count. Returns the first violation found.
fn validate_workflow(workflow: &Workflow, report: &DriveReport) -> Option<String> {
    match report.first_tool() {
        Some(first) if first == workflow.required_first => {}
        Some(first) => {
            return Some(format!("first tool was {}, expected {}", first, workflow.required_first));
        }
        None => return Some(format!("no tool calls; expected {} first", workflow.required_first)),
    }

    for required in workflow.required_tools {
        if !report.used_tool(required) {
            return Some(format!("required tool {} was never used", required));
        }
    }

    if report.tool_call_count() < workflow.min_calls {
        return Some(format!(
            "only {} call(s), workflow needs at least {}",
            report.tool_call_count(),
            workflow.min_calls
        ));
    }
    None
}

fn refactoring_system_prompt() -> &'static str {
    "You are the refactoring phase of an autonomous development pipeline. \
     Follow the workflow instructions exactly, starting with the required \
     tool, and stay within your tool budget."
}
