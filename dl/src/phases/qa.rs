//! QA phase
//!
//! Reviews target files against the quality criteria. Every reported
//! defect materializes as a `needs_fixes` task carrying the issue payload;
//! reporting an issue without creating its task is itself a defect.

use async_trait::async_trait;
use eyre::Result;
use serde_json::json;
use tracing::info;

use crate::bus::{Message, MessageType};
use crate::domain::{FileStatus, Issue, IssueKind, IssueSeverity, PhaseKind, Priority, Task, TaskStatus};
use crate::llm::SpecialistKind;

use super::driver::{DriveOptions, drive};
use super::{Phase, PhaseContext, PhaseErrorKind, PhaseResult};

pub struct QaPhase;

#[async_trait]
impl Phase for QaPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Qa
    }

    async fn execute(&self, ctx: &mut PhaseContext, task: Option<Task>) -> PhaseResult {
        match self.run(ctx, task).await {
            Ok(result) => result,
            Err(err) => PhaseResult::failed(format!("qa failed: {}", err), PhaseErrorKind::Transient),
        }
    }
}

impl QaPhase {
    async fn run(&self, ctx: &mut PhaseContext, task: Option<Task>) -> Result<PhaseResult> {
        // Drain review requests; prefer the explicit task, then requests,
        // then any in-progress task.
        let requests = ctx.bus.get(
            "qa",
            crate::bus::GetOptions {
                message_type: Some(MessageType::TaskUpdated),
                ..Default::default()
            },
        );

        let snapshot = ctx.state.snapshot().await;
        let task = task
            .or_else(|| {
                requests.iter().find_map(|m| {
                    m.payload["task_id"]
                        .as_str()
                        .and_then(|id| snapshot.task(id))
                        .cloned()
                })
            })
            .or_else(|| snapshot.tasks_with_status(TaskStatus::InProgress).first().map(|t| (*t).clone()));

        let Some(task) = task else {
            return Ok(PhaseResult::ok("nothing to review"));
        };

        info!(task = %task.id, "QA reviewing task");
        let target_files: Vec<String> = task.target_files.iter().cloned().collect();

        let prompt = ctx.prompts.render(
            "qa",
            &json!({
                "target_files": target_files.join(", "),
                "task_title": task.title,
            }),
        )?;

        let report = drive(
            ctx,
            DriveOptions::new(SpecialistKind::Analysis, qa_system_prompt(), prompt)
                .with_tools(&["read_file", "search", "compare_files"]),
        )
        .await?;

        let defects = report
            .final_text
            .as_deref()
            .map(parse_defect_lines)
            .unwrap_or_default();

        let mut messages_published = 0u32;
        let mut issues_raised = 0u32;

        if defects.is_empty() {
            // Review passed: complete the task and record the files
            ctx.state
                .update(|state| {
                    if let Some(t) = state.task_mut(&task.id) {
                        t.set_status(TaskStatus::Completed);
                    }
                    for path in &target_files {
                        if let Some(record) = state.files.get_mut(path) {
                            record.status = FileStatus::QaPassed;
                        }
                    }
                })
                .await?;

            ctx.bus.publish(Message::broadcast(
                MessageType::TaskCompleted,
                "qa",
                json!({"task_id": task.id}),
            ));
            messages_published += 1;

            ctx.docs.write_status(&format!("Task {} passed review", task.id)).await?;
            let mut result = PhaseResult::ok(format!("task {} passed review", task.id));
            result.messages_published = messages_published;
            result.telemetry.model_calls = report.model_calls;
            result.tools_used = report.tool_names();
            result.telemetry.tool_calls = report.tool_call_count();
            return Ok(result);
        }

        // Each defect becomes (or refreshes) a needs_fixes task, then its
        // IssueFound event goes out. The coupling is structural: the event
        // is only published after the task exists.
        for defect in &defects {
            let issue = Issue::new(defect.kind, defect.severity, &defect.description, "qa");

            let existing = ctx.state.snapshot().await.tasks.values().find_map(|t| {
                (t.status == TaskStatus::NeedsFixes && t.target_files.contains(&defect.file)).then(|| t.id.clone())
            });

            let fix_task_id = match existing {
                Some(id) => {
                    ctx.state
                        .update(|state| {
                            if let Some(t) = state.task_mut(&id) {
                                t.issue = Some(issue.clone());
                            }
                        })
                        .await?;
                    id
                }
                None => {
                    let mut fix_task = Task::new(
                        format!("Fix {} in {}", defect.kind, defect.file),
                        &defect.description,
                    )
                    .with_target_file(&defect.file);
                    fix_task.priority = if defect.severity == IssueSeverity::Critical {
                        Priority::Critical
                    } else {
                        Priority::High
                    };
                    fix_task.objective = task.objective.clone();
                    fix_task.mark_needs_fixes(issue.clone());
                    let id = fix_task.id.clone();
                    ctx.state.update(|state| state.upsert_task(fix_task.clone())).await?;
                    id
                }
            };

            let priority = if defect.severity == IssueSeverity::Critical {
                Priority::Critical
            } else {
                Priority::High
            };
            ctx.bus.publish(
                Message::broadcast(
                    MessageType::IssueFound,
                    "qa",
                    json!({
                        "task_id": fix_task_id,
                        "reviewed_task_id": task.id,
                        "file": defect.file,
                        "kind": defect.kind.as_str(),
                        "severity": format!("{:?}", defect.severity).to_lowercase(),
                    }),
                )
                .with_priority(priority),
            );
            messages_published += 1;
            issues_raised += 1;
        }

        // The reviewed task needs another pass once fixes land
        ctx.state
            .update(|state| {
                if let Some(t) = state.task_mut(&task.id) {
                    if t.status == TaskStatus::InProgress {
                        t.set_status(TaskStatus::Blocked);
                    }
                }
                for path in &target_files {
                    if let Some(record) = state.files.get_mut(path) {
                        record.status = FileStatus::QaFailed;
                    }
                }
            })
            .await?;

        ctx.docs
            .write_status(&format!("Task {}: {} defect(s) found", task.id, defects.len()))
            .await?;

        let mut result = PhaseResult::ok(format!("found {} defect(s) in task {}", defects.len(), task.id))
            .with_hint(PhaseKind::Debugging);
        result.issues_raised = issues_raised;
        result.messages_published = messages_published;
        result.telemetry.model_calls = report.model_calls;
        result.tools_used = report.tool_names();
        result.telemetry.tool_calls = report.tool_call_count();
        Ok(result)
    }
}

fn qa_system_prompt() -> &'static str {
    "You are the QA phase of an autonomous development pipeline. Review the \
     target files. For each defect, output one line:\n\
     DEFECT: <file> | KIND: <missing_method|duplicate|integration_conflict|dead_code|complexity|architecture_violation|bug_fix> | SEVERITY: <minor|major|critical> | <description>\n\
     Output nothing defect-shaped if the work passes."
}

struct Defect {
    file: String,
    kind: IssueKind,
    severity: IssueSeverity,
    description: String,
}

fn parse_defect_lines(text: &str) -> Vec<Defect> {
    let mut defects = Vec::new();
    for line in text.lines() {
        let Some(rest) = line.trim().strip_prefix("DEFECT:") else {
            continue;
        };
        let parts: Vec<&str> = rest.split('|').map(str::trim).collect();
        if parts.is_empty() || parts[0].is_empty() {
            continue;
        }

        let file = parts[0].to_string();
        let mut kind = IssueKind::BugFix;
        let mut severity = IssueSeverity::Major;
        let mut description = String::new();

        for part in &parts[1..] {
            if let Some(k) = part.strip_prefix("KIND:") {
                kind = parse_issue_kind(k.trim()).unwrap_or(IssueKind::BugFix);
            } else if let Some(s) = part.strip_prefix("SEVERITY:") {
                severity = match s.trim() {
                    "critical" => IssueSeverity::Critical,
                    "minor" => IssueSeverity::Minor,
                    _ => IssueSeverity::Major,
                };
            } else {
                description = part.to_string();
            }
        }

        defects.push(Defect {
            file,
            kind,
            severity,
            description,
        });
    }
    defects
}

fn parse_issue_kind(s: &str) -> Option<IssueKind> {
    match s {
        "missing_method" => Some(IssueKind::MissingMethod),
        "duplicate" => Some(IssueKind::Duplicate),
        "integration_conflict" => Some(IssueKind::IntegrationConflict),
        "dead_code" => Some(IssueKind::DeadCode),
        "complexity" => Some(IssueKind::Complexity),
        "architecture_violation" => Some(IssueKind::ArchitectureViolation),
        "bug_fix" => Some(IssueKind::BugFix),
        _ => None,
    }
}
