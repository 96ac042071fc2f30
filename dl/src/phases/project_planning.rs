//! Project planning phase
//!
//! Expands objective scope: extracts objectives with dimensional profiles
//! from the master plan, writes the tier documents, and links stray tasks
//! to the objective that fits them.

use async_trait::async_trait;
use eyre::Result;
use serde_json::json;
use tracing::info;

use crate::bus::{Message, MessageType};
use crate::domain::{Dimension, DimensionalProfile, Objective, ObjectiveTier, PhaseKind, Task};
use crate::ipc::SharedDoc;
use crate::llm::SpecialistKind;

use super::driver::{DriveOptions, drive};
use super::{Phase, PhaseContext, PhaseErrorKind, PhaseResult};

pub struct ProjectPlanningPhase;

#[async_trait]
impl Phase for ProjectPlanningPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::ProjectPlanning
    }

    async fn execute(&self, ctx: &mut PhaseContext, task: Option<Task>) -> PhaseResult {
        match self.run(ctx, task).await {
            Ok(result) => result,
            Err(err) => PhaseResult::failed(format!("project planning failed: {}", err), PhaseErrorKind::Transient),
        }
    }
}

impl ProjectPlanningPhase {
    async fn run(&self, ctx: &mut PhaseContext, _task: Option<Task>) -> Result<PhaseResult> {
        let master_plan = ctx.docs.read_shared(SharedDoc::MasterPlan).await?;

        let prompt = format!(
            "Master plan:\n{}\n\nExtract the coarse objectives. One line each:\n\
             OBJECTIVE: <title> | TIER: <primary|secondary|tertiary> | DIMS: <dim=value,...>\n\
             Dimensions: temporal, functional, data, state, error, context, integration, architecture.",
            master_plan
        );

        let report = drive(
            ctx,
            DriveOptions::new(SpecialistKind::Reasoning, project_planning_system_prompt(), prompt),
        )
        .await?;

        let parsed = report
            .final_text
            .as_deref()
            .map(parse_objective_lines)
            .unwrap_or_default();

        let mut created = 0u32;
        let mut messages_published = 0u32;
        for (title, tier, profile) in parsed {
            let exists = ctx.state.snapshot().await.objectives.iter().any(|o| o.title == title);
            if exists {
                continue;
            }

            let objective = Objective::new(&title, tier).with_profile(profile);
            let id = objective.id.clone();
            info!(objective = %id, %tier, "Extracted objective");

            ctx.state.update(|state| state.objectives.push(objective.clone())).await?;
            ctx.bus.publish(Message::broadcast(
                MessageType::ObjectiveAdded,
                "project_planning",
                json!({"objective_id": id, "title": title, "tier": tier.as_str()}),
            ));
            messages_published += 1;
            created += 1;
        }

        // Rewrite the tier documents from the objective list
        let snapshot = ctx.state.snapshot().await;
        for tier in [ObjectiveTier::Primary, ObjectiveTier::Secondary, ObjectiveTier::Tertiary] {
            let body = snapshot
                .objectives
                .iter()
                .filter(|o| o.tier == tier)
                .map(|o| format!("- {} ({:.0}% complete)", o.title, o.completion * 100.0))
                .collect::<Vec<_>>()
                .join("\n");
            if !body.is_empty() {
                let doc = match tier {
                    ObjectiveTier::Primary => SharedDoc::PrimaryObjectives,
                    ObjectiveTier::Secondary => SharedDoc::SecondaryObjectives,
                    ObjectiveTier::Tertiary => SharedDoc::TertiaryObjectives,
                };
                ctx.docs.write_shared_section(doc, "Objectives", &body).await?;
            }
        }

        // Link tasks that have no objective to the active one
        let linked = ctx
            .state
            .update(|state| {
                let Some(active_id) = state.active_objective().map(|o| o.id.clone()) else {
                    return 0u32;
                };
                let orphans: Vec<String> = state
                    .tasks
                    .values()
                    .filter(|t| t.objective.is_none() && !t.is_terminal())
                    .map(|t| t.id.clone())
                    .collect();

                let count = orphans.len() as u32;
                for task_id in orphans {
                    if let Some(task) = state.task_mut(&task_id) {
                        task.objective = Some(active_id.clone());
                    }
                    if let Some(objective) = state.objective_mut(&active_id) {
                        objective.link_task(&task_id);
                    }
                }
                count
            })
            .await?;

        ctx.docs
            .write_status(&format!("{} objective(s) extracted, {} task(s) linked", created, linked))
            .await?;

        let mut result = PhaseResult::ok(format!("{} objective(s), {} task(s) linked", created, linked));
        result.messages_published = messages_published;
        result.telemetry.model_calls = report.model_calls;
        Ok(result)
    }
}

fn project_planning_system_prompt() -> &'static str {
    "You are the project-planning phase of an autonomous development \
     pipeline. Extract coarse objectives with dimensional profiles from \
     the master plan."
}

/// Parse `OBJECTIVE: title | TIER: t | DIMS: error=0.8,functional=0.4` lines
fn parse_objective_lines(text: &str) -> Vec<(String, ObjectiveTier, DimensionalProfile)> {
    let mut objectives = Vec::new();
    for line in text.lines() {
        let Some(rest) = line.trim().strip_prefix("OBJECTIVE:") else {
            continue;
        };

        let mut title = String::new();
        let mut tier = ObjectiveTier::Secondary;
        let mut profile = DimensionalProfile::zero();

        for (i, part) in rest.split('|').enumerate() {
            let part = part.trim();
            if i == 0 {
                title = part.to_string();
            } else if let Some(t) = part.strip_prefix("TIER:") {
                tier = match t.trim() {
                    "primary" => ObjectiveTier::Primary,
                    "tertiary" => ObjectiveTier::Tertiary,
                    _ => ObjectiveTier::Secondary,
                };
            } else if let Some(dims) = part.strip_prefix("DIMS:") {
                for pair in dims.split(',') {
                    if let Some((name, value)) = pair.trim().split_once('=')
                        && let Ok(value) = value.trim().parse::<f64>()
                        && let Some(dim) = parse_dimension(name.trim())
                    {
                        profile.set(dim, value);
                    }
                }
            }
        }

        if !title.is_empty() {
            objectives.push((title, tier, profile));
        }
    }
    objectives
}

fn parse_dimension(name: &str) -> Option<Dimension> {
    Dimension::ALL.iter().find(|d| d.as_str() == name).copied()
}
