//! Self-improvement phases
//!
//! Tool design/evaluation and prompt/role design/improvement all operate
//! on the registries. Designed tools land as script files in
//! `scripts/custom_tools/` and only enter the registry once evaluation
//! has smoke-tested them.

use async_trait::async_trait;
use eyre::Result;
use serde_json::json;
use tracing::{info, warn};

use crate::domain::{PhaseKind, Task};
use crate::llm::SpecialistKind;
use crate::registry::{CUSTOM_TOOLS_DIR, DynamicToolSpec, PromptTemplate, RoleSpec};
use crate::tools::DynamicToolRunner;

use super::driver::{DriveOptions, drive};
use super::{Phase, PhaseContext, PhaseErrorKind, PhaseResult};

/// Proposals handled per tool-design run
const PROPOSALS_PER_RUN: usize = 3;

// === Tool design ===

pub struct ToolDesignPhase;

#[async_trait]
impl Phase for ToolDesignPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::ToolDesign
    }

    async fn execute(&self, ctx: &mut PhaseContext, _task: Option<Task>) -> PhaseResult {
        match self.run(ctx).await {
            Ok(result) => result,
            Err(err) => PhaseResult::failed(format!("tool design failed: {}", err), PhaseErrorKind::Transient),
        }
    }
}

impl ToolDesignPhase {
    async fn run(&self, ctx: &mut PhaseContext) -> Result<PhaseResult> {
        let proposals = ctx.creator.take_proposals();
        if proposals.is_empty() {
            return Ok(PhaseResult::ok("no tool proposals pending"));
        }

        let tools_dir = ctx.project_root.join(CUSTOM_TOOLS_DIR);
        tokio::fs::create_dir_all(&tools_dir).await?;

        let mut designed = 0u32;
        for proposal in proposals.into_iter().take(PROPOSALS_PER_RUN) {
            let parameters: Vec<String> = proposal.inferred_parameters.iter().cloned().collect();
            let prompt = format!(
                "Design a POSIX sh script implementing a tool named '{}'.\n\
                 It is invoked as: sh {}.sh --project-dir <dir> --args <json>\n\
                 Inferred parameters: {}\n\
                 The script must print a single JSON object to stdout and exit 0.\n\
                 Respond with only the script body.",
                proposal.name,
                proposal.name,
                parameters.join(", "),
            );

            let report = drive(ctx, DriveOptions::new(SpecialistKind::Coding, tool_design_system_prompt(), prompt)).await?;
            let Some(script) = report.final_text.as_deref().map(strip_code_fences) else {
                warn!(tool = %proposal.name, "Designer produced no script");
                continue;
            };

            let entry = format!("{}.sh", proposal.name);
            tokio::fs::write(tools_dir.join(&entry), script).await?;
            info!(tool = %proposal.name, "Tool script designed");

            // Evaluation decides whether this enters the registry
            ctx.docs
                .send_to(
                    PhaseKind::ToolEvaluation,
                    &format!(
                        "TOOL: {} | ENTRY: {} | INTERPRETER: sh | PARAMS: {}",
                        proposal.name,
                        entry,
                        parameters.join(",")
                    ),
                )
                .await?;
            designed += 1;
        }

        ctx.docs
            .write_status(&format!("Designed {} tool script(s); handed to evaluation", designed))
            .await?;

        let mut result = PhaseResult::ok(format!("designed {} tool(s)", designed));
        if designed > 0 {
            result = result.with_hint(PhaseKind::ToolEvaluation);
        }
        Ok(result)
    }
}

fn tool_design_system_prompt() -> &'static str {
    "You design small command-line tools for an autonomous development \
     pipeline. Output only the requested script body."
}

// === Tool evaluation ===

pub struct ToolEvaluationPhase;

#[async_trait]
impl Phase for ToolEvaluationPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::ToolEvaluation
    }

    async fn execute(&self, ctx: &mut PhaseContext, _task: Option<Task>) -> PhaseResult {
        match self.run(ctx).await {
            Ok(result) => result,
            Err(err) => PhaseResult::failed(format!("tool evaluation failed: {}", err), PhaseErrorKind::Transient),
        }
    }
}

impl ToolEvaluationPhase {
    async fn run(&self, ctx: &mut PhaseContext) -> Result<PhaseResult> {
        let inbox = ctx.docs.take_inbox().await?;
        let candidates = parse_tool_lines(&inbox);
        if candidates.is_empty() {
            return Ok(PhaseResult::ok("no tool candidates to evaluate"));
        }

        let runner = DynamicToolRunner::new(&ctx.project_root);
        let mut registered = 0u32;
        let mut rejected = 0u32;

        for spec in candidates {
            if ctx.tool_registry.contains(&spec.name) {
                continue;
            }

            // Smoke test: the script must produce JSON for empty args
            match runner.run(&spec, &json!({})).await {
                Ok(_) => match ctx.tool_registry.register(spec.clone()) {
                    Ok(()) => {
                        info!(tool = %spec.name, "Tool registered after evaluation");
                        registered += 1;
                    }
                    Err(err) => {
                        warn!(tool = %spec.name, error = %err, "Tool failed registry validation");
                        rejected += 1;
                    }
                },
                Err(err) => {
                    warn!(tool = %spec.name, error = %err, "Tool failed smoke test");
                    ctx.validator.record(&spec.name, false, "tool_evaluation", 0, Some(err.kind()));
                    rejected += 1;
                }
            }
        }

        ctx.docs
            .write_status(&format!("Evaluated tools: {} registered, {} rejected", registered, rejected))
            .await?;
        Ok(PhaseResult::ok(format!("{} registered, {} rejected", registered, rejected)))
    }
}

/// Parse `TOOL: name | ENTRY: file | INTERPRETER: i | PARAMS: a,b` lines
fn parse_tool_lines(text: &str) -> Vec<DynamicToolSpec> {
    let mut specs = Vec::new();
    for line in text.lines() {
        let Some(rest) = line.trim().strip_prefix("TOOL:") else {
            continue;
        };

        let mut spec = DynamicToolSpec {
            name: String::new(),
            description: "designed by the pipeline".to_string(),
            entry: String::new(),
            interpreter: "sh".to_string(),
            timeout_secs: None,
            parameters: Vec::new(),
        };

        for (i, part) in rest.split('|').enumerate() {
            let part = part.trim();
            if i == 0 {
                spec.name = part.to_string();
            } else if let Some(entry) = part.strip_prefix("ENTRY:") {
                spec.entry = entry.trim().to_string();
            } else if let Some(interpreter) = part.strip_prefix("INTERPRETER:") {
                spec.interpreter = interpreter.trim().to_string();
            } else if let Some(params) = part.strip_prefix("PARAMS:") {
                spec.parameters = params
                    .split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect();
            }
        }

        if !spec.name.is_empty() && !spec.entry.is_empty() {
            specs.push(spec);
        }
    }
    specs
}

fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(inner) = trimmed.strip_prefix("```") {
        let inner = inner.split_once('\n').map(|(_, rest)| rest).unwrap_or(inner);
        inner.trim_end_matches('`').trim_end_matches("```").trim().to_string()
    } else {
        trimmed.to_string()
    }
}

// === Prompt design / improvement ===

pub struct PromptDesignPhase;

#[async_trait]
impl Phase for PromptDesignPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::PromptDesign
    }

    async fn execute(&self, ctx: &mut PhaseContext, _task: Option<Task>) -> PhaseResult {
        match self.run(ctx).await {
            Ok(result) => result,
            Err(err) => PhaseResult::failed(format!("prompt design failed: {}", err), PhaseErrorKind::Transient),
        }
    }
}

/// Phase prompts worth owning as registry entries
const CORE_PROMPTS: &[&str] = &["planning", "coding", "qa", "debugging"];

impl PromptDesignPhase {
    async fn run(&self, ctx: &mut PhaseContext) -> Result<PhaseResult> {
        let registered: Vec<String> = ctx.prompts.list().into_iter().map(|t| t.name).collect();
        let Some(missing) = CORE_PROMPTS.iter().find(|name| !registered.contains(&name.to_string())) else {
            return Ok(PhaseResult::ok("all core prompts registered"));
        };

        let prompt = format!(
            "Draft a Handlebars prompt template for the '{}' phase of an \
             autonomous development pipeline. Respond with only the template.",
            missing
        );
        let report = drive(ctx, DriveOptions::new(SpecialistKind::Reasoning, design_system_prompt(), prompt)).await?;

        let Some(template) = report.final_text.as_deref().map(strip_code_fences) else {
            return Ok(PhaseResult::failed("designer produced no template", PhaseErrorKind::Transient));
        };

        let entry = PromptTemplate {
            name: missing.to_string(),
            description: format!("designed prompt for the {} phase", missing),
            template,
            tags: vec!["designed".to_string()],
        };
        match ctx.prompts.register(entry) {
            Ok(()) => {
                ctx.docs.write_status(&format!("Registered prompt '{}'", missing)).await?;
                Ok(PhaseResult::ok(format!("registered prompt '{}'", missing)))
            }
            Err(err) => Ok(PhaseResult::failed(
                format!("prompt '{}' failed validation: {}", missing, err),
                PhaseErrorKind::Transient,
            )),
        }
    }
}

pub struct PromptImprovementPhase;

#[async_trait]
impl Phase for PromptImprovementPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::PromptImprovement
    }

    async fn execute(&self, ctx: &mut PhaseContext, _task: Option<Task>) -> PhaseResult {
        match self.run(ctx).await {
            Ok(result) => result,
            Err(err) => PhaseResult::failed(format!("prompt improvement failed: {}", err), PhaseErrorKind::Transient),
        }
    }
}

impl PromptImprovementPhase {
    async fn run(&self, ctx: &mut PhaseContext) -> Result<PhaseResult> {
        let Some(mut template) = ctx.prompts.list().into_iter().next() else {
            return Ok(PhaseResult::ok("no registered prompts to improve"));
        };

        let prompt = format!(
            "Improve this prompt template for clarity while keeping every \
             placeholder intact. Respond with only the revised template.\n\n{}",
            template.template
        );
        let report = drive(ctx, DriveOptions::new(SpecialistKind::Reasoning, design_system_prompt(), prompt)).await?;

        let Some(revised) = report.final_text.as_deref().map(strip_code_fences) else {
            return Ok(PhaseResult::failed("no revision produced", PhaseErrorKind::Transient));
        };

        let name = template.name.clone();
        template.template = revised;
        match ctx.prompts.update(template) {
            Ok(()) => Ok(PhaseResult::ok(format!("improved prompt '{}'", name))),
            Err(err) => Ok(PhaseResult::failed(
                format!("revision of '{}' rejected: {}", name, err),
                PhaseErrorKind::Transient,
            )),
        }
    }
}

// === Role design / improvement ===

pub struct RoleDesignPhase;

#[async_trait]
impl Phase for RoleDesignPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::RoleDesign
    }

    async fn execute(&self, ctx: &mut PhaseContext, _task: Option<Task>) -> PhaseResult {
        match self.run(ctx).await {
            Ok(result) => result,
            Err(err) => PhaseResult::failed(format!("role design failed: {}", err), PhaseErrorKind::Transient),
        }
    }
}

impl RoleDesignPhase {
    async fn run(&self, ctx: &mut PhaseContext) -> Result<PhaseResult> {
        let prompt = "Design one specialist role for an autonomous development pipeline.\n\
                      First line: ROLE: <kebab-case-name> | SPECIALIST: <coding|reasoning|analysis>\n\
                      Remaining lines: the role's system prompt.";
        let report = drive(
            ctx,
            DriveOptions::new(SpecialistKind::Reasoning, design_system_prompt(), prompt),
        )
        .await?;

        let Some(role) = report.final_text.as_deref().and_then(parse_role) else {
            return Ok(PhaseResult::failed("no parseable role produced", PhaseErrorKind::Transient));
        };

        if ctx.roles.get(&role.name).is_some() {
            return Ok(PhaseResult::ok(format!("role '{}' already exists", role.name)));
        }
        let name = role.name.clone();
        match ctx.roles.register(role) {
            Ok(()) => Ok(PhaseResult::ok(format!("registered role '{}'", name))),
            Err(err) => Ok(PhaseResult::failed(
                format!("role '{}' failed validation: {}", name, err),
                PhaseErrorKind::Transient,
            )),
        }
    }
}

pub struct RoleImprovementPhase;

#[async_trait]
impl Phase for RoleImprovementPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::RoleImprovement
    }

    async fn execute(&self, ctx: &mut PhaseContext, _task: Option<Task>) -> PhaseResult {
        match self.run(ctx).await {
            Ok(result) => result,
            Err(err) => PhaseResult::failed(format!("role improvement failed: {}", err), PhaseErrorKind::Transient),
        }
    }
}

impl RoleImprovementPhase {
    async fn run(&self, ctx: &mut PhaseContext) -> Result<PhaseResult> {
        let Some(mut role) = ctx.roles.list().into_iter().next() else {
            return Ok(PhaseResult::ok("no roles to improve"));
        };

        let prompt = format!(
            "Tighten this specialist system prompt without changing its \
             intent. Respond with only the revised prompt.\n\n{}",
            role.system_prompt
        );
        let report = drive(ctx, DriveOptions::new(SpecialistKind::Reasoning, design_system_prompt(), prompt)).await?;

        let Some(revised) = report.final_text.as_deref().map(strip_code_fences) else {
            return Ok(PhaseResult::failed("no revision produced", PhaseErrorKind::Transient));
        };

        let name = role.name.clone();
        role.system_prompt = revised;
        match ctx.roles.update(role) {
            Ok(()) => Ok(PhaseResult::ok(format!("improved role '{}'", name))),
            Err(err) => Ok(PhaseResult::failed(
                format!("revision of role '{}' rejected: {}", name, err),
                PhaseErrorKind::Transient,
            )),
        }
    }
}

fn design_system_prompt() -> &'static str {
    "You design and refine registry entries (prompts, roles, tools) for an \
     autonomous development pipeline. Respond with exactly what is asked \
     for, nothing else."
}

/// Parse `ROLE: name | SPECIALIST: kind` + prompt body
fn parse_role(text: &str) -> Option<RoleSpec> {
    let mut lines = text.trim().lines();
    let header = lines.next()?.trim().strip_prefix("ROLE:")?;

    let mut name = String::new();
    let mut specialist = SpecialistKind::Reasoning;
    for (i, part) in header.split('|').enumerate() {
        let part = part.trim();
        if i == 0 {
            name = part.to_string();
        } else if let Some(kind) = part.strip_prefix("SPECIALIST:") {
            specialist = match kind.trim() {
                "coding" => SpecialistKind::Coding,
                "analysis" => SpecialistKind::Analysis,
                _ => SpecialistKind::Reasoning,
            };
        }
    }

    let system_prompt = lines.collect::<Vec<_>>().join("\n").trim().to_string();
    if name.is_empty() || system_prompt.is_empty() {
        return None;
    }

    Some(RoleSpec {
        name,
        description: "designed by the pipeline".to_string(),
        specialist,
        system_prompt,
        temperature: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockSpecialistClient;
    use crate::phases::context::test_support::collaborators;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_parse_tool_lines() {
        let text = "## From tool_design at 2026-01-01\n\n\
                    TOOL: count_lines | ENTRY: count_lines.sh | INTERPRETER: sh | PARAMS: path";
        let specs = parse_tool_lines(text);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "count_lines");
        assert_eq!(specs[0].parameters, vec!["path".to_string()]);
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```sh\necho hi\n```"), "echo hi");
        assert_eq!(strip_code_fences("plain text"), "plain text");
    }

    #[test]
    fn test_parse_role() {
        let role = parse_role("ROLE: strict-reviewer | SPECIALIST: analysis\nYou review with rigor.").unwrap();
        assert_eq!(role.name, "strict-reviewer");
        assert_eq!(role.specialist, SpecialistKind::Analysis);
        assert!(role.system_prompt.contains("rigor"));
    }

    #[tokio::test]
    async fn test_tool_design_to_evaluation_to_registry() {
        let temp = tempdir().unwrap();
        let (collab, _mock) = collaborators(
            temp.path(),
            vec![MockSpecialistClient::text("```sh\necho '{\"ok\": true}'\n```")],
        );

        // Five distinct unknown-tool contexts trigger a proposal
        for i in 0..5 {
            collab
                .creator
                .record_unknown("count_lines", &format!("phase-{}", i), &json!({"path": "x"}));
        }

        let mut ctx = collab.context_for(PhaseKind::ToolDesign);
        let result = ToolDesignPhase.execute(&mut ctx, None).await;
        assert!(result.success, "{}", result.summary);
        assert_eq!(result.next_phase_hint, Some(PhaseKind::ToolEvaluation));
        assert!(temp.path().join("scripts/custom_tools/count_lines.sh").exists());

        let mut ctx = collab.context_for(PhaseKind::ToolEvaluation);
        let result = ToolEvaluationPhase.execute(&mut ctx, None).await;
        assert!(result.success, "{}", result.summary);
        assert!(collab.tool_registry.contains("count_lines"));
    }

    #[tokio::test]
    async fn test_evaluation_rejects_crashing_tool() {
        let temp = tempdir().unwrap();
        let (collab, _mock) = collaborators(temp.path(), vec![]);

        let tools_dir = temp.path().join(CUSTOM_TOOLS_DIR);
        std::fs::create_dir_all(&tools_dir).unwrap();
        std::fs::write(tools_dir.join("broken.sh"), "exit 2").unwrap();

        let docs = crate::ipc::PhaseDocuments::new(collab.documents.clone(), PhaseKind::ToolDesign);
        docs.send_to(
            PhaseKind::ToolEvaluation,
            "TOOL: broken | ENTRY: broken.sh | INTERPRETER: sh | PARAMS:",
        )
        .await
        .unwrap();

        let mut ctx = collab.context_for(PhaseKind::ToolEvaluation);
        let result = ToolEvaluationPhase.execute(&mut ctx, None).await;
        assert!(result.success);
        assert!(result.summary.contains("1 rejected"));
        assert!(!collab.tool_registry.contains("broken"));
    }

    #[tokio::test]
    async fn test_prompt_design_registers_missing_core_prompt() {
        let temp = tempdir().unwrap();
        let (collab, _mock) = collaborators(
            temp.path(),
            vec![MockSpecialistClient::text("You are the planning phase. Plan {{master_plan}}.")],
        );

        let mut ctx = collab.context_for(PhaseKind::PromptDesign);
        let result = PromptDesignPhase.execute(&mut ctx, None).await;
        assert!(result.success, "{}", result.summary);
        assert!(result.summary.contains("planning"));

        // Registered entry now overrides the embedded fallback
        let rendered = collab
            .prompts
            .render("planning", &json!({"master_plan": "the plan"}))
            .unwrap();
        assert!(rendered.contains("the plan"));
    }

    #[tokio::test]
    async fn test_role_design_and_improvement() {
        let temp = tempdir().unwrap();
        let (collab, _mock) = collaborators(
            temp.path(),
            vec![
                MockSpecialistClient::text("ROLE: careful-reviewer | SPECIALIST: analysis\nReview carefully."),
                MockSpecialistClient::text("Review very carefully."),
            ],
        );

        let mut ctx = collab.context_for(PhaseKind::RoleDesign);
        let result = RoleDesignPhase.execute(&mut ctx, None).await;
        assert!(result.success, "{}", result.summary);
        assert!(collab.roles.get("careful-reviewer").is_some());

        let mut ctx = collab.context_for(PhaseKind::RoleImprovement);
        let result = RoleImprovementPhase.execute(&mut ctx, None).await;
        assert!(result.success, "{}", result.summary);
        assert_eq!(
            collab.roles.get("careful-reviewer").unwrap().system_prompt,
            "Review very carefully."
        );
    }
}
