//! Model-driving loop shared by the concrete phases
//!
//! One phase step = prompt the specialist, execute the tool calls it
//! requests, feed the results back, repeat until the model ends its turn
//! or a budget trips. Structured tool calls are used when present; calls
//! embedded in free text are extracted under the handler's whitelist.

use tracing::{debug, warn};

use crate::llm::{
    ChatRequest, ChatResponse, ContentBlock, LlmError, Message, SpecialistKind, StopReason, ToolCall,
    extract_tool_calls,
};
use crate::tools::ToolOutcome;

use super::context::PhaseContext;
use super::conversation::ConversationEntry;

/// Default turn bound inside one phase execution
pub const DEFAULT_MAX_TURNS: u32 = 8;

/// What one driving loop produced
#[derive(Debug, Default)]
pub struct DriveReport {
    pub model_calls: u32,

    /// Tool invocations in issue order: (tool name, outcome)
    pub invocations: Vec<(String, ToolOutcome)>,

    /// Final free-text answer, if the model gave one
    pub final_text: Option<String>,

    pub files_created: Vec<String>,
    pub files_modified: Vec<String>,

    /// True when the loop stopped because the tool-call budget ran out
    pub budget_exceeded: bool,
}

impl DriveReport {
    pub fn tool_call_count(&self) -> u32 {
        self.invocations.len() as u32
    }

    pub fn first_tool(&self) -> Option<&str> {
        self.invocations.first().map(|(name, _)| name.as_str())
    }

    pub fn used_tool(&self, name: &str) -> bool {
        self.invocations.iter().any(|(n, _)| n == name)
    }

    /// Invoked tool names in issue order
    pub fn tool_names(&self) -> Vec<String> {
        self.invocations.iter().map(|(name, _)| name.clone()).collect()
    }
}

/// Options for one driving loop
pub struct DriveOptions {
    pub specialist: SpecialistKind,
    pub system_prompt: String,
    pub user_prompt: String,

    /// Restrict the model to these tools; `None` offers everything
    pub tool_names: Option<Vec<String>>,

    pub max_turns: u32,

    /// Hard cap on executed tool calls; the loop aborts once exceeded
    pub max_tool_calls: Option<u32>,
}

impl DriveOptions {
    pub fn new(specialist: SpecialistKind, system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            specialist,
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            tool_names: None,
            max_turns: DEFAULT_MAX_TURNS,
            max_tool_calls: None,
        }
    }

    pub fn with_tools(mut self, names: &[&str]) -> Self {
        self.tool_names = Some(names.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_max_tool_calls(mut self, max: u32) -> Self {
        self.max_tool_calls = Some(max);
        self
    }
}

/// Run the agentic loop for one phase step
pub async fn drive(ctx: &mut PhaseContext, options: DriveOptions) -> Result<DriveReport, LlmError> {
    let tool_defs = match &options.tool_names {
        Some(names) => {
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            ctx.tools.definitions_for(&refs)
        }
        None => ctx.tools.definitions(),
    };
    let whitelist = ctx.tools.known_names();

    let mut messages = vec![Message::user(&options.user_prompt)];
    ctx.conversation.push(ConversationEntry::normal(format!("user: {}", options.user_prompt)));

    let mut report = DriveReport::default();

    for turn in 0..options.max_turns {
        let request = ChatRequest {
            system_prompt: options.system_prompt.clone(),
            messages: messages.clone(),
            tools: tool_defs.clone(),
            max_tokens: 8192,
            temperature: None,
        };

        let response = ctx.specialists.ask(options.specialist, request).await?;
        report.model_calls += 1;

        if let Some(text) = &response.content {
            ctx.conversation.push(ConversationEntry::normal(format!("assistant: {}", text)));
        }

        let calls = collect_calls(&response, &whitelist);
        if calls.is_empty() {
            report.final_text = response.content.clone();
            if response.stop_reason == StopReason::MaxTokens {
                messages.push(assistant_message(&response));
                messages.push(Message::user("Continue from where you left off."));
                continue;
            }
            break;
        }

        messages.push(assistant_message(&response));

        let mut result_blocks = Vec::new();
        for call in &calls {
            if let Some(max) = options.max_tool_calls
                && report.tool_call_count() >= max
            {
                warn!(phase = %ctx.phase(), max, "Tool-call budget exceeded, aborting drive");
                report.budget_exceeded = true;
                return Ok(report);
            }

            let outcome = ctx.tools.dispatch(call, &ctx.tool_ctx).await;
            track_file_effects(ctx, call, &outcome, &mut report).await;

            ctx.conversation.push(if outcome.success {
                ConversationEntry::normal(format!("tool {}: ok", call.name))
            } else {
                ConversationEntry::error(format!(
                    "tool {}: {}",
                    call.name,
                    outcome.error.as_deref().unwrap_or("error")
                ))
            });

            result_blocks.push(ContentBlock::ToolResult {
                tool_use_id: call.id.clone(),
                content: outcome.render(),
                is_error: !outcome.success,
            });
            report.invocations.push((call.name.clone(), outcome));
        }
        messages.push(Message::user_blocks(result_blocks));

        debug!(phase = %ctx.phase(), turn, calls = calls.len(), "Drive turn complete");
    }

    Ok(report)
}

/// Structured calls when present, whitelist-validated extraction otherwise
fn collect_calls(response: &ChatResponse, whitelist: &std::collections::HashSet<String>) -> Vec<ToolCall> {
    if !response.tool_calls.is_empty() {
        return response.tool_calls.clone();
    }
    match &response.content {
        Some(text) => extract_tool_calls(text, whitelist),
        None => Vec::new(),
    }
}

fn assistant_message(response: &ChatResponse) -> Message {
    let mut blocks = Vec::new();
    if let Some(text) = &response.content {
        blocks.push(ContentBlock::Text { text: text.clone() });
    }
    for call in &response.tool_calls {
        blocks.push(ContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.arguments.clone(),
        });
    }
    Message::assistant_blocks(blocks)
}

/// Note file creations/modifications from write/edit calls
async fn track_file_effects(ctx: &PhaseContext, call: &ToolCall, outcome: &ToolOutcome, report: &mut DriveReport) {
    if !outcome.success {
        return;
    }
    let path = call
        .arguments
        .get("path")
        .or_else(|| call.arguments.get("file_path"))
        .or_else(|| call.arguments.get("filepath"))
        .and_then(|v| v.as_str());
    let Some(path) = path else { return };

    match call.name.as_str() {
        "write_file" => {
            let known = ctx.state.snapshot().await.files.contains_key(path);
            let list = if known { &mut report.files_modified } else { &mut report.files_created };
            if !list.contains(&path.to_string()) {
                list.push(path.to_string());
            }
        }
        "edit_file" => {
            if !report.files_modified.contains(&path.to_string()) {
                report.files_modified.push(path.to_string());
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PhaseKind;
    use crate::llm::mock::MockSpecialistClient;
    use crate::phases::context::test_support::collaborators;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_drive_tool_loop_until_end_turn() {
        let temp = tempdir().unwrap();
        let (collab, mock) = collaborators(
            temp.path(),
            vec![
                MockSpecialistClient::tool_call("write_file", json!({"path": "src/m.rs", "content": "pub fn f() {}"})),
                MockSpecialistClient::text("created the module"),
            ],
        );
        let mut ctx = collab.context_for(PhaseKind::Coding);

        let report = drive(
            &mut ctx,
            DriveOptions::new(SpecialistKind::Coding, "system", "build the module"),
        )
        .await
        .unwrap();

        assert_eq!(report.model_calls, 2);
        assert_eq!(report.tool_call_count(), 1);
        assert_eq!(report.files_created, vec!["src/m.rs".to_string()]);
        assert_eq!(report.final_text.as_deref(), Some("created the module"));
        assert!(temp.path().join("src/m.rs").exists());
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_drive_extracts_calls_from_text() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("a.rs"), "content").unwrap();
        let (collab, _mock) = collaborators(
            temp.path(),
            vec![
                MockSpecialistClient::text(
                    r#"Reading first: {"name": "read_file", "arguments": {"path": "a.rs"}}"#,
                ),
                MockSpecialistClient::text("done"),
            ],
        );
        let mut ctx = collab.context_for(PhaseKind::Qa);

        let report = drive(&mut ctx, DriveOptions::new(SpecialistKind::Analysis, "s", "review"))
            .await
            .unwrap();

        assert_eq!(report.tool_call_count(), 1);
        assert!(report.used_tool("read_file"));
    }

    #[tokio::test]
    async fn test_drive_budget_aborts() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("a.rs"), "x").unwrap();
        let (collab, _mock) = collaborators(
            temp.path(),
            vec![
                MockSpecialistClient::tool_calls(vec![
                    ("read_file", json!({"path": "a.rs"})),
                    ("read_file", json!({"path": "a.rs"})),
                    ("read_file", json!({"path": "a.rs"})),
                ]),
                MockSpecialistClient::text("never reached"),
            ],
        );
        let mut ctx = collab.context_for(PhaseKind::Refactoring);

        let report = drive(
            &mut ctx,
            DriveOptions::new(SpecialistKind::Coding, "s", "fix").with_max_tool_calls(2),
        )
        .await
        .unwrap();

        assert!(report.budget_exceeded);
        assert_eq!(report.tool_call_count(), 2);
    }

    #[tokio::test]
    async fn test_drive_unknown_tool_flows_back_as_error() {
        let temp = tempdir().unwrap();
        let (collab, _mock) = collaborators(
            temp.path(),
            vec![
                MockSpecialistClient::tool_call("open", json!({"path": "x"})),
                MockSpecialistClient::text("ok, giving up on that tool"),
            ],
        );
        let mut ctx = collab.context_for(PhaseKind::Coding);

        let report = drive(&mut ctx, DriveOptions::new(SpecialistKind::Coding, "s", "u"))
            .await
            .unwrap();

        assert_eq!(report.tool_call_count(), 1);
        assert!(!report.invocations[0].1.success);
        assert_eq!(collab.creator.attempt_count("open"), 1);
    }

    #[tokio::test]
    async fn test_drive_records_conversation() {
        let temp = tempdir().unwrap();
        let (collab, _mock) = collaborators(temp.path(), vec![MockSpecialistClient::text("plain answer")]);
        let mut ctx = collab.context_for(PhaseKind::Planning);

        drive(&mut ctx, DriveOptions::new(SpecialistKind::Reasoning, "s", "plan it"))
            .await
            .unwrap();

        assert!(ctx.conversation.render().contains("user: plan it"));
        assert!(ctx.conversation.render().contains("assistant: plain answer"));
    }
}
