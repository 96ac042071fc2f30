//! ToolHandler - validation and dispatch of model-requested tool calls
//!
//! The single entry point for every tool call a phase receives from a
//! model: whitelist check, parameter normalization, dispatch to built-ins
//! or the subprocess executor, and effectiveness recording. Dispatch
//! errors never propagate - every path returns a structured outcome.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use eyre::{Result, eyre};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::bus::{Message, MessageBus, MessageType};
use crate::llm::{ToolCall, ToolDefinition};
use crate::registry::ToolRegistry;

use super::builtin::{
    AnalyzeUsageTool, CompareFilesTool, EditFileTool, ListDirectoryTool, ReadArchitectureTool, ReadFileTool,
    SearchTool, WriteFileTool,
};
use super::context::ToolContext;
use super::subprocess::DynamicToolRunner;
use super::traits::{Tool, ToolOutcome};
use super::{ToolCreator, ToolValidator};

/// Built-ins the phase workflows depend on; their absence is a startup
/// error, not a runtime surprise.
const REQUIRED_BUILTINS: &[&str] = &[
    "read_file",
    "write_file",
    "edit_file",
    "list_directory",
    "search",
    "compare_files",
    "analyze_usage",
    "read_architecture",
];

/// Historically inconsistent parameter names, mapped to canonical slots.
/// Applies to every built-in; a per-tool table handles the rest.
const GLOBAL_ALIASES: &[(&str, &str)] = &[
    ("file_path", "path"),
    ("filepath", "path"),
    ("filename", "path"),
    ("file", "path"),
    ("directory", "path"),
    ("dir", "path"),
    ("folder", "path"),
    ("contents", "content"),
    ("body", "content"),
    ("old_str", "old_string"),
    ("new_str", "new_string"),
    ("query", "pattern"),
    ("regex", "pattern"),
    ("search_pattern", "pattern"),
];

/// Tool-specific aliases that would be ambiguous globally
const TOOL_ALIASES: &[(&str, &[(&str, &str)])] = &[
    ("analyze_usage", &[("name", "symbol"), ("identifier", "symbol"), ("function", "symbol")]),
    ("compare_files", &[("other", "other_path"), ("other_file", "other_path"), ("second_path", "other_path")]),
    ("read_file", &[("start", "offset"), ("lines", "limit")]),
];

/// Validates and dispatches tool calls
pub struct ToolHandler {
    builtin: HashMap<&'static str, Box<dyn Tool>>,
    registry: Arc<ToolRegistry>,
    runner: DynamicToolRunner,
    creator: Arc<ToolCreator>,
    validator: Arc<ToolValidator>,
    bus: Arc<MessageBus>,
}

impl ToolHandler {
    /// Build the handler, verifying at startup that every required
    /// built-in resolves to an implementation whose name matches its key.
    pub fn new(
        project_root: impl Into<std::path::PathBuf>,
        registry: Arc<ToolRegistry>,
        creator: Arc<ToolCreator>,
        validator: Arc<ToolValidator>,
        bus: Arc<MessageBus>,
    ) -> Result<Self> {
        let mut builtin: HashMap<&'static str, Box<dyn Tool>> = HashMap::new();
        for tool in [
            Box::new(ReadFileTool) as Box<dyn Tool>,
            Box::new(WriteFileTool),
            Box::new(EditFileTool),
            Box::new(ListDirectoryTool),
            Box::new(SearchTool),
            Box::new(CompareFilesTool),
            Box::new(AnalyzeUsageTool),
            Box::new(ReadArchitectureTool),
        ] {
            builtin.insert(tool.name(), tool);
        }

        for required in REQUIRED_BUILTINS {
            let tool = builtin
                .get(required)
                .ok_or_else(|| eyre!("Built-in tool '{}' has no implementation", required))?;
            if tool.name() != *required {
                return Err(eyre!("Built-in tool '{}' resolves to '{}'", required, tool.name()));
            }
        }
        for (aliased_tool, _) in TOOL_ALIASES {
            if !builtin.contains_key(aliased_tool) {
                return Err(eyre!("Alias table references unknown tool '{}'", aliased_tool));
            }
        }

        Ok(Self {
            builtin,
            registry,
            runner: DynamicToolRunner::new(project_root.into()),
            creator,
            validator,
            bus,
        })
    }

    /// Every name the models may call: built-ins plus registered dynamic
    /// tools. This is the whitelist for free-text extraction too.
    pub fn known_names(&self) -> HashSet<String> {
        let mut names: HashSet<String> = self.builtin.keys().map(|n| n.to_string()).collect();
        names.extend(self.registry.names());
        names
    }

    /// Model-facing definitions for all available tools
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .builtin
            .values()
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.input_schema()))
            .collect();

        for spec in self.registry.list() {
            let properties: serde_json::Map<String, Value> = spec
                .parameters
                .iter()
                .map(|p| (p.clone(), json!({"type": "string"})))
                .collect();
            defs.push(ToolDefinition::new(
                &spec.name,
                &spec.description,
                json!({"type": "object", "properties": properties}),
            ));
        }

        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Definitions for a named subset
    pub fn definitions_for(&self, names: &[&str]) -> Vec<ToolDefinition> {
        self.definitions().into_iter().filter(|d| names.contains(&d.name.as_str())).collect()
    }

    /// Validate and dispatch one tool call
    pub async fn dispatch(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutcome {
        let name = call.name.as_str();

        // Whitelist first: unknown names are recorded for the tool
        // creator and rejected with no side effects.
        let is_builtin = self.builtin.contains_key(name);
        let dynamic_spec = if is_builtin { None } else { self.registry.get(name) };
        if !is_builtin && dynamic_spec.is_none() {
            warn!(tool = name, phase = %ctx.phase, "Rejecting unknown tool");
            self.creator.record_unknown(name, &ctx.phase, &call.arguments);
            return ToolOutcome::failure(name, "unknown_tool");
        }

        if !call.arguments.is_object() && !call.arguments.is_null() {
            return ToolOutcome::failure(name, "invalid_arg: arguments must be an object");
        }
        let arguments = normalize_arguments(name, &call.arguments);

        if self.validator.is_deprecated(name) {
            self.bus.publish(Message::broadcast(
                MessageType::SystemWarning,
                "tool_handler",
                json!({"kind": "deprecated_tool", "tool": name, "phase": ctx.phase}),
            ));
        }

        let started = Instant::now();
        let outcome = match (self.builtin.get(name), dynamic_spec) {
            (Some(tool), _) => {
                let result = tool.execute(arguments, ctx).await;
                if result.is_error {
                    let kind = error_kind_of(&result.content);
                    ToolOutcome::failure(name, result.content).with_metadata(json!({"error_kind": kind}))
                } else {
                    ToolOutcome::success(name, json!(result.content))
                }
            }
            (None, Some(spec)) => match self.runner.run(&spec, &arguments).await {
                Ok(value) => ToolOutcome::success(name, value),
                Err(err) => {
                    let kind = err.kind();
                    ToolOutcome::failure(name, err.to_string()).with_metadata(json!({"error_kind": kind}))
                }
            },
            (None, None) => unreachable!("whitelist check rejected unknown tools"),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let error_kind = outcome.metadata.get("error_kind").and_then(|k| k.as_str());
        self.validator.record(name, outcome.success, &ctx.phase, duration_ms, error_kind);

        debug!(
            tool = name,
            phase = %ctx.phase,
            success = outcome.success,
            duration_ms,
            "Dispatched tool call"
        );
        outcome
    }

    /// Dispatch several calls, recording effects in issue order
    pub async fn dispatch_all(&self, calls: &[ToolCall], ctx: &ToolContext) -> Vec<(String, ToolOutcome)> {
        let mut outcomes = Vec::with_capacity(calls.len());
        for call in calls {
            let outcome = self.dispatch(call, ctx).await;
            outcomes.push((call.id.clone(), outcome));
        }
        outcomes
    }
}

/// Map variant parameter names onto canonical slots; existing canonical
/// keys always win.
fn normalize_arguments(tool: &str, arguments: &Value) -> Value {
    let Some(obj) = arguments.as_object() else {
        return json!({});
    };

    let tool_aliases: HashMap<&str, &str> = TOOL_ALIASES
        .iter()
        .find(|(name, _)| *name == tool)
        .map(|(_, aliases)| aliases.iter().copied().collect())
        .unwrap_or_default();
    let global_aliases: HashMap<&str, &str> = GLOBAL_ALIASES.iter().copied().collect();

    let mut normalized = serde_json::Map::new();
    for (key, value) in obj {
        let canonical = tool_aliases
            .get(key.as_str())
            .or_else(|| global_aliases.get(key.as_str()))
            .map(|c| c.to_string())
            .unwrap_or_else(|| key.clone());

        normalized.entry(canonical).or_insert_with(|| value.clone());
    }

    // A canonical key present in the input always beats an alias
    for (key, value) in obj {
        let is_alias = tool_aliases.contains_key(key.as_str()) || global_aliases.contains_key(key.as_str());
        if !is_alias {
            normalized.insert(key.clone(), value.clone());
        }
    }

    Value::Object(normalized)
}

/// Best-effort error kind tag from a built-in error string
fn error_kind_of(message: &str) -> &'static str {
    if message.starts_with("invalid_arg") {
        "invalid_arg"
    } else if message.contains("escapes project root") {
        "sandbox_violation"
    } else if message.contains("read file before editing") {
        "edit_without_read"
    } else if message.contains("not found") {
        "not_found"
    } else {
        "execution_error"
    }
}
