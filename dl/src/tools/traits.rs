//! Tool trait and result types

use async_trait::async_trait;
use serde_json::Value;

use super::context::ToolContext;

/// A built-in tool callable by a model
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (matches the model-side tool name)
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON Schema for the tool's parameters
    fn input_schema(&self) -> Value;

    /// Execute with already-normalized arguments
    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> ToolResult;
}

/// Raw result of one tool execution
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Structured outcome returned by the tool handler
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub tool: String,
    pub success: bool,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub metadata: serde_json::Value,
}

impl ToolOutcome {
    pub fn success(tool: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            tool: tool.into(),
            success: true,
            result: Some(result),
            error: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn failure(tool: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            success: false,
            result: None,
            error: Some(error.into()),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Flatten into text for a model-facing tool result block
    pub fn render(&self) -> String {
        if self.success {
            match &self.result {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(value) => value.to_string(),
                None => String::new(),
            }
        } else {
            self.error.clone().unwrap_or_else(|| "unknown error".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_constructors() {
        assert!(!ToolResult::success("ok").is_error);
        assert!(ToolResult::error("bad").is_error);
    }

    #[test]
    fn test_outcome_render() {
        let ok = ToolOutcome::success("read_file", serde_json::json!("line 1\nline 2"));
        assert_eq!(ok.render(), "line 1\nline 2");

        let err = ToolOutcome::failure("read_file", "unknown_tool");
        assert_eq!(err.render(), "unknown_tool");
    }
}
