//! edit_file - exact string replacement

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

/// Replace an exact string in a file; requires the file was read first
pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &'static str {
        "edit_file"
    }

    fn description(&self) -> &'static str {
        "Replace an exact string in a file. The file must have been read first."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the project root"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact text to replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement text"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace every occurrence (default: false)"
                }
            },
            "required": ["path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> ToolResult {
        let path = match arguments["path"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("invalid_arg: path is required"),
        };
        let old_string = match arguments["old_string"].as_str() {
            Some(s) => s,
            None => return ToolResult::error("invalid_arg: old_string is required"),
        };
        let new_string = match arguments["new_string"].as_str() {
            Some(s) => s,
            None => return ToolResult::error("invalid_arg: new_string is required"),
        };
        let replace_all = arguments["replace_all"].as_bool().unwrap_or(false);

        let full_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if !ctx.was_read(&full_path).await {
            return ToolResult::error(
                ToolError::EditWithoutRead {
                    path: path.to_string(),
                }
                .to_string(),
            );
        }

        let content = match tokio::fs::read_to_string(&full_path).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("Failed to read file: {}", e)),
        };

        let count = content.matches(old_string).count();
        if count == 0 {
            return ToolResult::error(
                ToolError::PatternNotFound {
                    pattern: old_string.to_string(),
                }
                .to_string(),
            );
        }
        if count > 1 && !replace_all {
            return ToolResult::error(ToolError::PatternNotUnique { count }.to_string());
        }

        let updated = if replace_all {
            content.replace(old_string, new_string)
        } else {
            content.replacen(old_string, new_string, 1)
        };

        match tokio::fs::write(&full_path, updated).await {
            Ok(()) => ToolResult::success(format!("Replaced {} occurrence(s) in {}", count, path)),
            Err(e) => ToolResult::error(format!("Failed to write file: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    async fn ctx_with_read(temp: &tempfile::TempDir, name: &str, content: &str) -> ToolContext {
        fs::write(temp.path().join(name), content).unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");
        ctx.track_read(&temp.path().join(name).canonicalize().unwrap()).await;
        ctx
    }

    #[tokio::test]
    async fn test_edit_single_occurrence() {
        let temp = tempdir().unwrap();
        let ctx = ctx_with_read(&temp, "a.rs", "fn old_name() {}").await;

        let result = EditFileTool
            .execute(
                serde_json::json!({"path": "a.rs", "old_string": "old_name", "new_string": "new_name"}),
                &ctx,
            )
            .await;

        assert!(!result.is_error);
        assert_eq!(fs::read_to_string(temp.path().join("a.rs")).unwrap(), "fn new_name() {}");
    }

    #[tokio::test]
    async fn test_edit_requires_prior_read() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.rs"), "x").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = EditFileTool
            .execute(
                serde_json::json!({"path": "a.rs", "old_string": "x", "new_string": "y"}),
                &ctx,
            )
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("read file before editing"));
    }

    #[tokio::test]
    async fn test_edit_ambiguous_pattern() {
        let temp = tempdir().unwrap();
        let ctx = ctx_with_read(&temp, "a.rs", "x x x").await;

        let result = EditFileTool
            .execute(
                serde_json::json!({"path": "a.rs", "old_string": "x", "new_string": "y"}),
                &ctx,
            )
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("replace_all"));
    }

    #[tokio::test]
    async fn test_edit_replace_all() {
        let temp = tempdir().unwrap();
        let ctx = ctx_with_read(&temp, "a.rs", "x x x").await;

        let result = EditFileTool
            .execute(
                serde_json::json!({"path": "a.rs", "old_string": "x", "new_string": "y", "replace_all": true}),
                &ctx,
            )
            .await;
        assert!(!result.is_error);
        assert_eq!(fs::read_to_string(temp.path().join("a.rs")).unwrap(), "y y y");
    }

    #[tokio::test]
    async fn test_edit_pattern_not_found() {
        let temp = tempdir().unwrap();
        let ctx = ctx_with_read(&temp, "a.rs", "hello").await;

        let result = EditFileTool
            .execute(
                serde_json::json!({"path": "a.rs", "old_string": "absent", "new_string": "y"}),
                &ctx,
            )
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("not found"));
    }
}
