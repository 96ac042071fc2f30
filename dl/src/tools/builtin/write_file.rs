//! write_file - create or overwrite a file

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Write content to a file, creating parent directories as needed
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Create or overwrite a file with the given content."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the project root"
                },
                "content": {
                    "type": "string",
                    "description": "Full file content"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> ToolResult {
        let path = match arguments["path"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("invalid_arg: path is required"),
        };
        let content = match arguments["content"].as_str() {
            Some(c) => c,
            None => return ToolResult::error("invalid_arg: content is required"),
        };

        let full_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if let Some(parent) = full_path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return ToolResult::error(format!("Failed to create directories: {}", e));
        }

        match tokio::fs::write(&full_path, content).await {
            Ok(()) => {
                // The writer knows the content it just authored; count the
                // write as a read so an edit can follow immediately
                ctx.track_read(&full_path).await;
                ToolResult::success(format!("Wrote {} bytes to {}", content.len(), path))
            }
            Err(e) => ToolResult::error(format!("Failed to write file: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_creates_file_and_dirs() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "coding");

        let result = WriteFileTool
            .execute(
                serde_json::json!({"path": "src/deep/module.rs", "content": "pub fn f() {}"}),
                &ctx,
            )
            .await;

        assert!(!result.is_error);
        let written = fs::read_to_string(temp.path().join("src/deep/module.rs")).unwrap();
        assert_eq!(written, "pub fn f() {}");
    }

    #[tokio::test]
    async fn test_write_then_edit_without_read() {
        use crate::tools::builtin::EditFileTool;

        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "coding");

        WriteFileTool
            .execute(serde_json::json!({"path": "fresh.rs", "content": "fn old() {}"}), &ctx)
            .await;

        // The write counts as a read, so an immediate edit is allowed
        let result = EditFileTool
            .execute(
                serde_json::json!({"path": "fresh.rs", "old_string": "old", "new_string": "new"}),
                &ctx,
            )
            .await;
        assert!(!result.is_error, "{}", result.content);
        assert_eq!(fs::read_to_string(temp.path().join("fresh.rs")).unwrap(), "fn new() {}");
    }

    #[tokio::test]
    async fn test_write_outside_root_rejected() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "coding");

        let result = WriteFileTool
            .execute(serde_json::json!({"path": "/tmp/escape.txt", "content": "x"}), &ctx)
            .await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_write_missing_content() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "coding");

        let result = WriteFileTool.execute(serde_json::json!({"path": "a.txt"}), &ctx).await;
        assert!(result.is_error);
        assert!(result.content.contains("content is required"));
    }
}
