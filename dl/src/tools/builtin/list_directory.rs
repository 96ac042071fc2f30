//! list_directory - directory listing with optional glob filter

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

use crate::tools::{Tool, ToolContext, ToolResult};

/// List a directory's entries, or files matching a glob pattern
pub struct ListDirectoryTool;

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &'static str {
        "list_directory"
    }

    fn description(&self) -> &'static str {
        "List directory entries. Pass a glob pattern to filter recursively."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory relative to the project root (default: root)"
                },
                "pattern": {
                    "type": "string",
                    "description": "Optional glob pattern, e.g. src/**/*.rs"
                }
            }
        })
    }

    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> ToolResult {
        let rel = arguments["path"].as_str().unwrap_or(".");

        let dir = match ctx.validate_path(Path::new(rel)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if let Some(pattern) = arguments["pattern"].as_str() {
            let full_pattern = dir.join(pattern);
            let Some(pattern_str) = full_pattern.to_str() else {
                return ToolResult::error("invalid_arg: pattern is not valid UTF-8");
            };
            let paths = match glob::glob(pattern_str) {
                Ok(paths) => paths,
                Err(e) => return ToolResult::error(format!("invalid_arg: bad glob pattern: {}", e)),
            };

            let mut matches = Vec::new();
            for entry in paths.flatten() {
                if let Ok(stripped) = entry.strip_prefix(&ctx.project_root) {
                    matches.push(stripped.display().to_string());
                }
            }
            matches.sort();
            return ToolResult::success(matches.join("\n"));
        }

        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) => return ToolResult::error(format!("Failed to read directory: {}", e)),
        };

        let mut entries = Vec::new();
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let suffix = if entry.path().is_dir() { "/" } else { "" };
            entries.push(format!("{}{}", entry.file_name().to_string_lossy(), suffix));
        }
        entries.sort();

        ToolResult::success(entries.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_list_entries() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("README.md"), "x").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = ListDirectoryTool.execute(serde_json::json!({}), &ctx).await;
        assert!(!result.is_error);
        assert!(result.content.contains("src/"));
        assert!(result.content.contains("README.md"));
    }

    #[tokio::test]
    async fn test_list_with_glob() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("src/sub")).unwrap();
        fs::write(temp.path().join("src/a.rs"), "x").unwrap();
        fs::write(temp.path().join("src/sub/b.rs"), "x").unwrap();
        fs::write(temp.path().join("src/c.txt"), "x").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = ListDirectoryTool
            .execute(serde_json::json!({"pattern": "src/**/*.rs"}), &ctx)
            .await;
        assert!(!result.is_error);
        assert!(result.content.contains("src/a.rs"));
        assert!(result.content.contains("src/sub/b.rs"));
        assert!(!result.content.contains("c.txt"));
    }

    #[tokio::test]
    async fn test_list_missing_dir() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");
        let result = ListDirectoryTool.execute(serde_json::json!({"path": "ghost"}), &ctx).await;
        assert!(result.is_error);
    }
}
