//! read_file - numbered view of a file window

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Default window when the caller gives no limit
const DEFAULT_WINDOW: usize = 2000;

/// Cap on a single emitted line; minified files and embedded blobs get
/// cut here rather than flooding the model context
const MAX_LINE_CHARS: usize = 2000;

/// Read a window of a file with line numbers
///
/// Editing requires the file to have been read first, so this also feeds
/// the context's read tracking.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read a numbered window of a file. A file must be read before it can be edited."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Project-relative file path"
                },
                "offset": {
                    "type": "integer",
                    "description": "First line of the window (1-indexed)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Window size in lines"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> ToolResult {
        let path = match arguments["path"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("invalid_arg: path is required"),
        };
        let offset = (arguments["offset"].as_u64().unwrap_or(1) as usize).max(1);
        let limit = arguments["limit"].as_u64().unwrap_or(DEFAULT_WINDOW as u64) as usize;

        let full_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let content = match tokio::fs::read_to_string(&full_path).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("Failed to read file: {}", e)),
        };

        ctx.track_read(&full_path).await;

        let total = content.lines().count();
        let mut out = String::new();
        let mut shown = 0usize;

        for (index, line) in content.lines().enumerate() {
            let number = index + 1;
            if number < offset {
                continue;
            }
            if shown == limit {
                break;
            }

            out.push_str(&format!("{:>5}: ", number));
            if line.len() > MAX_LINE_CHARS {
                // Cut at a char boundary; byte MAX_LINE_CHARS may not be one
                let cut = line
                    .char_indices()
                    .map(|(i, _)| i)
                    .take_while(|i| *i <= MAX_LINE_CHARS)
                    .last()
                    .unwrap_or(0);
                out.push_str(&line[..cut]);
                out.push_str(" [line truncated]");
            } else {
                out.push_str(line);
            }
            out.push('\n');
            shown += 1;
        }

        let last_shown = offset.saturating_add(shown).saturating_sub(1);
        if last_shown < total {
            out.push_str(&format!("({} more line(s) past line {})\n", total - last_shown, last_shown));
        }
        if shown == 0 {
            out = format!("(no lines in window; file has {} line(s))\n", total);
        }

        ToolResult::success(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_read_basic() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("test.txt"), "alpha\nbeta\ngamma").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = ReadFileTool.execute(serde_json::json!({"path": "test.txt"}), &ctx).await;
        assert!(!result.is_error);
        assert!(result.content.contains("    1: alpha"));
        assert!(result.content.contains("    3: gamma"));
        assert!(!result.content.contains("more line(s)"));
    }

    #[tokio::test]
    async fn test_read_window() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("test.txt"), "l1\nl2\nl3\nl4").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = ReadFileTool
            .execute(serde_json::json!({"path": "test.txt", "offset": 2, "limit": 2}), &ctx)
            .await;
        assert!(result.content.contains("    2: l2"));
        assert!(result.content.contains("    3: l3"));
        assert!(!result.content.contains(": l1"));
        assert!(!result.content.contains(": l4"));
        assert!(result.content.contains("(1 more line(s) past line 3)"));
    }

    #[tokio::test]
    async fn test_read_truncates_long_lines() {
        let temp = tempdir().unwrap();
        let blob = "x".repeat(5 * MAX_LINE_CHARS);
        fs::write(temp.path().join("minified.js"), &blob).unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = ReadFileTool
            .execute(serde_json::json!({"path": "minified.js"}), &ctx)
            .await;
        assert!(!result.is_error);
        assert!(result.content.contains("[line truncated]"));
        assert!(result.content.len() < blob.len());
    }

    #[tokio::test]
    async fn test_read_window_past_end() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("test.txt"), "only\ntwo").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = ReadFileTool
            .execute(serde_json::json!({"path": "test.txt", "offset": 10}), &ctx)
            .await;
        assert!(!result.is_error);
        assert!(result.content.contains("no lines in window"));
        assert!(result.content.contains("2 line(s)"));
    }

    #[tokio::test]
    async fn test_read_missing_path_arg() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");
        let result = ReadFileTool.execute(serde_json::json!({}), &ctx).await;
        assert!(result.is_error);
        assert!(result.content.contains("invalid_arg"));
    }

    #[tokio::test]
    async fn test_read_tracks_for_edit() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.rs"), "x").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        ReadFileTool.execute(serde_json::json!({"path": "a.rs"}), &ctx).await;
        assert!(ctx.was_read(&temp.path().join("a.rs").canonicalize().unwrap()).await);
    }
}
