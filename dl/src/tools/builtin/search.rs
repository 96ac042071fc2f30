//! search - regex search across project files

use async_trait::async_trait;
use grep_regex::RegexMatcher;
use grep_searcher::Searcher;
use grep_searcher::sinks::UTF8;
use serde_json::Value;
use std::path::Path;
use walkdir::WalkDir;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Cap on reported matches
const MAX_MATCHES: usize = 200;

/// Directories never worth searching
const SKIP_DIRS: &[&str] = &[".git", "target", "node_modules", ".pipeline"];

/// Regex search over project files
pub struct SearchTool;

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &'static str {
        "search"
    }

    fn description(&self) -> &'static str {
        "Search project files with a regex, returning path:line matches."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regex to search for"
                },
                "path": {
                    "type": "string",
                    "description": "Subdirectory to search (default: project root)"
                },
                "extension": {
                    "type": "string",
                    "description": "Only files with this extension, e.g. rs"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> ToolResult {
        let pattern = match arguments["pattern"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("invalid_arg: pattern is required"),
        };
        let rel = arguments["path"].as_str().unwrap_or(".");
        let extension = arguments["extension"].as_str();

        let root = match ctx.validate_path(Path::new(rel)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let matcher = match RegexMatcher::new(pattern) {
            Ok(m) => m,
            Err(e) => return ToolResult::error(format!("invalid_arg: bad regex: {}", e)),
        };

        let mut matches: Vec<String> = Vec::new();
        let mut searcher = Searcher::new();

        for entry in WalkDir::new(&root)
            .into_iter()
            .filter_entry(|e| !SKIP_DIRS.contains(&e.file_name().to_string_lossy().as_ref()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            if let Some(ext) = extension
                && entry.path().extension().map(|e| e.to_string_lossy() != ext).unwrap_or(true)
            {
                continue;
            }
            if matches.len() >= MAX_MATCHES {
                break;
            }

            let display = entry
                .path()
                .strip_prefix(&ctx.project_root)
                .unwrap_or(entry.path())
                .display()
                .to_string();

            let result = searcher.search_path(
                &matcher,
                entry.path(),
                UTF8(|line_number, line| {
                    matches.push(format!("{}:{}: {}", display, line_number, line.trim_end()));
                    Ok(matches.len() < MAX_MATCHES)
                }),
            );
            if result.is_err() {
                // Binary or unreadable file; skip it
                continue;
            }
        }

        if matches.is_empty() {
            ToolResult::success("No matches")
        } else {
            ToolResult::success(matches.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_search_finds_matches() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/a.rs"), "fn alpha() {}\nfn beta() {}").unwrap();
        fs::write(temp.path().join("src/b.rs"), "fn alpha_helper() {}").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = SearchTool
            .execute(serde_json::json!({"pattern": "fn alpha"}), &ctx)
            .await;
        assert!(!result.is_error);
        assert!(result.content.contains("src/a.rs:1"));
        assert!(result.content.contains("src/b.rs:1"));
        assert!(!result.content.contains("beta"));
    }

    #[tokio::test]
    async fn test_search_extension_filter() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.rs"), "needle").unwrap();
        fs::write(temp.path().join("b.txt"), "needle").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = SearchTool
            .execute(serde_json::json!({"pattern": "needle", "extension": "rs"}), &ctx)
            .await;
        assert!(result.content.contains("a.rs"));
        assert!(!result.content.contains("b.txt"));
    }

    #[tokio::test]
    async fn test_search_no_matches() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.rs"), "nothing here").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = SearchTool
            .execute(serde_json::json!({"pattern": "absent_symbol"}), &ctx)
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content, "No matches");
    }

    #[tokio::test]
    async fn test_search_bad_regex() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");
        let result = SearchTool.execute(serde_json::json!({"pattern": "("}), &ctx).await;
        assert!(result.is_error);
        assert!(result.content.contains("invalid_arg"));
    }
}
