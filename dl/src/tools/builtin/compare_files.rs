//! compare_files - line-level similarity between two files

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Compare two files and report their line-level similarity
///
/// The duplicate-merge workflow uses this as its required first step.
pub struct CompareFilesTool;

#[async_trait]
impl Tool for CompareFilesTool {
    fn name(&self) -> &'static str {
        "compare_files"
    }

    fn description(&self) -> &'static str {
        "Compare two files: similarity ratio plus the lines unique to each."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "First file, relative to the project root"
                },
                "other_path": {
                    "type": "string",
                    "description": "Second file, relative to the project root"
                }
            },
            "required": ["path", "other_path"]
        })
    }

    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> ToolResult {
        let path = match arguments["path"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("invalid_arg: path is required"),
        };
        let other_path = match arguments["other_path"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("invalid_arg: other_path is required"),
        };

        let first = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let second = match ctx.validate_path(Path::new(other_path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let (a, b) = match (
            tokio::fs::read_to_string(&first).await,
            tokio::fs::read_to_string(&second).await,
        ) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(e), _) => return ToolResult::error(format!("Failed to read {}: {}", path, e)),
            (_, Err(e)) => return ToolResult::error(format!("Failed to read {}: {}", other_path, e)),
        };

        ctx.track_read(&first).await;
        ctx.track_read(&second).await;

        let lines_a: HashSet<&str> = a.lines().filter(|l| !l.trim().is_empty()).collect();
        let lines_b: HashSet<&str> = b.lines().filter(|l| !l.trim().is_empty()).collect();

        let shared = lines_a.intersection(&lines_b).count();
        let total = lines_a.len().max(lines_b.len()).max(1);
        let similarity = shared as f64 / total as f64;

        let only_a: Vec<&&str> = lines_a.difference(&lines_b).take(20).collect();
        let only_b: Vec<&&str> = lines_b.difference(&lines_a).take(20).collect();

        let mut report = format!(
            "similarity: {:.2}\nshared lines: {}\nunique to {}: {}\nunique to {}: {}\n",
            similarity,
            shared,
            path,
            lines_a.len() - shared,
            other_path,
            lines_b.len() - shared,
        );
        if !only_a.is_empty() {
            report.push_str(&format!("\n--- only in {} ---\n", path));
            for line in only_a {
                report.push_str(line);
                report.push('\n');
            }
        }
        if !only_b.is_empty() {
            report.push_str(&format!("\n--- only in {} ---\n", other_path));
            for line in only_b {
                report.push_str(line);
                report.push('\n');
            }
        }

        ToolResult::success(report)
    }
}
