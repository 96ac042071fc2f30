//! analyze_usage - count where a symbol is used across the project

use async_trait::async_trait;
use grep_regex::RegexMatcher;
use grep_searcher::Searcher;
use grep_searcher::sinks::UTF8;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

use crate::tools::{Tool, ToolContext, ToolResult};

const SKIP_DIRS: &[&str] = &[".git", "target", "node_modules", ".pipeline"];

/// Per-file usage counts for a symbol
///
/// The dead-code workflow's required first step: zero or one occurrence
/// means the definition is its only reference.
pub struct AnalyzeUsageTool;

#[async_trait]
impl Tool for AnalyzeUsageTool {
    fn name(&self) -> &'static str {
        "analyze_usage"
    }

    fn description(&self) -> &'static str {
        "Count occurrences of a symbol per file across the project."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "symbol": {
                    "type": "string",
                    "description": "Identifier to look for (word-boundary matched)"
                },
                "path": {
                    "type": "string",
                    "description": "Subdirectory to scan (default: project root)"
                }
            },
            "required": ["symbol"]
        })
    }

    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> ToolResult {
        let symbol = match arguments["symbol"].as_str() {
            Some(s) => s,
            None => return ToolResult::error("invalid_arg: symbol is required"),
        };
        if !symbol.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return ToolResult::error("invalid_arg: symbol must be an identifier");
        }
        let rel = arguments["path"].as_str().unwrap_or(".");

        let root = match ctx.validate_path(Path::new(rel)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let matcher = match RegexMatcher::new(&format!(r"\b{}\b", symbol)) {
            Ok(m) => m,
            Err(e) => return ToolResult::error(format!("invalid_arg: {}", e)),
        };

        let mut per_file: BTreeMap<String, usize> = BTreeMap::new();
        let mut searcher = Searcher::new();

        for entry in WalkDir::new(&root)
            .into_iter()
            .filter_entry(|e| !SKIP_DIRS.contains(&e.file_name().to_string_lossy().as_ref()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let display = entry
                .path()
                .strip_prefix(&ctx.project_root)
                .unwrap_or(entry.path())
                .display()
                .to_string();

            let mut count = 0usize;
            let result = searcher.search_path(
                &matcher,
                entry.path(),
                UTF8(|_, _| {
                    count += 1;
                    Ok(true)
                }),
            );
            if result.is_ok() && count > 0 {
                per_file.insert(display, count);
            }
        }

        let total: usize = per_file.values().sum();
        let mut report = format!("symbol {}: {} occurrence(s) in {} file(s)\n", symbol, total, per_file.len());
        for (file, count) in &per_file {
            report.push_str(&format!("{}: {}\n", file, count));
        }

        ToolResult::success(report)
    }
}
