//! Analyzer capability
//!
//! Concrete analyzers are plain values satisfying one trait; phases
//! consume whichever set they are handed. The core ships two: source
//! metrics and a lightweight import graph.

use std::collections::BTreeMap;
use std::path::Path;

use eyre::Result;
use regex::Regex;
use serde_json::json;
use walkdir::WalkDir;

const SKIP_DIRS: &[&str] = &[".git", "target", "node_modules", ".pipeline"];

/// Output of one analyzer run
#[derive(Debug, Clone)]
pub struct Findings {
    pub analyzer: String,
    pub payload: serde_json::Value,
    pub summary: String,
}

/// A pluggable analysis over a target path
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &'static str;

    fn analyze(&self, target: &Path) -> Result<Findings>;
}

/// Line/function counts per source file
pub struct SourceMetricsAnalyzer;

impl Analyzer for SourceMetricsAnalyzer {
    fn name(&self) -> &'static str {
        "source_metrics"
    }

    fn analyze(&self, target: &Path) -> Result<Findings> {
        let function_pattern = Regex::new(r"^\s*(pub(\([^)]*\))?\s+)?(async\s+)?fn\s+\w+|^\s*def\s+\w+|^\s*function\s+\w+")?;
        let mut per_file: BTreeMap<String, (usize, usize)> = BTreeMap::new();

        for entry in source_files(target) {
            let content = std::fs::read_to_string(entry.path()).unwrap_or_default();
            let lines = content.lines().count();
            let functions = content.lines().filter(|l| function_pattern.is_match(l)).count();

            let display = entry.path().strip_prefix(target).unwrap_or(entry.path()).display().to_string();
            per_file.insert(display, (lines, functions));
        }

        let total_lines: usize = per_file.values().map(|(l, _)| l).sum();
        let total_functions: usize = per_file.values().map(|(_, f)| f).sum();

        Ok(Findings {
            analyzer: self.name().to_string(),
            summary: format!(
                "{} files, {} lines, {} functions",
                per_file.len(),
                total_lines,
                total_functions
            ),
            payload: json!({
                "files": per_file.iter().map(|(path, (lines, functions))| {
                    json!({"path": path, "lines": lines, "functions": functions})
                }).collect::<Vec<_>>(),
                "total_lines": total_lines,
                "total_functions": total_functions,
            }),
        })
    }
}

/// Module-level import edges (Rust `use crate::` / Python `import`)
pub struct ImportGraphAnalyzer;

impl Analyzer for ImportGraphAnalyzer {
    fn name(&self) -> &'static str {
        "import_graph"
    }

    fn analyze(&self, target: &Path) -> Result<Findings> {
        let mut edges: Vec<(String, String)> = Vec::new();

        for entry in source_files(target) {
            let content = std::fs::read_to_string(entry.path()).unwrap_or_default();
            let from = entry.path().strip_prefix(target).unwrap_or(entry.path()).display().to_string();

            for line in content.lines() {
                let t = line.trim_start();
                let imported = if let Some(rest) = t.strip_prefix("use crate::") {
                    rest.split([':', ';']).next().map(str::to_string)
                } else if let Some(rest) = t.strip_prefix("import ") {
                    rest.split_whitespace().next().map(str::to_string)
                } else if let Some(rest) = t.strip_prefix("from ") {
                    rest.split_whitespace().next().map(str::to_string)
                } else {
                    None
                };
                if let Some(to) = imported {
                    edges.push((from.clone(), to));
                }
            }
        }

        Ok(Findings {
            analyzer: self.name().to_string(),
            summary: format!("{} import edges", edges.len()),
            payload: json!({
                "edges": edges.iter().map(|(from, to)| json!({"from": from, "to": to})).collect::<Vec<_>>(),
            }),
        })
    }
}

fn source_files(target: &Path) -> impl Iterator<Item = walkdir::DirEntry> {
    WalkDir::new(target)
        .into_iter()
        .filter_entry(|e| !SKIP_DIRS.contains(&e.file_name().to_string_lossy().as_ref()))
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file()
                && e.path()
                    .extension()
                    .map(|ext| matches!(ext.to_string_lossy().as_ref(), "rs" | "py" | "js" | "ts" | "go"))
                    .unwrap_or(false)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_source_metrics() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/a.rs"), "pub fn one() {}\nfn two() {}\n// comment\n").unwrap();
        fs::write(temp.path().join("notes.md"), "not source").unwrap();

        let findings = SourceMetricsAnalyzer.analyze(temp.path()).unwrap();
        assert_eq!(findings.payload["total_functions"], 2);
        assert!(findings.summary.contains("1 files"));
    }

    #[test]
    fn test_import_graph() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join("a.rs"),
            "use crate::state::StateStore;\nuse crate::bus::MessageBus;\n",
        )
        .unwrap();

        let findings = ImportGraphAnalyzer.analyze(temp.path()).unwrap();
        let edges = findings.payload["edges"].as_array().unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0]["to"], "state");
    }

    #[test]
    fn test_skips_ignored_dirs() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("target/debug")).unwrap();
        fs::write(temp.path().join("target/debug/junk.rs"), "fn x() {}").unwrap();

        let findings = SourceMetricsAnalyzer.analyze(temp.path()).unwrap();
        assert_eq!(findings.payload["total_functions"], 0);
    }
}
