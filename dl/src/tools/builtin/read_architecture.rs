//! read_architecture - the intended architecture and its current status

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Read `ARCHITECTURE.md` plus `ARCHITECTURE_STATUS.md`
///
/// Required first step of the integration-conflict and
/// architecture-violation workflows.
pub struct ReadArchitectureTool;

#[async_trait]
impl Tool for ReadArchitectureTool {
    fn name(&self) -> &'static str {
        "read_architecture"
    }

    fn description(&self) -> &'static str {
        "Read the intended architecture document and its current status."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _arguments: Value, ctx: &ToolContext) -> ToolResult {
        let mut out = String::new();

        for name in ["ARCHITECTURE.md", "ARCHITECTURE_STATUS.md"] {
            let path = ctx.project_root.join(name);
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    out.push_str(&format!("===== {} =====\n{}\n", name, content));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    out.push_str(&format!("===== {} =====\n(missing)\n", name));
                }
                Err(e) => return ToolResult::error(format!("Failed to read {}: {}", name, e)),
            }
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
    async fn test_reads_both_documents() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("ARCHITECTURE.md"), "# Architecture\nlayered").unwrap();
        fs::write(temp.path().join("ARCHITECTURE_STATUS.md"), "# Status\non track").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = ReadArchitectureTool.execute(serde_json::json!({}), &ctx).await;
        assert!(!result.is_error);
        assert!(result.content.contains("layered"));
        assert!(result.content.contains("on track"));
    }

    #[tokio::test]
    async fn test_tolerates_missing_documents() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = ReadArchitectureTool.execute(serde_json::json!({}), &ctx).await;
        assert!(!result.is_error);
        assert!(result.content.contains("(missing)"));
    }
}
