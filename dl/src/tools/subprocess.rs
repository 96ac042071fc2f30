//! Dynamic tool execution in isolated subprocesses
//!
//! Dynamic tools are standalone scripts. Each invocation spawns a fresh
//! child process - no module caching, no shared memory - so a crashing or
//! misbehaving tool can never take the core down with it.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::registry::DynamicToolSpec;

use super::error::ToolError;

/// Default wall-clock timeout for a tool subprocess
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Spawns dynamic tool scripts and collects their JSON results
pub struct DynamicToolRunner {
    project_root: PathBuf,
    default_timeout: Duration,
}

impl DynamicToolRunner {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            default_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Run one tool invocation
    ///
    /// Protocol: `<interpreter> <script> --project-dir <root> --args <json>`;
    /// stdout is the canonical JSON result, stderr is diagnostic only.
    pub async fn run(&self, spec: &DynamicToolSpec, arguments: &Value) -> Result<Value, ToolError> {
        let script = spec.script_path(&self.project_root);
        if !script.exists() {
            return Err(ToolError::ScriptMissing(script));
        }

        let timeout = spec.timeout_secs.map(Duration::from_secs).unwrap_or(self.default_timeout);
        let args_json =
            serde_json::to_string(arguments).map_err(|e| ToolError::InvalidArgument(e.to_string()))?;

        debug!(tool = %spec.name, script = %script.display(), ?timeout, "Spawning tool subprocess");

        let child = Command::new(&spec.interpreter)
            .arg(&script)
            .arg("--project-dir")
            .arg(&self.project_root)
            .arg("--args")
            .arg(&args_json)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(timeout, child)
            .await
            .map_err(|_| {
                warn!(tool = %spec.name, ?timeout, "Tool subprocess timed out");
                ToolError::SubprocessTimeout(timeout)
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(ToolError::SubprocessFailed {
                exit_code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        serde_json::from_str(stdout.trim()).map_err(|_| ToolError::NonJsonOutput { stdout, stderr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_tool(root: &std::path::Path, name: &str, body: &str) -> DynamicToolSpec {
        let dir = root.join(crate::registry::CUSTOM_TOOLS_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), body).unwrap();
        DynamicToolSpec {
            name: name.trim_end_matches(".sh").to_string(),
            description: String::new(),
            entry: name.to_string(),
            interpreter: "sh".to_string(),
            timeout_secs: None,
            parameters: vec![],
        }
    }

    #[tokio::test]
    async fn test_successful_tool_returns_json() {
        let temp = tempdir().unwrap();
        let spec = write_tool(temp.path(), "count.sh", "echo '{\"count\": 3}'");
        let runner = DynamicToolRunner::new(temp.path());

        let result = runner.run(&spec, &serde_json::json!({})).await.unwrap();
        assert_eq!(result["count"], 3);
    }

    #[tokio::test]
    async fn test_tool_receives_args() {
        let temp = tempdir().unwrap();
        // Echo the --args value back as the result (it's argument 4)
        let spec = write_tool(temp.path(), "echo_args.sh", "echo \"$4\"");
        let runner = DynamicToolRunner::new(temp.path());

        let result = runner.run(&spec, &serde_json::json!({"x": 1})).await.unwrap();
        assert_eq!(result["x"], 1);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_structured_error() {
        let temp = tempdir().unwrap();
        let spec = write_tool(temp.path(), "crash.sh", "exit 2");
        let runner = DynamicToolRunner::new(temp.path());

        let err = runner.run(&spec, &serde_json::json!({})).await.unwrap_err();
        match err {
            ToolError::SubprocessFailed { exit_code, .. } => assert_eq!(exit_code, 2),
            other => panic!("Expected SubprocessFailed, got {:?}", other),
        }
        assert!(err.to_string().contains("exit 2"));
    }

    #[tokio::test]
    async fn test_garbage_stdout_is_structured_error() {
        let temp = tempdir().unwrap();
        let spec = write_tool(temp.path(), "garbage.sh", "echo 'this is not json'");
        let runner = DynamicToolRunner::new(temp.path());

        let err = runner.run(&spec, &serde_json::json!({})).await.unwrap_err();
        match err {
            ToolError::NonJsonOutput { stdout, .. } => assert!(stdout.contains("not json")),
            other => panic!("Expected NonJsonOutput, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_tool() {
        let temp = tempdir().unwrap();
        let spec = write_tool(temp.path(), "slow.sh", "sleep 5");
        let runner = DynamicToolRunner::new(temp.path()).with_timeout(Duration::from_millis(100));

        let err = runner.run(&spec, &serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::SubprocessTimeout(_)));
    }

    #[tokio::test]
    async fn test_missing_script() {
        let temp = tempdir().unwrap();
        let spec = DynamicToolSpec {
            name: "ghost".to_string(),
            description: String::new(),
            entry: "ghost.sh".to_string(),
            interpreter: "sh".to_string(),
            timeout_secs: None,
            parameters: vec![],
        };
        let runner = DynamicToolRunner::new(temp.path());

        let err = runner.run(&spec, &serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::ScriptMissing(_)));
    }
}
