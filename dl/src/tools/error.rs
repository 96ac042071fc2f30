//! Tool error types

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while validating or executing tool calls
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Path {path} escapes project root {root}")]
    SandboxViolation { path: PathBuf, root: PathBuf },

    #[error("Must read file before editing: {path}")]
    EditWithoutRead { path: String },

    #[error("Tool not found: {name}")]
    UnknownTool { name: String },

    #[error("invalid_arg: {0}")]
    InvalidArgument(String),

    #[error("String pattern '{pattern}' not found in file")]
    PatternNotFound { pattern: String },

    #[error("String pattern found {count} times, expected 1 (use replace_all=true for multiple)")]
    PatternNotUnique { count: usize },

    #[error("Tool subprocess timed out after {0:?}")]
    SubprocessTimeout(Duration),

    #[error("Tool subprocess failed: exit {exit_code}")]
    SubprocessFailed { exit_code: i32, stderr: String },

    #[error("Tool subprocess produced non-JSON stdout")]
    NonJsonOutput { stdout: String, stderr: String },

    #[error("Tool script missing: {0}")]
    ScriptMissing(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// Short tag used in validator error-kind histograms
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SandboxViolation { .. } => "sandbox_violation",
            Self::EditWithoutRead { .. } => "edit_without_read",
            Self::UnknownTool { .. } => "unknown_tool",
            Self::InvalidArgument(_) => "invalid_arg",
            Self::PatternNotFound { .. } => "pattern_not_found",
            Self::PatternNotUnique { .. } => "pattern_not_unique",
            Self::SubprocessTimeout(_) => "subprocess_timeout",
            Self::SubprocessFailed { .. } => "subprocess_failed",
            Self::NonJsonOutput { .. } => "non_json_output",
            Self::ScriptMissing(_) => "script_missing",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_arg_prefix() {
        let err = ToolError::InvalidArgument("path is required".to_string());
        assert!(err.to_string().starts_with("invalid_arg:"));
    }

    #[test]
    fn test_subprocess_failed_message() {
        let err = ToolError::SubprocessFailed {
            exit_code: 2,
            stderr: "boom".to_string(),
        };
        assert!(err.to_string().contains("exit 2"));
        assert_eq!(err.kind(), "subprocess_failed");
    }
}
