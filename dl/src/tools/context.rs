//! ToolContext - execution context for tool calls
//!
//! Every phase execution gets a context scoped to the project root. File
//! operations are constrained to that root; a tool cannot escape it unless
//! sandboxing is explicitly disabled.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::ToolError;

/// Execution context handed to every tool call
#[derive(Clone)]
pub struct ToolContext {
    /// Project root - all file ops constrained here
    pub project_root: PathBuf,

    /// Name of the phase issuing the calls (for metrics attribution)
    pub phase: String,

    /// Files read during this execution (edit requires a prior read)
    read_files: Arc<Mutex<HashSet<PathBuf>>>,

    pub sandbox_enabled: bool,
}

impl ToolContext {
    pub fn new(project_root: PathBuf, phase: impl Into<String>) -> Self {
        Self {
            project_root,
            phase: phase.into(),
            read_files: Arc::new(Mutex::new(HashSet::new())),
            sandbox_enabled: true,
        }
    }

    /// Context with the sandbox off (tests only)
    pub fn new_unsandboxed(project_root: PathBuf, phase: impl Into<String>) -> Self {
        Self {
            sandbox_enabled: false,
            ..Self::new(project_root, phase)
        }
    }

    /// Track that a file was read
    pub async fn track_read(&self, path: &Path) {
        self.read_files.lock().await.insert(self.normalize(path));
    }

    /// Whether the file was read during this execution
    pub async fn was_read(&self, path: &Path) -> bool {
        self.read_files.lock().await.contains(&self.normalize(path))
    }

    /// Reset read tracking (called between executions)
    pub async fn clear_reads(&self) {
        self.read_files.lock().await.clear();
    }

    fn normalize(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    /// Resolve a path and enforce the sandbox
    ///
    /// Existing paths are canonicalized so symlinks cannot smuggle a write
    /// outside the root; new paths are checked through their parent.
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, ToolError> {
        let normalized = self.normalize(path);

        if !self.sandbox_enabled {
            return Ok(normalized);
        }

        let resolved = if normalized.exists() {
            normalized.canonicalize().unwrap_or_else(|_| normalized.clone())
        } else if let Some(parent) = normalized.parent() {
            let resolved_parent = if parent.exists() {
                parent.canonicalize().unwrap_or_else(|_| parent.to_path_buf())
            } else {
                parent.to_path_buf()
            };
            resolved_parent.join(normalized.file_name().unwrap_or_default())
        } else {
            normalized.clone()
        };

        let root = self
            .project_root
            .canonicalize()
            .unwrap_or_else(|_| self.project_root.clone());

        if resolved.starts_with(&root) {
            Ok(resolved)
        } else {
            Err(ToolError::SandboxViolation {
                path: path.to_path_buf(),
                root: self.project_root.clone(),
            })
        }
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("project_root", &self.project_root)
            .field("phase", &self.phase)
            .field("sandbox_enabled", &self.sandbox_enabled)
            .finish()
    }
}
