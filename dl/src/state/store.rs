//! StateStore - atomic persistence for the pipeline snapshot
//!
//! Single-writer discipline: all mutation goes through `update`, which
//! clones the current snapshot, applies the mutation, validates every
//! invariant and persists before swapping the new snapshot in. A crash at
//! any instant leaves either the previous or the new committed file on
//! disk, never a partial one.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::snapshot::PipelineState;

/// Directory under the project root holding pipeline artifacts
pub const PIPELINE_DIR: &str = ".pipeline";

/// Errors raised by state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error("State file corrupt: {path}: {detail}")]
    Corrupt { path: PathBuf, detail: String },

    #[error("No backup available at {0}")]
    NoBackup(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Atomically persisted pipeline state
pub struct StateStore {
    state_path: PathBuf,
    backup_path: PathBuf,
    inner: RwLock<PipelineState>,
}

impl StateStore {
    /// Open the store rooted at a project directory, loading an existing
    /// snapshot when present. A corrupt snapshot falls back to the backup.
    pub fn open(project_root: impl AsRef<Path>) -> Result<Self, StateError> {
        let pipeline_dir = project_root.as_ref().join(PIPELINE_DIR);
        fs::create_dir_all(&pipeline_dir)?;

        let state_path = pipeline_dir.join("state.json");
        let backup_path = pipeline_dir.join("state.json.bak");

        let state = match load_snapshot(&state_path) {
            Ok(Some(state)) => state,
            Ok(None) => {
                info!("No state snapshot found, starting fresh");
                PipelineState::default()
            }
            Err(err) => {
                warn!(error = %err, "State snapshot corrupt, restoring backup");
                match load_snapshot(&backup_path)? {
                    Some(state) => {
                        fs::copy(&backup_path, &state_path)?;
                        state
                    }
                    None => return Err(StateError::NoBackup(backup_path)),
                }
            }
        };

        Ok(Self {
            state_path,
            backup_path,
            inner: RwLock::new(state),
        })
    }

    /// Re-read the snapshot from disk
    pub async fn load(&self) -> Result<PipelineState, StateError> {
        match load_snapshot(&self.state_path)? {
            Some(state) => Ok(state),
            None => Ok(PipelineState::default()),
        }
    }

    /// Cloned, immutable view of the current state
    pub async fn snapshot(&self) -> PipelineState {
        self.inner.read().await.clone()
    }

    /// Apply a mutation under copy-then-swap: validate and persist the
    /// mutated copy before it becomes visible. A failed validation or
    /// write leaves both the in-memory state and the file untouched.
    pub async fn update<F, R>(&self, mutate: F) -> Result<R, StateError>
    where
        F: FnOnce(&mut PipelineState) -> R,
    {
        let mut guard = self.inner.write().await;

        let mut working = guard.clone();
        let result = mutate(&mut working);

        working.validate().map_err(StateError::Invariant)?;
        self.persist(&working)?;

        *guard = working;
        Ok(result)
    }

    /// Validate and persist the current state as-is
    pub async fn save(&self) -> Result<(), StateError> {
        let guard = self.inner.read().await;
        guard.validate().map_err(StateError::Invariant)?;
        self.persist(&guard)
    }

    /// Copy the current snapshot file aside as the backup
    pub async fn backup(&self) -> Result<(), StateError> {
        if self.state_path.exists() {
            fs::copy(&self.state_path, &self.backup_path)?;
            debug!(path = %self.backup_path.display(), "Backed up state snapshot");
        }
        Ok(())
    }

    /// Replace the live state with the last good backup
    pub async fn restore_backup(&self) -> Result<(), StateError> {
        let state = load_snapshot(&self.backup_path)?.ok_or_else(|| StateError::NoBackup(self.backup_path.clone()))?;
        fs::copy(&self.backup_path, &self.state_path)?;
        *self.inner.write().await = state;
        info!("Restored state from backup");
        Ok(())
    }

    /// tmp + fsync + rename; the previous snapshot is rotated to `.bak`
    /// so a later restore always has a committed file to fall back on.
    fn persist(&self, state: &PipelineState) -> Result<(), StateError> {
        let body = serde_json::to_string_pretty(state)?;

        let tmp_path = self.state_path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(body.as_bytes())?;
            file.sync_all()?;
        }

        if self.state_path.exists() {
            fs::copy(&self.state_path, &self.backup_path)?;
        }
        fs::rename(&tmp_path, &self.state_path)?;

        debug!(iteration = state.iteration, "Persisted state snapshot");
        Ok(())
    }
}

fn load_snapshot(path: &Path) -> Result<Option<PipelineState>, StateError> {
    if !path.exists() {
        return Ok(None);
    }
    let body = fs::read_to_string(path)?;
    let state: PipelineState = serde_json::from_str(&body).map_err(|e| StateError::Corrupt {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    state.validate().map_err(|v| StateError::Corrupt {
        path: path.to_path_buf(),
        detail: v,
    })?;
    Ok(Some(state))
}
