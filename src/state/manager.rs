//! State manager implementation
//!
//! Provides file-based checkpoint persistence with atomic writes.

use super::types::{EndpointState, HarvestState};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// State manager for persisting and loading harvest checkpoints
#[derive(Debug)]
pub struct StateManager {
    /// Path to the state file
    path: PathBuf,
    /// Current state (cached)
    state: Arc<RwLock<HarvestState>>,
    /// Whether to save after every recorded flush
    auto_save: bool,
}

impl StateManager {
    /// Create a new state manager with the given path
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state: Arc::new(RwLock::new(HarvestState::new())),
            auto_save: true,
        }
    }

    /// Create a state manager with auto-save disabled
    pub fn without_auto_save(path: impl AsRef<Path>) -> Self {
        Self {
            auto_save: false,
            ..Self::new(path)
        }
    }

    /// Create an in-memory state manager (no file persistence)
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            state: Arc::new(RwLock::new(HarvestState::new())),
            auto_save: false,
        }
    }

    /// Create a state manager from a file, loading existing state if present
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| Error::state(format!("Failed to read state file: {e}")))?;
            parse(&contents)?
        } else {
            HarvestState::new()
        };

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
            auto_save: true,
        })
    }

    /// Load state from file, replacing the cached state
    pub async fn load(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }

        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::state(format!("Failed to read state file: {e}")))?;
        let loaded = parse(&contents)?;

        *self.state.write().await = loaded;
        Ok(())
    }

    /// Save current state to file
    pub async fn save(&self) -> Result<()> {
        if self.is_in_memory() {
            return Ok(());
        }

        let contents = {
            let state = self.state.read().await;
            serde_json::to_string_pretty(&*state)
                .map_err(|e| Error::state(format!("Failed to serialize state: {e}")))?
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::state(format!("Failed to create state directory: {e}")))?;
        }

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents)
            .await
            .map_err(|e| Error::state(format!("Failed to write state file: {e}")))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::state(format!("Failed to rename state file: {e}")))?;

        debug!(path = %self.path.display(), "checkpoint saved");
        Ok(())
    }

    /// Snapshot of the current state
    pub async fn state(&self) -> HarvestState {
        self.state.read().await.clone()
    }

    /// Snapshot of one endpoint's state
    pub async fn endpoint(&self, endpoint: &str) -> EndpointState {
        self.state
            .read()
            .await
            .get_endpoint(endpoint)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether a target was completed in an earlier flush
    pub async fn is_target_completed(&self, endpoint: &str, target: &str) -> bool {
        self.state.read().await.is_completed(endpoint, target)
    }

    /// Resume cursor for a target
    pub async fn get_cursor(&self, endpoint: &str, target: &str) -> Option<String> {
        self.state
            .read()
            .await
            .get_cursor(endpoint, target)
            .map(String::from)
    }

    /// Set the resume cursor for a target
    pub async fn set_cursor(&self, endpoint: &str, target: &str, cursor: String) -> Result<()> {
        {
            let mut state = self.state.write().await;
            let checkpoint = state.get_endpoint_mut(endpoint).get_target_mut(target);
            checkpoint.cursor = Some(cursor);
            checkpoint.completed = false;
        }
        self.maybe_save().await
    }

    /// Mark targets as completed
    pub async fn mark_completed(&self, endpoint: &str, targets: &[String]) -> Result<()> {
        self.record_flush(endpoint, targets, &[]).await
    }

    /// Record everything one flush made durable, then save once
    ///
    /// `completed` targets lose their cursor; `cursors` carry the position
    /// of targets whose rows were flushed mid-way.
    pub async fn record_flush(
        &self,
        endpoint: &str,
        completed: &[String],
        cursors: &[(String, String)],
    ) -> Result<()> {
        if completed.is_empty() && cursors.is_empty() {
            return Ok(());
        }
        {
            let mut state = self.state.write().await;
            let endpoint_state = state.get_endpoint_mut(endpoint);
            for (target, cursor) in cursors {
                let checkpoint = endpoint_state.get_target_mut(target);
                checkpoint.cursor = Some(cursor.clone());
                checkpoint.completed = false;
            }
            for target in completed {
                endpoint_state.mark_completed(target);
            }
        }
        self.maybe_save().await
    }

    /// Forget all progress for an endpoint
    pub async fn clear_endpoint(&self, endpoint: &str) -> Result<()> {
        self.state.write().await.endpoints.remove(endpoint);
        self.maybe_save().await
    }

    /// Forget all progress
    pub async fn clear(&self) -> Result<()> {
        *self.state.write().await = HarvestState::new();
        self.maybe_save().await
    }

    /// Serialize the current state as JSON
    pub async fn to_json(&self) -> Result<String> {
        let state = self.state.read().await;
        serde_json::to_string_pretty(&*state)
            .map_err(|e| Error::state(format!("Failed to serialize state: {e}")))
    }

    /// Get the state file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if this is an in-memory state manager
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str().is_empty()
    }

    /// Force save (checkpoint)
    pub async fn checkpoint(&self) -> Result<()> {
        self.save().await
    }

    async fn maybe_save(&self) -> Result<()> {
        if self.auto_save {
            self.save().await?;
        }
        Ok(())
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            state: Arc::clone(&self.state),
            auto_save: self.auto_save,
        }
    }
}

fn parse(contents: &str) -> Result<HarvestState> {
    serde_json::from_str(contents).map_err(|e| Error::state(format!("Failed to parse state file: {e}")))
}
