//! State types for tracking harvest progress
//!
//! These types are serialized to JSON and persisted between runs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Complete checkpoint of a harvest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestState {
    /// Per-endpoint state
    #[serde(default)]
    pub endpoints: HashMap<String, EndpointState>,
}

impl HarvestState {
    /// Create a new empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get state for an endpoint
    pub fn get_endpoint(&self, endpoint: &str) -> Option<&EndpointState> {
        self.endpoints.get(endpoint)
    }

    /// Get mutable state for an endpoint, creating if needed
    pub fn get_endpoint_mut(&mut self, endpoint: &str) -> &mut EndpointState {
        self.endpoints.entry(endpoint.to_string()).or_default()
    }

    /// Resume cursor for a target
    pub fn get_cursor(&self, endpoint: &str, target: &str) -> Option<&str> {
        self.get_endpoint(endpoint)?.get_target(target)?.cursor.as_deref()
    }

    /// Whether a target has been fully harvested and flushed
    pub fn is_completed(&self, endpoint: &str, target: &str) -> bool {
        self.get_endpoint(endpoint)
            .is_some_and(|e| e.is_completed(target))
    }
}

/// State for a single endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointState {
    /// Per-target checkpoints, keyed by canonical target identifier
    #[serde(default)]
    pub targets: HashMap<String, TargetCheckpoint>,
}

impl EndpointState {
    /// Create a new empty endpoint state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a target checkpoint
    pub fn get_target(&self, target: &str) -> Option<&TargetCheckpoint> {
        self.targets.get(target)
    }

    /// Get mutable target checkpoint, creating if needed
    pub fn get_target_mut(&mut self, target: &str) -> &mut TargetCheckpoint {
        self.targets.entry(target.to_string()).or_default()
    }

    /// Check if a target is completed
    pub fn is_completed(&self, target: &str) -> bool {
        self.targets.get(target).is_some_and(|t| t.completed)
    }

    /// Mark a target as completed; its resume cursor is no longer needed
    pub fn mark_completed(&mut self, target: &str) {
        *self.get_target_mut(target) = TargetCheckpoint::completed();
    }

    /// Number of completed targets
    pub fn completed_count(&self) -> usize {
        self.targets.values().filter(|t| t.completed).count()
    }
}

/// Checkpoint for a single target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCheckpoint {
    /// Cursor to resume after the last flushed page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,

    /// Whether every page of this target has been flushed
    #[serde(default)]
    pub completed: bool,
}

impl TargetCheckpoint {
    /// Create a new empty checkpoint
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a completed checkpoint
    pub fn completed() -> Self {
        Self {
            cursor: None,
            completed: true,
        }
    }
}
