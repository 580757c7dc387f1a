//! Action log for mutating operations (cleanup, housekeeping)

use crate::resource::ResourceKind;
use serde::{Deserialize, Serialize};

/// Type of action performed against a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Delete or terminate
    Delete,
    /// Release an address allocation
    Release,
    /// Remove an association
    Detach,
    /// Wait for a provider-side operation to finish
    Wait,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Delete => write!(f, "delete"),
            ActionType::Release => write!(f, "release"),
            ActionType::Detach => write!(f, "detach"),
            ActionType::Wait => write!(f, "wait"),
        }
    }
}

/// Result of a single action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_type: ActionType,

    pub kind: ResourceKind,

    pub resource_id: String,

    /// Success message, or the intended action in dry-run mode
    pub message: String,

    /// Error message if failed
    pub error: Option<String>,
}

/// Results of a batch of actions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionLog {
    /// Successfully applied actions
    pub succeeded: Vec<ActionResult>,

    /// Failed actions
    pub failed: Vec<ActionResult>,

    /// Actions that were only reported (dry run) or found nothing to do
    pub skipped: Vec<ActionResult>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Nothing was deleted and nothing failed
    pub fn is_noop(&self) -> bool {
        self.succeeded.is_empty() && self.failed.is_empty()
    }

    pub fn add_success(
        &mut self,
        action_type: ActionType,
        kind: ResourceKind,
        resource_id: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.succeeded.push(ActionResult {
            action_type,
            kind,
            resource_id: resource_id.into(),
            message: message.into(),
            error: None,
        });
    }

    pub fn add_failure(
        &mut self,
        action_type: ActionType,
        kind: ResourceKind,
        resource_id: impl Into<String>,
        error: impl Into<String>,
    ) {
        self.failed.push(ActionResult {
            action_type,
            kind,
            resource_id: resource_id.into(),
            message: String::new(),
            error: Some(error.into()),
        });
    }

    pub fn add_skipped(
        &mut self,
        action_type: ActionType,
        kind: ResourceKind,
        resource_id: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.skipped.push(ActionResult {
            action_type,
            kind,
            resource_id: resource_id.into(),
            message: message.into(),
            error: None,
        });
    }

    /// Append another log
    pub fn merge(&mut self, other: ActionLog) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
        self.skipped.extend(other.skipped);
        self.duration_ms += other.duration_ms;
    }
}

impl std::fmt::Display for ActionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed, {} skipped",
            self.succeeded.len(),
            self.failed.len(),
            self.skipped.len()
        )
    }
}
