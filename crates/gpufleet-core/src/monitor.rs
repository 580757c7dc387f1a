//! Apply progress monitor
//!
//! A state machine over the engine's apply output, one line at a time:
//!
//! ```text
//! Idle ──Creating──▶ ResourceCreating ──Still creating──▶ ResourceStillCreating
//!   ▲                     │                                      │
//!   └──── ResourceCreated ◀──────── Creation complete ───────────┘
//!
//! any ──Apply complete!──▶ Complete        any ──Error:──▶ Failed
//! ```
//!
//! Success is decided only by the completion marker. A stream that ends
//! with neither marker is an unexpected termination, which is a failure.

use crate::error::Result;
use gpufleet_engine::{PlanSummary, StreamExit};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Textual markers in `terraform apply -no-color` output
pub mod markers {
    pub const CREATING: &str = r"^(?P<addr>[^\s:]+): Creating\.\.\.";
    pub const STILL_CREATING: &str =
        r"^(?P<addr>[^\s:]+): Still creating\.\.\. \[(?P<elapsed>[^\]]+?) elapsed\]";
    pub const CREATION_COMPLETE: &str =
        r"^(?P<addr>[^\s:]+): Creation complete after (?P<elapsed>\S+)";
    pub const APPLY_COMPLETE: &str = r"^Apply complete!";
    pub const DESTROY_COMPLETE: &str = r"^Destroy complete!";
    pub const ERROR: &str = r"^(?:│\s*)?Error: ";
    /// Box-drawing frame around error blocks
    pub const BLOCK_OPEN: &str = "╷";
    pub const BLOCK_CLOSE: &str = "╵";
}

/// Lifecycle of the resource currently being worked on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Creating,
    StillCreating { elapsed: String },
    Created,
}

/// Monitor state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    ResourceCreating(String),
    ResourceStillCreating { name: String, elapsed: String },
    ResourceCreated(String),
    Complete,
    Failed,
}

/// Progress of one apply run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyProgress {
    pub total_resources: usize,
    pub created_count: usize,
    pub current_resource_name: Option<String>,
    pub current_resource_status: Option<ResourceStatus>,
}

impl ApplyProgress {
    pub fn new(total_resources: usize) -> Self {
        Self {
            total_resources,
            ..Default::default()
        }
    }

    /// `created / total` as a percentage, clamped to 100; 0 when total is 0
    pub fn raw_percent(&self) -> u8 {
        if self.total_resources == 0 {
            return 0;
        }
        let pct = self.created_count.saturating_mul(100) / self.total_resources;
        pct.min(100) as u8
    }
}

/// How the stream ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Completion marker seen, no error marker
    Completed,
    /// An error block was captured
    ErrorMarker,
    /// Neither marker appeared
    Unexpected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub termination: Termination,
    pub progress: ApplyProgress,
    pub percent: u8,
    /// Captured error block (or a synthetic message for unexpected ends)
    pub error_text: Option<String>,
    pub exit_code: Option<i32>,
}

impl ApplyOutcome {
    pub fn is_success(&self) -> bool {
        self.termination == Termination::Completed
    }
}

/// Receives monitor updates (the CLI renders a progress bar)
pub trait ProgressView: Send {
    fn start(&mut self, total: usize);
    fn update(&mut self, progress: &ApplyProgress, percent: u8);
    fn finish(&mut self, outcome: &ApplyOutcome);
}

/// View that renders nothing
pub struct NoProgress;

impl ProgressView for NoProgress {
    fn start(&mut self, _total: usize) {}
    fn update(&mut self, _progress: &ApplyProgress, _percent: u8) {}
    fn finish(&mut self, _outcome: &ApplyOutcome) {}
}

pub struct ApplyMonitor {
    creating: Regex,
    still_creating: Regex,
    creation_complete: Regex,
    apply_complete: Regex,
    error: Regex,
    state: MonitorState,
    progress: ApplyProgress,
    percent: u8,
    completed: bool,
    capturing_error: bool,
    error_lines: Vec<String>,
}

impl ApplyMonitor {
    pub fn new(total_resources: usize) -> Result<Self> {
        Ok(Self {
            creating: Regex::new(markers::CREATING)?,
            still_creating: Regex::new(markers::STILL_CREATING)?,
            creation_complete: Regex::new(markers::CREATION_COMPLETE)?,
            apply_complete: Regex::new(markers::APPLY_COMPLETE)?,
            error: Regex::new(markers::ERROR)?,
            state: MonitorState::Idle,
            progress: ApplyProgress::new(total_resources),
            percent: 0,
            completed: false,
            capturing_error: false,
            error_lines: Vec::new(),
        })
    }

    /// Total from the plan summary, or the fallback when no plan was read
    pub fn for_plan(plan: Option<&PlanSummary>, fallback_total: usize) -> Result<Self> {
        let total = match plan {
            Some(summary) => summary.total_creations(),
            None => fallback_total,
        };
        Self::new(total)
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn progress(&self) -> &ApplyProgress {
        &self.progress
    }

    /// Running maximum of the raw percentage
    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Feed one output line; returns true when progress changed
    pub fn consume(&mut self, line: &str) -> bool {
        let line = line.trim_end();

        if self.capturing_error {
            if line.starts_with(markers::BLOCK_CLOSE) {
                self.capturing_error = false;
            } else {
                let content = line.trim_start_matches('│').trim();
                self.error_lines.push(content.to_string());
            }
            return false;
        }

        if self.error.is_match(line) {
            self.capturing_error = true;
            self.state = MonitorState::Failed;
            self.error_lines
                .push(line.trim_start_matches('│').trim().to_string());
            return false;
        }

        if line.starts_with(markers::BLOCK_OPEN) {
            return false;
        }

        if self.apply_complete.is_match(line) {
            self.completed = true;
            if self.state != MonitorState::Failed {
                self.state = MonitorState::Complete;
            }
            self.progress.current_resource_name = None;
            self.progress.current_resource_status = None;
            return true;
        }

        if let Some(caps) = self.creation_complete.captures(line) {
            let name = caps["addr"].to_string();
            self.progress.created_count += 1;
            self.progress.current_resource_name = Some(name.clone());
            self.progress.current_resource_status = Some(ResourceStatus::Created);
            self.state = MonitorState::ResourceCreated(name);
            self.bump_percent();
            return true;
        }

        if let Some(caps) = self.still_creating.captures(line) {
            let name = caps["addr"].to_string();
            let elapsed = caps["elapsed"].to_string();
            self.progress.current_resource_name = Some(name.clone());
            self.progress.current_resource_status = Some(ResourceStatus::StillCreating {
                elapsed: elapsed.clone(),
            });
            self.state = MonitorState::ResourceStillCreating { name, elapsed };
            return true;
        }

        if let Some(caps) = self.creating.captures(line) {
            let name = caps["addr"].to_string();
            self.progress.current_resource_name = Some(name.clone());
            self.progress.current_resource_status = Some(ResourceStatus::Creating);
            self.state = MonitorState::ResourceCreating(name);
            return true;
        }

        false
    }

    fn bump_percent(&mut self) {
        self.percent = self.percent.max(self.progress.raw_percent());
    }

    /// Close the run once the stream has ended
    pub fn finish(self, exit: StreamExit) -> ApplyOutcome {
        let has_error = !self.error_lines.is_empty();
        let termination = if has_error {
            Termination::ErrorMarker
        } else if self.completed {
            Termination::Completed
        } else {
            Termination::Unexpected
        };

        let error_text = match termination {
            Termination::Completed => None,
            Termination::ErrorMarker => Some(self.error_lines.join("\n").trim().to_string()),
            Termination::Unexpected => Some(format!(
                "apply output ended without a completion marker (exit code {})",
                exit.code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "unknown".to_string())
            )),
        };

        if termination == Termination::Completed && !exit.success {
            tracing::warn!(code = ?exit.code, "completion marker seen but engine exited non-zero");
        }

        ApplyOutcome {
            termination,
            percent: self.percent,
            progress: self.progress,
            error_text,
            exit_code: exit.code,
        }
    }
}
