//! Plan summary and tracked-state parsing
//!
//! Both come from `terraform show -json`: with a plan file it describes
//! pending changes, without one it describes the current state.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Planned change for one resource address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannedAction {
    Create,
    Update,
    Replace,
    Destroy,
    NoOp,
}

impl PlannedAction {
    fn from_actions(actions: &[String]) -> Self {
        let has = |a: &str| actions.iter().any(|x| x == a);
        match (has("create"), has("delete"), has("update")) {
            (true, true, _) => PlannedAction::Replace,
            (true, false, _) => PlannedAction::Create,
            (false, true, _) => PlannedAction::Destroy,
            (false, false, true) => PlannedAction::Update,
            _ => PlannedAction::NoOp,
        }
    }
}

/// One resource the plan touches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedResource {
    /// Engine address (e.g. `module.net.aws_vpc.main`)
    pub address: String,

    /// Engine resource type (e.g. `aws_vpc`)
    pub resource_type: String,

    /// Provider-side name the resource will carry, when known before apply
    pub name: Option<String>,

    pub action: PlannedAction,
}

/// Counts of pending changes, recomputed on every planning pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub to_create: usize,
    pub to_update: usize,
    pub to_replace: usize,
    pub to_destroy: usize,
    pub resources: Vec<PlannedResource>,
}

impl PlanSummary {
    pub fn has_changes(&self) -> bool {
        self.to_create + self.to_update + self.to_replace + self.to_destroy > 0
    }

    /// Resources the apply will create (replacements included)
    pub fn total_creations(&self) -> usize {
        self.to_create + self.to_replace
    }

    /// Create-only entries, for collision checks
    pub fn creations(&self) -> impl Iterator<Item = &PlannedResource> {
        self.resources
            .iter()
            .filter(|r| r.action == PlannedAction::Create)
    }

    /// Parse the output of `terraform show -json <planfile>`
    pub fn from_show_json(json: &str) -> Result<Self> {
        let doc: ShowPlan = serde_json::from_str(json)?;
        let mut summary = PlanSummary::default();

        for change in doc.resource_changes {
            if change.mode.as_deref() == Some("data") {
                continue;
            }

            let action = PlannedAction::from_actions(&change.change.actions);
            match action {
                PlannedAction::Create => summary.to_create += 1,
                PlannedAction::Update => summary.to_update += 1,
                PlannedAction::Replace => summary.to_replace += 1,
                PlannedAction::Destroy => summary.to_destroy += 1,
                PlannedAction::NoOp => continue,
            }

            summary.resources.push(PlannedResource {
                name: change.change.after.as_ref().and_then(resource_name),
                address: change.address,
                resource_type: change.resource_type,
                action,
            });
        }

        Ok(summary)
    }
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to replace, {} to destroy",
            self.to_create, self.to_update, self.to_replace, self.to_destroy
        )
    }
}

/// A resource currently tracked in the engine's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedResource {
    pub address: String,
    pub resource_type: String,
    pub id: Option<String>,
    pub name: Option<String>,
}

/// Parse the output of `terraform show -json` (no plan file)
pub fn tracked_from_show_json(json: &str) -> Result<Vec<TrackedResource>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }

    let doc: ShowState = serde_json::from_str(json)?;
    let mut tracked = Vec::new();
    if let Some(values) = doc.values {
        collect_module(&values.root_module, &mut tracked);
    }
    Ok(tracked)
}

fn collect_module(module: &StateModule, out: &mut Vec<TrackedResource>) {
    for resource in &module.resources {
        if resource.mode.as_deref() == Some("data") {
            continue;
        }
        out.push(TrackedResource {
            address: resource.address.clone(),
            resource_type: resource.resource_type.clone(),
            id: resource
                .values
                .get("id")
                .and_then(|v| v.as_str())
                .map(String::from),
            name: resource_name(&resource.values),
        });
    }
    for child in &module.child_modules {
        collect_module(child, out);
    }
}

/// Provider-side name from a resource's attribute object
fn resource_name(values: &serde_json::Value) -> Option<String> {
    ["name", "key_name", "function_name", "identifier"]
        .iter()
        .find_map(|k| values.get(k).and_then(|v| v.as_str()))
        .or_else(|| {
            values
                .get("tags")
                .and_then(|t| t.get("Name"))
                .and_then(|v| v.as_str())
        })
        .map(String::from)
}

/// Reject output that is clearly not a plan document
pub(crate) fn ensure_plan_document(json: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    if value.get("format_version").is_none() {
        return Err(EngineError::InvalidPlan(
            "missing format_version in show output".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ShowPlan {
    #[serde(default)]
    resource_changes: Vec<ResourceChange>,
}

#[derive(Debug, Deserialize)]
struct ResourceChange {
    address: String,
    mode: Option<String>,
    #[serde(rename = "type")]
    resource_type: String,
    change: Change,
}

#[derive(Debug, Deserialize)]
struct Change {
    #[serde(default)]
    actions: Vec<String>,
    after: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ShowState {
    values: Option<StateValues>,
}

#[derive(Debug, Deserialize)]
struct StateValues {
    root_module: StateModule,
}

#[derive(Debug, Deserialize)]
struct StateModule {
    #[serde(default)]
    resources: Vec<StateResource>,
    #[serde(default)]
    child_modules: Vec<StateModule>,
}

#[derive(Debug, Deserialize)]
struct StateResource {
    address: String,
    mode: Option<String>,
    #[serde(rename = "type")]
    resource_type: String,
    #[serde(default)]
    values: serde_json::Value,
}
