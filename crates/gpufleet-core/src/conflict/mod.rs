//! Pre-flight conflict detection and remediation
//!
//! A [`ConflictProbe`] inspects one scope and reports a [`Conflict`] when a
//! pre-existing resource would collide with the planned run. Each probe
//! carries its [`RemediationChain`]; the [`scanner`] walks it and records
//! the outcome on a [`ConflictCheck`].

pub mod capacity;
pub mod cidr;
pub mod existing;
pub mod orphans;
pub mod scanner;
pub mod strategy;

pub use scanner::{ConflictScanner, ScanReport};
pub use strategy::{Attempt, RemediationChain, RemediationStrategy};

use crate::context::RunContext;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gpufleet_cloud::{CloudResource, ResourceKind};
use gpufleet_config::VarChange;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    CapacityLimit,
    AlreadyExists,
    CidrOverlap,
    OrphanedRole,
    OrphanedRule,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConflictKind::CapacityLimit => "capacity-limit",
            ConflictKind::AlreadyExists => "already-exists",
            ConflictKind::CidrOverlap => "cidr-overlap",
            ConflictKind::OrphanedRole => "orphaned-role",
            ConflictKind::OrphanedRule => "orphaned-rule",
        };
        write!(f, "{}", s)
    }
}

/// What a check looks at: an engine resource type plus a key within it
/// (a name, an address range, or `*`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictScope {
    pub resource_type: String,
    pub key: String,
}

impl ConflictScope {
    pub fn new(resource_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for ConflictScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pending,
    Pass,
    Remediated,
    Blocked,
}

impl CheckStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckStatus::Pass | CheckStatus::Blocked)
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::Pending => write!(f, "pending"),
            CheckStatus::Pass => write!(f, "pass"),
            CheckStatus::Remediated => write!(f, "remediated"),
            CheckStatus::Blocked => write!(f, "blocked"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyOutcome {
    Resolved,
    Partial,
    Failed,
    NotApplicable,
}

impl std::fmt::Display for StrategyOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyOutcome::Resolved => write!(f, "resolved"),
            StrategyOutcome::Partial => write!(f, "partial"),
            StrategyOutcome::Failed => write!(f, "failed"),
            StrategyOutcome::NotApplicable => write!(f, "not-applicable"),
        }
    }
}

/// How much state a strategy changes, least first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destructiveness {
    Reuse,
    Import,
    Rename,
    Delete,
    Manual,
}

/// One strategy attempt as recorded on a check
#[derive(Debug, Clone, Serialize)]
pub struct RemediationRecord {
    pub strategy: String,
    pub destructiveness: Destructiveness,
    pub outcome: StrategyOutcome,
    pub detail: String,
    /// Variable file backup taken before an edit
    pub backup: Option<PathBuf>,
    pub changes: Vec<VarChange>,
    pub at: DateTime<Utc>,
}

/// Outcome of one named check in the battery
#[derive(Debug, Clone, Serialize)]
pub struct ConflictCheck {
    pub name: String,
    pub kind: ConflictKind,
    pub scope: ConflictScope,
    pub status: CheckStatus,
    /// Non-blocking checks never stop provisioning
    pub blocking: bool,
    pub remediation_log: Vec<RemediationRecord>,
    pub manual_report: Option<PathBuf>,
}

impl ConflictCheck {
    pub fn new(name: impl Into<String>, kind: ConflictKind, scope: ConflictScope, blocking: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            scope,
            status: CheckStatus::Pending,
            blocking,
            remediation_log: Vec::new(),
            manual_report: None,
        }
    }

    /// Append an attempt; ignored once the check is terminal
    pub fn record(&mut self, record: RemediationRecord) {
        if self.status.is_terminal() {
            tracing::warn!(
                check = %self.name,
                status = %self.status,
                strategy = %record.strategy,
                "ignoring remediation record on a settled check"
            );
            return;
        }
        self.remediation_log.push(record);
    }

    pub(crate) fn settle(&mut self, status: CheckStatus) {
        if self.status.is_terminal() {
            tracing::warn!(check = %self.name, status = %self.status, "check already settled");
            return;
        }
        self.status = status;
    }

    /// Back to pending when the state a verdict was based on has changed;
    /// the remediation log is kept
    pub(crate) fn reopen(&mut self) {
        self.status = CheckStatus::Pending;
    }

    /// True when some strategy changed external or configured state
    pub fn changed_state(&self) -> bool {
        self.remediation_log.iter().any(|r| {
            matches!(
                r.outcome,
                StrategyOutcome::Resolved | StrategyOutcome::Partial
            )
        })
    }
}

/// An observed collision
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub scope: ConflictScope,
    pub detail: ConflictDetail,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConflictDetail {
    /// Allocation ceiling reached
    Capacity {
        kind: ResourceKind,
        limit: u32,
        used: u32,
        required: u32,
        /// Convention-matching, unassociated, untracked allocations
        candidates: Vec<CloudResource>,
        in_use: Vec<CloudResource>,
    },
    /// A resource with the planned name is already there
    Existing {
        kind: ResourceKind,
        name: String,
        address: String,
        /// Naming prefix the name was built from, when it was
        prefix: Option<String>,
        existing: CloudResource,
    },
    /// Requested ranges overlap existing networks
    Cidr {
        requested: Vec<String>,
        collisions: Vec<CidrCollision>,
    },
    /// Leftovers from earlier runs
    Orphans {
        kind: ResourceKind,
        resources: Vec<CloudResource>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidrCollision {
    pub requested: String,
    pub network_id: String,
    pub existing_cidr: String,
    pub is_default: bool,
}

impl Conflict {
    /// One-line description for logs and reports
    pub fn summary(&self) -> String {
        match &self.detail {
            ConflictDetail::Capacity {
                kind,
                limit,
                used,
                required,
                candidates,
                ..
            } => format!(
                "{kind}: {used} of {limit} used, {required} more required, {} releasable",
                candidates.len()
            ),
            ConflictDetail::Existing {
                kind,
                name,
                existing,
                ..
            } => format!("{kind} '{name}' already exists ({})", existing.id),
            ConflictDetail::Cidr { collisions, .. } => {
                let pairs: Vec<String> = collisions
                    .iter()
                    .map(|c| format!("{} overlaps {} in {}", c.requested, c.existing_cidr, c.network_id))
                    .collect();
                pairs.join("; ")
            }
            ConflictDetail::Orphans { kind, resources } => {
                let names: Vec<&str> = resources.iter().map(|r| r.display_name()).collect();
                format!("{} orphaned {kind}: {}", resources.len(), names.join(", "))
            }
        }
    }
}

/// One check of the battery: how to look, and what to try
#[async_trait]
pub trait ConflictProbe: Send + Sync {
    fn name(&self) -> String;

    fn kind(&self) -> ConflictKind;

    fn scope(&self) -> ConflictScope;

    fn blocking(&self) -> bool {
        true
    }

    /// Current conflict, if any. Called before and after every attempt.
    async fn inspect(&self, ctx: &RunContext) -> Result<Option<Conflict>>;

    fn chain(&self) -> RemediationChain;
}

/// IDs and names of everything the engine already manages
pub(crate) async fn tracked_keys(ctx: &RunContext) -> Result<HashSet<String>> {
    let mut keys = HashSet::new();
    for tracked in ctx.engine.tracked_resources().await? {
        keys.extend(tracked.id);
        keys.extend(tracked.name);
    }
    Ok(keys)
}

pub(crate) fn is_tracked(keys: &HashSet<String>, resource: &CloudResource) -> bool {
    keys.contains(&resource.id) || resource.name.as_ref().is_some_and(|n| keys.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(outcome: StrategyOutcome) -> RemediationRecord {
        RemediationRecord {
            strategy: "test".into(),
            destructiveness: Destructiveness::Reuse,
            outcome,
            detail: String::new(),
            backup: None,
            changes: Vec::new(),
            at: Utc::now(),
        }
    }

    #[test]
    fn test_destructiveness_order() {
        assert!(Destructiveness::Reuse < Destructiveness::Import);
        assert!(Destructiveness::Import < Destructiveness::Rename);
        assert!(Destructiveness::Rename < Destructiveness::Delete);
        assert!(Destructiveness::Delete < Destructiveness::Manual);
    }

    #[test]
    fn test_terminal_check_ignores_records() {
        let mut check = ConflictCheck::new(
            "eip-capacity",
            ConflictKind::CapacityLimit,
            ConflictScope::new("aws_eip", "*"),
            true,
        );
        check.record(record(StrategyOutcome::Failed));
        check.settle(CheckStatus::Blocked);
        check.record(record(StrategyOutcome::Resolved));
        check.settle(CheckStatus::Pass);

        assert_eq!(check.status, CheckStatus::Blocked);
        assert_eq!(check.remediation_log.len(), 1);
        assert!(!check.changed_state());
    }

    #[test]
    fn test_remediated_is_not_terminal() {
        let mut check = ConflictCheck::new(
            "name",
            ConflictKind::AlreadyExists,
            ConflictScope::new("aws_iam_role", "gpu-dev-node"),
            true,
        );
        check.record(record(StrategyOutcome::Resolved));
        check.settle(CheckStatus::Remediated);
        check.settle(CheckStatus::Pass);
        assert_eq!(check.status, CheckStatus::Pass);
        assert!(check.changed_state());
    }
}
