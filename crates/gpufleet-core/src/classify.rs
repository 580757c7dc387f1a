//! Failure classification
//!
//! Captured error text is matched against [`CLASSIFICATION_TABLE`] in
//! order; the first hit wins. Unmatched text falls back to
//! [`FailureCategory::UnclassifiedEngineError`] with the message kept
//! verbatim.

use crate::error::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Canonical failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    CapacityLimitExceeded,
    ResourceAlreadyExists,
    NetworkRangeConflict,
    InsufficientInstanceCapacity,
    AccessDenied,
    DependencyViolation,
    InvalidParameter,
    UnclassifiedEngineError,
}

impl FailureCategory {
    pub const ALL: [FailureCategory; 8] = [
        FailureCategory::CapacityLimitExceeded,
        FailureCategory::ResourceAlreadyExists,
        FailureCategory::NetworkRangeConflict,
        FailureCategory::InsufficientInstanceCapacity,
        FailureCategory::AccessDenied,
        FailureCategory::DependencyViolation,
        FailureCategory::InvalidParameter,
        FailureCategory::UnclassifiedEngineError,
    ];

    pub fn hint(&self) -> &'static str {
        match self {
            FailureCategory::CapacityLimitExceeded => {
                "An account limit was reached. Release unused allocations or request a quota increase, then run `gpufleet preflight`."
            }
            FailureCategory::ResourceAlreadyExists => {
                "A resource with the same name already exists. Run `gpufleet preflight` to import or rename it."
            }
            FailureCategory::NetworkRangeConflict => {
                "The requested address ranges collide with existing networks. Run `gpufleet preflight` to pick free ranges."
            }
            FailureCategory::InsufficientInstanceCapacity => {
                "The zone has no capacity for this instance type right now. Retry in another zone or later."
            }
            FailureCategory::AccessDenied => {
                "The credentials lack permissions. See the missing-permissions report for the denied actions."
            }
            FailureCategory::DependencyViolation => {
                "A resource is still referenced by another. Run `gpufleet cleanup --dry-run` to inspect what is left."
            }
            FailureCategory::InvalidParameter => {
                "A parameter was rejected by the provider. Check the variable file values named in the error."
            }
            FailureCategory::UnclassifiedEngineError => {
                "The engine failed for an unrecognised reason. The raw message is shown above."
            }
        }
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureCategory::CapacityLimitExceeded => "capacity-limit-exceeded",
            FailureCategory::ResourceAlreadyExists => "resource-already-exists",
            FailureCategory::NetworkRangeConflict => "network-range-conflict",
            FailureCategory::InsufficientInstanceCapacity => "insufficient-instance-capacity",
            FailureCategory::AccessDenied => "access-denied",
            FailureCategory::DependencyViolation => "dependency-violation",
            FailureCategory::InvalidParameter => "invalid-parameter",
            FailureCategory::UnclassifiedEngineError => "unclassified-engine-error",
        };
        write!(f, "{}", s)
    }
}

/// Ordered lookup table: pattern → category. Order matters.
pub const CLASSIFICATION_TABLE: &[(&str, FailureCategory)] = &[
    (
        r"(?i)AddressLimitExceeded|VpcLimitExceeded|VcpuLimitExceeded|MaxSpotInstanceCountExceeded|LimitExceeded|limit exceeded|exceeded your quota",
        FailureCategory::CapacityLimitExceeded,
    ),
    (
        r"(?i)AlreadyExists|already exists|Duplicate",
        FailureCategory::ResourceAlreadyExists,
    ),
    (
        r"(?i)InvalidVpc\.Range|InvalidSubnet\.Range|InvalidSubnet\.Conflict|conflicts with another subnet|CIDR.*overlap|overlapping",
        FailureCategory::NetworkRangeConflict,
    ),
    (
        r"(?i)AccessDenied|UnauthorizedOperation|not authorized to perform|AuthFailure",
        FailureCategory::AccessDenied,
    ),
    (
        r"(?i)InsufficientInstanceCapacity|InsufficientCapacity|do not have sufficient .* capacity|not supported in your requested Availability Zone",
        FailureCategory::InsufficientInstanceCapacity,
    ),
    (
        r"(?i)DependencyViolation|has a dependent object|has dependencies|DeleteConflict|ResourceInUse",
        FailureCategory::DependencyViolation,
    ),
    (
        r"(?i)InvalidParameter|InvalidAMIID|ValidationError|Invalid value",
        FailureCategory::InvalidParameter,
    ),
];

/// Result of classifying one failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: FailureCategory,
    pub hint: String,
    /// The captured error text, unmodified
    pub raw: String,
}

impl Classification {
    pub fn new(category: FailureCategory, raw: impl Into<String>) -> Self {
        Self {
            category,
            hint: category.hint().to_string(),
            raw: raw.into(),
        }
    }

    pub fn unclassified(raw: impl Into<String>) -> Self {
        Self::new(FailureCategory::UnclassifiedEngineError, raw)
    }
}

/// Compiled [`CLASSIFICATION_TABLE`]
pub struct FailureClassifier {
    table: Vec<(Regex, FailureCategory)>,
    denied_action: Regex,
}

impl FailureClassifier {
    pub fn new() -> Result<Self> {
        let mut table = Vec::with_capacity(CLASSIFICATION_TABLE.len());
        for (pattern, category) in CLASSIFICATION_TABLE {
            table.push((Regex::new(pattern)?, *category));
        }
        Ok(Self {
            table,
            denied_action: Regex::new(
                r"not authorized to perform:?\s+(?P<action>[A-Za-z0-9-]+:[A-Za-z0-9*]+)",
            )?,
        })
    }

    pub fn classify(&self, text: &str) -> Classification {
        let category = self
            .table
            .iter()
            .find(|(re, _)| re.is_match(text))
            .map(|(_, category)| *category)
            .unwrap_or(FailureCategory::UnclassifiedEngineError);

        tracing::debug!(category = %category, "classified failure");
        Classification::new(category, text)
    }

    /// IAM actions named in access-denied messages, deduplicated in order
    pub fn denied_actions(&self, text: &str) -> Vec<String> {
        let mut actions: Vec<String> = Vec::new();
        for caps in self.denied_action.captures_iter(text) {
            let action = caps["action"].to_string();
            if !actions.contains(&action) {
                actions.push(action);
            }
        }
        actions
    }
}
