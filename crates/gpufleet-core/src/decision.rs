//! Operator decision points
//!
//! Rollback, zone selection and destructive cleanup all stop here. The CLI
//! supplies an interactive implementation; [`AutoDecider`] answers from
//! flags given up front.

use crate::classify::Classification;
use crate::failover::ZoneFailoverRequest;
use serde::{Deserialize, Serialize};

/// Answer to the post-failure decision point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackDecision {
    /// Tear down through the engine's destroy
    Rollback,
    /// Persist the partial/failed state and stop
    KeepPartial,
}

pub trait Decider: Send + Sync {
    /// Yes/no confirmation before a destructive step
    fn confirm(&self, prompt: &str) -> bool;

    /// Offered after every failed or partial apply
    fn rollback_decision(&self, failure: &Classification, created: usize) -> RollbackDecision;

    /// Pick one of the candidate zones, or decline with `None`
    fn select_zone(&self, request: &ZoneFailoverRequest) -> Option<String>;
}

/// Non-interactive decider driven by command-line flags
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoDecider {
    /// `--yes`: confirm prompts, accept the first candidate zone, roll back
    pub assume_yes: bool,
    /// `--keep-partial`: answer the rollback decision with keep
    pub keep_partial: bool,
}

impl AutoDecider {
    pub fn new(assume_yes: bool, keep_partial: bool) -> Self {
        Self {
            assume_yes,
            keep_partial,
        }
    }
}

impl Decider for AutoDecider {
    fn confirm(&self, _prompt: &str) -> bool {
        self.assume_yes
    }

    fn rollback_decision(&self, _failure: &Classification, _created: usize) -> RollbackDecision {
        if self.assume_yes && !self.keep_partial {
            RollbackDecision::Rollback
        } else {
            RollbackDecision::KeepPartial
        }
    }

    fn select_zone(&self, request: &ZoneFailoverRequest) -> Option<String> {
        if self.assume_yes {
            request.candidate_zones.first().cloned()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Classification, FailureCategory};

    #[test]
    fn test_auto_decider_defaults_to_keeping_state() {
        let failure = Classification::unclassified("boom");
        assert_eq!(
            AutoDecider::default().rollback_decision(&failure, 3),
            RollbackDecision::KeepPartial
        );
        assert_eq!(
            AutoDecider::new(true, false).rollback_decision(&failure, 3),
            RollbackDecision::Rollback
        );
        assert_eq!(
            AutoDecider::new(true, true).rollback_decision(&failure, 3),
            RollbackDecision::KeepPartial
        );
        assert_eq!(failure.category, FailureCategory::UnclassifiedEngineError);
    }

    #[test]
    fn test_auto_decider_zone_selection() {
        let request = ZoneFailoverRequest {
            failed_zone: Some("us-east-1a".into()),
            candidate_zones: vec!["us-east-1b".into(), "us-east-1c".into()],
            selected_zone: None,
        };
        assert_eq!(
            AutoDecider::new(true, false).select_zone(&request).as_deref(),
            Some("us-east-1b")
        );
        assert_eq!(AutoDecider::default().select_zone(&request), None);
    }
}
