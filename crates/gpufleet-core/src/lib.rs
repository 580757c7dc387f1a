//! gpufleet orchestrator
//!
//! Conflict detection and remediation around a declarative engine, quota
//! advice, apply monitoring with failure classification, zone failover,
//! rollback and dependency-ordered cleanup.
//!
//! Every component takes a [`RunContext`]; provider and engine access go
//! through the typed adapter traits of `gpufleet-cloud` and
//! `gpufleet-engine`.

pub mod classify;
pub mod cleanup;
pub mod conflict;
pub mod context;
pub mod decision;
pub mod deploy;
pub mod error;
pub mod failover;
pub mod monitor;
pub mod quota;
pub mod report;
pub mod rollback;

#[cfg(test)]
mod testing;

pub use classify::{Classification, FailureCategory, FailureClassifier};
pub use cleanup::{CleanupOptions, CleanupOrchestrator, CleanupReport, StageSummary};
pub use conflict::{
    CheckStatus, ConflictCheck, ConflictKind, ConflictScanner, RemediationRecord, ScanReport,
    StrategyOutcome,
};
pub use context::RunContext;
pub use decision::{AutoDecider, Decider, RollbackDecision};
pub use deploy::{DeployOptions, DeployOutcome, DeployPipeline, PreflightReport, QuotaCheck, run_cleanup};
pub use error::{CoreError, Result};
pub use failover::{ZoneFailoverNegotiator, ZoneFailoverRequest};
pub use monitor::{ApplyMonitor, ApplyOutcome, ApplyProgress, NoProgress, ProgressView};
pub use quota::{PricingModel, QuotaAdvisor, QuotaDecision, QuotaIncreaseRequest, QuotaSnapshot};
pub use report::{ReportKind, ReportWriter};
pub use rollback::{RollbackCoordinator, RollbackResult};
