//! Remediation strategy contract and ordered chains

use super::{Conflict, Destructiveness, RemediationRecord, StrategyOutcome};
use crate::context::RunContext;
use crate::error::Result;
use crate::report::{ManualOption, ManualRemediationReport, ReportKind};
use async_trait::async_trait;
use chrono::Utc;
use gpufleet_config::SavedEdit;
use std::path::PathBuf;

/// What one attempt did
#[derive(Debug, Clone)]
pub struct Attempt {
    pub outcome: StrategyOutcome,
    pub detail: String,
    /// Manual remediation report written by a terminal strategy
    pub report: Option<PathBuf>,
    /// Variable file edit persisted by the attempt
    pub edit: Option<SavedEdit>,
}

impl Attempt {
    fn with_outcome(outcome: StrategyOutcome, detail: impl Into<String>) -> Self {
        Self {
            outcome,
            detail: detail.into(),
            report: None,
            edit: None,
        }
    }

    pub fn resolved(detail: impl Into<String>) -> Self {
        Self::with_outcome(StrategyOutcome::Resolved, detail)
    }

    pub fn partial(detail: impl Into<String>) -> Self {
        Self::with_outcome(StrategyOutcome::Partial, detail)
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self::with_outcome(StrategyOutcome::Failed, detail)
    }

    pub fn not_applicable(detail: impl Into<String>) -> Self {
        Self::with_outcome(StrategyOutcome::NotApplicable, detail)
    }

    pub fn with_report(mut self, path: PathBuf) -> Self {
        self.report = Some(path);
        self
    }

    pub fn with_edit(mut self, edit: SavedEdit) -> Self {
        self.edit = Some(edit);
        self
    }

    pub(crate) fn into_record(
        self,
        strategy: &str,
        destructiveness: Destructiveness,
    ) -> (RemediationRecord, Option<PathBuf>) {
        let (backup, changes) = match self.edit {
            Some(edit) => (edit.backup, edit.changes),
            None => (None, Vec::new()),
        };
        let record = RemediationRecord {
            strategy: strategy.to_string(),
            destructiveness,
            outcome: self.outcome,
            detail: self.detail,
            backup,
            changes,
            at: Utc::now(),
        };
        (record, self.report)
    }
}

/// One idempotent way of resolving a conflict
#[async_trait]
pub trait RemediationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn destructiveness(&self) -> Destructiveness;

    /// Cheap applicability test on the observed conflict
    fn applies(&self, conflict: &Conflict) -> bool;

    async fn attempt(&self, ctx: &RunContext, conflict: &Conflict) -> Result<Attempt>;
}

/// Strategies for one conflict kind, least destructive first
pub struct RemediationChain {
    strategies: Vec<Box<dyn RemediationStrategy>>,
}

impl RemediationChain {
    /// Stable sort: equal destructiveness keeps declaration order
    pub fn new(mut strategies: Vec<Box<dyn RemediationStrategy>>) -> Self {
        strategies.sort_by_key(|s| s.destructiveness());
        Self { strategies }
    }

    pub fn strategies(&self) -> &[Box<dyn RemediationStrategy>] {
        &self.strategies
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// Terminal step of every chain: write the options an operator has left
pub(crate) async fn write_manual_report(
    ctx: &RunContext,
    conflict: &Conflict,
    options: Vec<ManualOption>,
) -> Result<Attempt> {
    let report = ManualRemediationReport {
        project: ctx.project().to_string(),
        environment: ctx.environment().to_string(),
        check: format!("{} {}", conflict.kind, conflict.scope),
        summary: conflict.summary(),
        options,
        generated_at: Utc::now(),
    };
    let slug = format!("{}-{}", conflict.kind, conflict.scope.key);
    let path = ctx
        .reports
        .write(ReportKind::ManualRemediation, &slug, &report)
        .await?;

    Ok(Attempt::failed("manual remediation required").with_report(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::capacity::{ReleaseUnusedAllocations, ReportCapacityUsage};
    use crate::conflict::existing::{ImportExisting, RenameWithSuffix, ReportExistingResource};

    #[test]
    fn test_chain_sorted_least_destructive_first() {
        let chain = RemediationChain::new(vec![
            Box::new(ReportExistingResource),
            Box::new(RenameWithSuffix),
            Box::new(ImportExisting),
        ]);
        assert_eq!(
            chain.names(),
            vec!["import-existing", "rename-with-suffix", "report-existing-resource"]
        );

        let chain = RemediationChain::new(vec![
            Box::new(ReportCapacityUsage),
            Box::new(ReleaseUnusedAllocations),
        ]);
        assert_eq!(
            chain.names(),
            vec!["release-unused-allocations", "report-capacity-usage"]
        );
    }
}
