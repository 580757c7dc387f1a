//! Decision point after a failed or partial apply
//!
//! Nothing is torn down automatically. The operator (through the
//! [`Decider`](crate::decision::Decider)) picks rollback or keep; rollback
//! runs the engine's destroy and only a completion marker plus a clean
//! exit counts as rolled back.

use crate::classify::Classification;
use crate::context::RunContext;
use crate::decision::RollbackDecision;
use crate::error::{CoreError, Result};
use crate::monitor::{ApplyOutcome, markers};
use crate::report::{ManualOption, ManualRemediationReport, ReportKind};
use chrono::Utc;
use gpufleet_cloud::DeploymentState;
use regex::Regex;
use std::path::PathBuf;

/// What happened at the decision point
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackResult {
    RolledBack,
    RollbackFailed {
        error: String,
        report: PathBuf,
    },
    /// Rollback declined; the state that was persisted
    Kept(DeploymentState),
}

impl RollbackResult {
    pub fn final_state(&self) -> DeploymentState {
        match self {
            RollbackResult::RolledBack => DeploymentState::RolledBack,
            RollbackResult::RollbackFailed { .. } => DeploymentState::RollbackFailed,
            RollbackResult::Kept(state) => *state,
        }
    }
}

pub struct RollbackCoordinator<'a> {
    ctx: &'a RunContext,
}

impl<'a> RollbackCoordinator<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx }
    }

    /// Persist the failure, then ask whether to tear down
    pub async fn after_failure(
        &self,
        failure: &Classification,
        outcome: &ApplyOutcome,
    ) -> Result<RollbackResult> {
        let created = outcome.progress.created_count;
        let state = if created > 0 {
            DeploymentState::PartialDeploy
        } else {
            DeploymentState::Failed
        };
        self.ctx
            .transition(state, Some(format!("{}: {}", failure.category, first_line(&failure.raw))))
            .await?;

        match self.ctx.decider.rollback_decision(failure, created) {
            RollbackDecision::KeepPartial => {
                tracing::info!(state = %state, created, "keeping partial resources");
                Ok(RollbackResult::Kept(state))
            }
            RollbackDecision::Rollback => self.roll_back().await,
        }
    }

    /// Operator-requested rollback of the current deployment
    pub async fn request(&self) -> Result<RollbackResult> {
        let current = self.ctx.current_state().await?;
        if !current.can_roll_back() {
            return Err(CoreError::NotRollbackable(current));
        }
        let prompt = format!(
            "Destroy everything {} tracks for {}/{}?",
            self.ctx.engine.name(),
            self.ctx.project(),
            self.ctx.environment()
        );
        if !self.ctx.decider.confirm(&prompt) {
            tracing::info!("rollback declined");
            return Ok(RollbackResult::Kept(current));
        }
        self.roll_back().await
    }

    async fn roll_back(&self) -> Result<RollbackResult> {
        let complete = Regex::new(markers::DESTROY_COMPLETE)?;
        let error = Regex::new(markers::ERROR)?;

        tracing::info!(engine = self.ctx.engine.name(), "rolling back");
        let mut lines: Vec<String> = Vec::new();
        let exit = {
            let mut sink = |line: &str| {
                tracing::debug!(target: "engine", "{}", line);
                lines.push(line.trim_end().to_string());
            };
            self.ctx.engine.destroy(&mut sink).await
        };

        let completed = lines.iter().any(|l| complete.is_match(l));
        let failure = match exit {
            Ok(exit) if exit.success && completed => None,
            Ok(exit) => Some(error_text(&lines, &error).unwrap_or_else(|| {
                format!("destroy ended without a completion marker (exit code {:?})", exit.code)
            })),
            Err(e) => Some(e.to_string()),
        };

        let Some(message) = failure else {
            self.ctx.transition(DeploymentState::RolledBack, None).await?;
            return Ok(RollbackResult::RolledBack);
        };

        tracing::error!(error = %message, "rollback failed");
        if let Err(e) = self.ctx.engine.clear_plan().await {
            tracing::warn!(error = %e, "could not remove the saved plan");
        }
        let report = self.write_report(&message).await?;
        self.ctx
            .transition(DeploymentState::RollbackFailed, Some(first_line(&message).to_string()))
            .await?;

        Ok(RollbackResult::RollbackFailed {
            error: message,
            report,
        })
    }

    async fn write_report(&self, message: &str) -> Result<PathBuf> {
        let engine_dir = self.ctx.settings.engine_dir();
        let binary = &self.ctx.settings.engine.binary;
        let report = ManualRemediationReport {
            project: self.ctx.project().to_string(),
            environment: self.ctx.environment().to_string(),
            check: "rollback".to_string(),
            summary: message.to_string(),
            options: vec![
                ManualOption::new(
                    "Retry the destroy once the error above is fixed",
                    vec![format!("cd {} && {} destroy", engine_dir.display(), binary)],
                ),
                ManualOption::new(
                    "Remove what the engine could not",
                    vec![
                        "gpufleet cleanup --dry-run".to_string(),
                        "gpufleet cleanup".to_string(),
                    ],
                ),
            ],
            generated_at: Utc::now(),
        };
        self.ctx
            .reports
            .write(ReportKind::ManualRemediation, "rollback", &report)
            .await
    }
}

/// Captured error block, if the output has one
fn error_text(lines: &[String], error: &Regex) -> Option<String> {
    let start = lines.iter().position(|l| error.is_match(l))?;
    let block: Vec<&str> = lines[start..]
        .iter()
        .take_while(|l| !l.starts_with(markers::BLOCK_CLOSE))
        .map(|l| l.trim_start_matches('│').trim())
        .collect();
    Some(block.join("\n").trim().to_string())
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::FailureCategory;
    use crate::monitor::{ApplyProgress, Termination};
    use crate::testing::TestHarness;
    use gpufleet_engine::StreamExit;

    fn outcome(created: usize) -> ApplyOutcome {
        let mut progress = ApplyProgress::new(4);
        progress.created_count = created;
        ApplyOutcome {
            termination: Termination::ErrorMarker,
            progress,
            percent: 0,
            error_text: Some("Error: boom".into()),
            exit_code: Some(1),
        }
    }

    fn failure() -> Classification {
        Classification::new(FailureCategory::InvalidParameter, "Error: InvalidParameterValue")
    }

    #[tokio::test]
    async fn test_keep_partial_persists_partial_deploy() {
        let harness = TestHarness::new().keep_partial();
        let ctx = harness.context();

        let result = RollbackCoordinator::new(&ctx)
            .after_failure(&failure(), &outcome(2))
            .await
            .unwrap();

        assert_eq!(result, RollbackResult::Kept(DeploymentState::PartialDeploy));
        assert_eq!(ctx.current_state().await.unwrap(), DeploymentState::PartialDeploy);
        assert_eq!(harness.engine.destroy_count(), 0);
    }

    #[tokio::test]
    async fn test_nothing_created_persists_failed() {
        let harness = TestHarness::new();
        let ctx = harness.context();

        let result = RollbackCoordinator::new(&ctx)
            .after_failure(&failure(), &outcome(0))
            .await
            .unwrap();
        assert_eq!(result.final_state(), DeploymentState::Failed);
    }

    #[tokio::test]
    async fn test_successful_rollback() {
        let harness = TestHarness::new().assume_yes();
        let ctx = harness.context();

        let result = RollbackCoordinator::new(&ctx)
            .after_failure(&failure(), &outcome(2))
            .await
            .unwrap();

        assert_eq!(result, RollbackResult::RolledBack);
        assert_eq!(ctx.current_state().await.unwrap(), DeploymentState::RolledBack);
        assert_eq!(harness.engine.destroy_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_rollback_writes_report_and_clears_plan() {
        let harness = TestHarness::new().assume_yes();
        harness.engine.script_destroy(
            &[
                "╷",
                "│ Error: deleting EC2 VPC (vpc-1): DependencyViolation: has dependencies",
                "╵",
            ],
            StreamExit::failed(Some(1)),
        );
        let ctx = harness.context();

        let result = RollbackCoordinator::new(&ctx)
            .after_failure(&failure(), &outcome(2))
            .await
            .unwrap();

        let RollbackResult::RollbackFailed { error, report } = result else {
            panic!("expected rollback failure");
        };
        assert!(error.contains("DependencyViolation"));
        assert!(report.exists());
        assert!(harness.engine.plan_cleared());
        assert_eq!(ctx.current_state().await.unwrap(), DeploymentState::RollbackFailed);
    }

    #[tokio::test]
    async fn test_zero_exit_without_marker_is_failure() {
        let harness = TestHarness::new().assume_yes();
        harness.engine.script_destroy(&["Destroying..."], StreamExit::ok());
        let ctx = harness.context();

        let result = RollbackCoordinator::new(&ctx)
            .after_failure(&failure(), &outcome(1))
            .await
            .unwrap();
        assert_eq!(result.final_state(), DeploymentState::RollbackFailed);
    }

    #[tokio::test]
    async fn test_operator_rollback_requires_rollbackable_state() {
        let harness = TestHarness::new().assume_yes();
        let ctx = harness.context();

        let err = RollbackCoordinator::new(&ctx).request().await.unwrap_err();
        assert!(matches!(err, CoreError::NotRollbackable(DeploymentState::NotDeployed)));

        ctx.transition(DeploymentState::Deployed, None).await.unwrap();
        let result = RollbackCoordinator::new(&ctx).request().await.unwrap();
        assert_eq!(result, RollbackResult::RolledBack);
    }
}
