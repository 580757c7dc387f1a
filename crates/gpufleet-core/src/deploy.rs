//! Provisioning pipeline
//!
//! auth → state check → init → quota → plan → conflict scan (gated) →
//! apply under the monitor. An insufficient-capacity failure may move the
//! run to another zone a bounded number of times; any other failure goes
//! to the rollback decision point.

use crate::classify::{Classification, FailureCategory, FailureClassifier};
use crate::cleanup::{CleanupOptions, CleanupOrchestrator, CleanupReport};
use crate::conflict::{ConflictScanner, ScanReport};
use crate::context::RunContext;
use crate::error::{CoreError, Result};
use crate::failover::ZoneFailoverNegotiator;
use crate::monitor::{ApplyMonitor, ApplyOutcome, ProgressView};
use crate::quota::{PricingModel, QuotaAdvisor, QuotaDecision, QuotaIncreaseRequest};
use crate::report::{MissingPermissionsReport, ReportKind};
use crate::rollback::{RollbackCoordinator, RollbackResult};
use chrono::Utc;
use gpufleet_cloud::DeploymentState;
use gpufleet_engine::{PlanSummary, StreamExit};
use std::path::PathBuf;

/// Extra plan-and-scan rounds after remediation changed state
const MAX_RESCANS: u32 = 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct DeployOptions {
    /// Continue past blocked pre-flight checks
    pub override_blocked: bool,
}

/// Quota step result
#[derive(Debug, Clone)]
pub struct QuotaCheck {
    pub decision: QuotaDecision,
    /// Quota-increase report written when the run must halt
    pub report: Option<PathBuf>,
}

/// Everything checked before apply, nothing applied
#[derive(Debug, Clone)]
pub struct PreflightReport {
    pub quota: QuotaCheck,
    pub plan: Option<PlanSummary>,
    pub scan: Option<ScanReport>,
}

impl PreflightReport {
    pub fn is_clear(&self) -> bool {
        matches!(self.quota.decision, QuotaDecision::Selected { .. })
            && self.scan.as_ref().is_some_and(|s| s.is_clear())
    }
}

#[derive(Debug, Clone)]
pub enum DeployOutcome {
    Deployed {
        instance_type: String,
        pricing: PricingModel,
        zone_failovers: u32,
        scan: ScanReport,
    },
    QuotaHalted {
        request: QuotaIncreaseRequest,
        report: PathBuf,
    },
    Blocked {
        scan: ScanReport,
    },
    Failed {
        failure: Classification,
        rollback: RollbackResult,
        /// Missing-permissions report for access-denied failures
        report: Option<PathBuf>,
        zone_failovers: u32,
    },
}

impl DeployOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeployOutcome::Deployed { .. })
    }
}

pub struct DeployPipeline<'a> {
    ctx: &'a RunContext,
    options: DeployOptions,
}

impl<'a> DeployPipeline<'a> {
    pub fn new(ctx: &'a RunContext, options: DeployOptions) -> Self {
        Self { ctx, options }
    }

    async fn check_auth(&self) -> Result<()> {
        let status = self.ctx.cloud.check_auth().await?;
        if !status.authenticated {
            return Err(CoreError::AuthFailed(
                status.error.unwrap_or_else(|| "not authenticated".to_string()),
            ));
        }
        if let Some(account) = status.account_info {
            tracing::info!(provider = self.ctx.cloud.name(), account = %account, "authenticated");
        }
        Ok(())
    }

    /// Run the quota advisor on the configured instance type. With
    /// `persist`, a selection that differs from the variable file is
    /// written back.
    pub async fn check_quota(&self, persist: bool) -> Result<QuotaCheck> {
        self.check_auth().await?;
        self.quota_step(persist).await
    }

    async fn quota_step(&self, persist: bool) -> Result<QuotaCheck> {
        let compute = &self.ctx.settings.compute;
        let vars = self.ctx.var_file()?;
        let requested = vars
            .get_str(&compute.instance_type_var)
            .map(String::from)
            .unwrap_or_else(|| compute.default_instance_type.clone());

        let decision = QuotaAdvisor::new(self.ctx).advise(&requested).await?;
        match decision {
            QuotaDecision::Selected {
                ref instance_type,
                pricing,
                ..
            } => {
                if persist {
                    let mut vars = self.ctx.var_file()?;
                    let spot = pricing == PricingModel::Spot;
                    if vars.get_str(&compute.instance_type_var) != Some(instance_type.as_str()) {
                        vars.set(&compute.instance_type_var, instance_type.clone());
                    }
                    if vars.get_bool(&compute.spot_var) != Some(spot) {
                        vars.set(&compute.spot_var, spot);
                    }
                    if vars.has_pending() {
                        vars.save()?;
                    }
                }
                tracing::info!(instance_type = %instance_type, pricing = %pricing, "quota ok");
                Ok(QuotaCheck {
                    decision,
                    report: None,
                })
            }
            QuotaDecision::IncreaseRequired(ref request) => {
                let path = self
                    .ctx
                    .reports
                    .write(ReportKind::QuotaIncrease, &request.instance_type, request)
                    .await?;
                tracing::warn!(
                    instance_type = %request.instance_type,
                    suggested = request.suggested_value,
                    "quota too low"
                );
                Ok(QuotaCheck {
                    decision,
                    report: Some(path),
                })
            }
        }
    }

    /// Quota and conflict checks with remediation, no apply
    pub async fn preflight(&self) -> Result<PreflightReport> {
        self.check_auth().await?;
        self.ctx.engine.init().await?;

        let quota = self.quota_step(true).await?;
        if quota.report.is_some() {
            return Ok(PreflightReport {
                quota,
                plan: None,
                scan: None,
            });
        }

        let mut plan = self.ctx.engine.plan().await?;
        let scan = self.scan_plan(&mut plan).await?;
        Ok(PreflightReport {
            quota,
            plan: Some(plan),
            scan: Some(scan),
        })
    }

    /// Scan the plan; while remediation changes state, plan again and scan
    /// the new plan, so the gate judges what will be applied
    async fn scan_plan(&self, plan: &mut PlanSummary) -> Result<ScanReport> {
        let scanner = ConflictScanner::new(self.ctx);
        let mut scan = scanner.scan(plan).await?;
        let mut rescans = 0;
        while scan.changed_state() && (scan.is_clear() || self.options.override_blocked) {
            tracing::info!("remediation changed state, planning again");
            *plan = self.ctx.engine.plan().await?;
            if rescans == MAX_RESCANS {
                tracing::warn!(rescans, "remediation still changing state, keeping the last scan");
                break;
            }
            rescans += 1;
            let next = scanner.scan(plan).await?;
            let changed = next.changed_state();
            scan = next.after(scan);
            if !changed {
                break;
            }
        }
        Ok(scan)
    }

    pub async fn run(&self, view: &mut dyn ProgressView) -> Result<DeployOutcome> {
        self.check_auth().await?;

        let current = self.ctx.current_state().await?;
        if !current.can_transition_to(DeploymentState::Deployed) {
            return Err(CoreError::InvalidTransition {
                from: current,
                to: DeploymentState::Deployed,
            });
        }

        self.ctx.engine.init().await?;

        let quota = self.quota_step(true).await?;
        let (instance_type, pricing) = match quota.decision {
            QuotaDecision::Selected {
                instance_type,
                pricing,
                ..
            } => (instance_type, pricing),
            QuotaDecision::IncreaseRequired(request) => {
                return Ok(DeployOutcome::QuotaHalted {
                    request,
                    report: quota.report.unwrap_or_default(),
                });
            }
        };

        let mut plan = self.ctx.engine.plan().await?;
        tracing::info!(
            create = plan.to_create,
            update = plan.to_update,
            replace = plan.to_replace,
            destroy = plan.to_destroy,
            "plan ready"
        );

        let scan = self.scan_plan(&mut plan).await?;
        if let Err(e) = scan.gate(self.options.override_blocked) {
            tracing::error!(error = %e, "pre-flight blocked");
            return Ok(DeployOutcome::Blocked { scan });
        }

        let classifier = FailureClassifier::new()?;
        let mut zone_failovers = 0;
        loop {
            let outcome = self.apply(&plan, view).await?;
            if outcome.is_success() {
                self.ctx.transition(DeploymentState::Deployed, None).await?;
                return Ok(DeployOutcome::Deployed {
                    instance_type,
                    pricing,
                    zone_failovers,
                    scan,
                });
            }

            let text = outcome.error_text.clone().unwrap_or_default();
            let failure = classifier.classify(&text);
            tracing::error!(category = %failure.category, "apply failed");

            let report = if failure.category == FailureCategory::AccessDenied {
                Some(self.write_missing_permissions(&classifier, &text).await?)
            } else {
                None
            };

            if failure.category == FailureCategory::InsufficientInstanceCapacity
                && zone_failovers < self.ctx.settings.max_zone_failovers
                && self.fail_over(&failure, &instance_type).await?
            {
                zone_failovers += 1;
                plan = self.ctx.engine.plan().await?;
                continue;
            }

            let rollback = RollbackCoordinator::new(self.ctx)
                .after_failure(&failure, &outcome)
                .await?;
            return Ok(DeployOutcome::Failed {
                failure,
                rollback,
                report,
                zone_failovers,
            });
        }
    }

    /// Stream one apply through the monitor
    async fn apply(&self, plan: &PlanSummary, view: &mut dyn ProgressView) -> Result<ApplyOutcome> {
        let mut monitor = ApplyMonitor::for_plan(
            Some(plan),
            self.ctx.settings.monitor.fallback_total_resources,
        )?;
        view.start(monitor.progress().total_resources);

        let result = {
            let mut sink = |line: &str| {
                tracing::debug!(target: "engine", "{}", line);
                if monitor.consume(line) {
                    view.update(monitor.progress(), monitor.percent());
                }
            };
            self.ctx.engine.apply(&mut sink).await
        };
        let exit = match result {
            Ok(exit) => exit,
            Err(e) => {
                tracing::error!(error = %e, "apply could not run");
                StreamExit::failed(None)
            }
        };

        let outcome = monitor.finish(exit);
        view.finish(&outcome);
        Ok(outcome)
    }

    /// Negotiate a zone; true when one was picked and persisted
    async fn fail_over(&self, failure: &Classification, instance_type: &str) -> Result<bool> {
        let zone_var = &self.ctx.settings.compute.zone_var;
        let current_zone = self.ctx.var_file()?.get_str(zone_var).map(String::from);

        let request = ZoneFailoverNegotiator::new(self.ctx)
            .negotiate(failure, instance_type, current_zone.as_deref())
            .await?;
        let Some(zone) = request.and_then(|r| r.selected_zone) else {
            return Ok(false);
        };

        let mut vars = self.ctx.var_file()?;
        vars.set(zone_var, zone.clone());
        vars.save()?;
        self.ctx.engine.clear_plan().await?;
        tracing::info!(zone = %zone, "retrying in another zone");
        Ok(true)
    }

    async fn write_missing_permissions(
        &self,
        classifier: &FailureClassifier,
        text: &str,
    ) -> Result<PathBuf> {
        let report = MissingPermissionsReport {
            project: self.ctx.project().to_string(),
            environment: self.ctx.environment().to_string(),
            denied_actions: classifier.denied_actions(text),
            raw_error: text.to_string(),
            generated_at: Utc::now(),
        };
        self.ctx
            .reports
            .write(ReportKind::MissingPermissions, "", &report)
            .await
    }
}

/// Cleanup entry point; a full-scope success marks the deployment destroyed
pub async fn run_cleanup(ctx: &RunContext, options: CleanupOptions) -> Result<CleanupReport> {
    let full_scope = !options.dry_run && options.prefix.is_none() && options.network_id.is_none();
    let report = CleanupOrchestrator::new(ctx, options).run().await?;
    if full_scope && report.is_success() && !report.is_noop() {
        ctx.transition(DeploymentState::Destroyed, None).await?;
    }
    Ok(report)
}
