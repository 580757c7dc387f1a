//! Runs the check battery and walks each remediation chain

use super::capacity::CapacityProbe;
use super::cidr::CidrProbe;
use super::existing::ExistingProbe;
use super::orphans::OrphanProbe;
use super::{
    Attempt, CheckStatus, Conflict, ConflictCheck, ConflictProbe, StrategyOutcome,
};
use crate::context::RunContext;
use crate::error::{CoreError, Result};
use gpufleet_cloud::ResourceKind;
use gpufleet_engine::PlanSummary;
use serde::Serialize;

/// Outcome of one scan, in battery order
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub checks: Vec<ConflictCheck>,
}

impl ScanReport {
    /// Blocking checks that stayed blocked
    pub fn blocked(&self) -> Vec<&ConflictCheck> {
        self.checks
            .iter()
            .filter(|c| c.blocking && c.status == CheckStatus::Blocked)
            .collect()
    }

    pub fn is_clear(&self) -> bool {
        self.blocked().is_empty()
    }

    /// Some remediation changed state, so the plan is stale
    pub fn changed_state(&self) -> bool {
        self.checks.iter().any(|c| c.changed_state())
    }

    /// This scan, with the remediation history of an earlier scan in the
    /// same run carried onto checks of the same name
    pub fn after(mut self, earlier: ScanReport) -> ScanReport {
        for old in earlier.checks {
            let Some(check) = self.checks.iter_mut().find(|c| c.name == old.name) else {
                continue;
            };
            let mut log = old.remediation_log;
            log.append(&mut check.remediation_log);
            check.remediation_log = log;
        }
        self
    }

    /// Refuse to continue while a blocking check is blocked, unless the
    /// operator escalated
    pub fn gate(&self, override_blocked: bool) -> Result<()> {
        let blocked: Vec<String> = self.blocked().iter().map(|c| c.name.clone()).collect();
        if blocked.is_empty() {
            return Ok(());
        }
        if override_blocked {
            tracing::warn!(checks = ?blocked, "proceeding past blocked checks on operator override");
            return Ok(());
        }
        Err(CoreError::Blocked(blocked))
    }
}

/// The default battery for a plan: capacity, name collisions, address
/// ranges, then housekeeping
pub async fn battery(ctx: &RunContext, plan: &PlanSummary) -> Result<Vec<Box<dyn ConflictProbe>>> {
    let net = &ctx.settings.network;
    let mut probes: Vec<Box<dyn ConflictProbe>> = Vec::new();

    let creations_of = |kind: ResourceKind| {
        plan.creations()
            .filter(|r| ctx.cloud.kind_for_engine_type(&r.resource_type) == Some(kind))
            .count() as u32
    };

    let addresses = creations_of(ResourceKind::ElasticIp).max(net.required_addresses);
    if addresses > 0 {
        probes.push(Box::new(CapacityProbe::addresses(addresses, net.address_limit_fallback)));
    }
    let networks = creations_of(ResourceKind::Vpc);
    if networks > 0 {
        probes.push(Box::new(CapacityProbe::networks(networks, net.network_limit_fallback)));
    }

    let prefix = ctx.naming_prefix()?;
    for planned in plan.creations() {
        let Some(kind) = ctx.cloud.kind_for_engine_type(&planned.resource_type) else {
            continue;
        };
        if let Some(probe) = ExistingProbe::for_planned(kind, planned, &prefix) {
            probes.push(Box::new(probe));
        }
    }

    probes.push(Box::new(CidrProbe));

    for kind in [ResourceKind::InstanceProfile, ResourceKind::IamRole, ResourceKind::EventRule] {
        probes.push(Box::new(OrphanProbe::new(kind)));
    }

    Ok(probes)
}

pub struct ConflictScanner<'a> {
    ctx: &'a RunContext,
}

impl<'a> ConflictScanner<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx }
    }

    pub async fn scan(&self, plan: &PlanSummary) -> Result<ScanReport> {
        let probes = battery(self.ctx, plan).await?;
        self.run(probes).await
    }

    pub async fn run(&self, probes: Vec<Box<dyn ConflictProbe>>) -> Result<ScanReport> {
        let mut checks: Vec<ConflictCheck> = Vec::with_capacity(probes.len());
        for (i, probe) in probes.iter().enumerate() {
            let check = self.check(probe.as_ref()).await;
            let changed = check.changed_state();
            checks.push(check);
            if changed {
                self.revisit(&probes[..i], &mut checks[..i]).await;
            }
        }

        // Later remediations can undo earlier ones; once anything changed
        // state, no earlier verdict is trusted without a fresh look
        let changed = checks.iter().any(|c| c.changed_state());
        for (probe, check) in probes.iter().zip(checks.iter_mut()) {
            let recheck = match check.status {
                CheckStatus::Remediated => true,
                CheckStatus::Pass => changed,
                _ => false,
            };
            if !recheck {
                continue;
            }
            let status = match probe.inspect(self.ctx).await {
                Ok(None) => CheckStatus::Pass,
                Ok(Some(conflict)) => {
                    tracing::warn!(check = %check.name, conflict = %conflict.summary(), "conflict reappeared");
                    CheckStatus::Blocked
                }
                Err(e) => {
                    tracing::warn!(check = %check.name, error = %e, "re-verification failed");
                    CheckStatus::Blocked
                }
            };
            check.reopen();
            check.settle(status);
        }

        let report = ScanReport { checks };
        tracing::info!(
            checks = report.checks.len(),
            blocked = report.blocked().len(),
            "conflict scan finished"
        );
        Ok(report)
    }

    /// Earlier checks were settled against state a later remediation just
    /// changed (a new naming prefix, released capacity): look again, and
    /// walk the chain of any that now conflict
    async fn revisit(&self, probes: &[Box<dyn ConflictProbe>], checks: &mut [ConflictCheck]) {
        for (probe, check) in probes.iter().zip(checks.iter_mut()) {
            if !matches!(check.status, CheckStatus::Pass | CheckStatus::Remediated) {
                continue;
            }
            let first = probe.inspect(self.ctx).await;
            if matches!(first, Ok(None)) {
                continue;
            }
            tracing::info!(check = %check.name, "re-checking after a later remediation");
            check.reopen();
            self.walk(probe.as_ref(), check, first).await;
        }
    }

    async fn check(&self, probe: &dyn ConflictProbe) -> ConflictCheck {
        let mut check = ConflictCheck::new(probe.name(), probe.kind(), probe.scope(), probe.blocking());
        let first = probe.inspect(self.ctx).await;
        self.walk(probe, &mut check, first).await;
        check
    }

    /// Settle `check` from its first inspection, walking the chain on a
    /// conflict
    async fn walk(
        &self,
        probe: &dyn ConflictProbe,
        check: &mut ConflictCheck,
        first: Result<Option<Conflict>>,
    ) {
        let mut conflict = match first {
            Ok(None) => {
                tracing::debug!(check = %check.name, "no conflict");
                check.settle(CheckStatus::Pass);
                return;
            }
            Ok(Some(conflict)) => conflict,
            Err(e) => {
                tracing::warn!(check = %check.name, error = %e, "inspection failed");
                check.settle(CheckStatus::Blocked);
                return;
            }
        };
        tracing::info!(check = %check.name, conflict = %conflict.summary(), "conflict found");

        for strategy in probe.chain().strategies() {
            let attempt = if !strategy.applies(&conflict) {
                Attempt::not_applicable("does not apply")
            } else {
                match strategy.attempt(self.ctx, &conflict).await {
                    Ok(attempt) => attempt,
                    Err(e) => Attempt::failed(e.to_string()),
                }
            };
            tracing::info!(
                check = %check.name,
                strategy = strategy.name(),
                outcome = %attempt.outcome,
                detail = %attempt.detail,
                "remediation attempt"
            );

            let outcome = attempt.outcome;
            let (record, report) = attempt.into_record(strategy.name(), strategy.destructiveness());
            check.record(record);
            if report.is_some() {
                check.manual_report = report;
            }
            if outcome == StrategyOutcome::NotApplicable {
                continue;
            }

            match probe.inspect(self.ctx).await {
                Ok(None) => {
                    check.settle(CheckStatus::Remediated);
                    return;
                }
                Ok(Some(next)) => conflict = next,
                Err(e) => {
                    tracing::warn!(check = %check.name, error = %e, "re-inspection failed");
                    check.settle(CheckStatus::Blocked);
                    return;
                }
            }
        }

        check.settle(CheckStatus::Blocked);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::{
        Conflict, ConflictDetail, ConflictKind, ConflictScope, Destructiveness, RemediationChain,
        RemediationStrategy,
    };
    use crate::testing::TestHarness;
    use async_trait::async_trait;
    use gpufleet_cloud::CloudResource;
    use gpufleet_engine::{PlannedAction, PlannedResource};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Conflict that goes away after `fix_after` resolving attempts, and
    /// comes back on the `relapse_at`-th inspection
    struct CountingProbe {
        inspections: Arc<AtomicU32>,
        fixes: Arc<AtomicU32>,
        fix_after: u32,
        relapse_at: Option<u32>,
        attempts: Arc<AtomicU32>,
    }

    impl CountingProbe {
        fn new(fix_after: u32) -> Self {
            Self {
                inspections: Arc::new(AtomicU32::new(0)),
                fixes: Arc::new(AtomicU32::new(0)),
                fix_after,
                relapse_at: None,
                attempts: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    struct Step {
        name: &'static str,
        level: Destructiveness,
        fixes: Arc<AtomicU32>,
        attempts: Arc<AtomicU32>,
    }

    #[async_trait]
    impl RemediationStrategy for Step {
        fn name(&self) -> &'static str {
            self.name
        }

        fn destructiveness(&self) -> Destructiveness {
            self.level
        }

        fn applies(&self, _conflict: &Conflict) -> bool {
            true
        }

        async fn attempt(&self, _ctx: &RunContext, _conflict: &Conflict) -> Result<Attempt> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.fixes.fetch_add(1, Ordering::SeqCst);
            Ok(Attempt::resolved(self.name))
        }
    }

    #[async_trait]
    impl ConflictProbe for CountingProbe {
        fn name(&self) -> String {
            "counting".into()
        }

        fn kind(&self) -> ConflictKind {
            ConflictKind::OrphanedRule
        }

        fn scope(&self) -> ConflictScope {
            ConflictScope::new("test", "*")
        }

        async fn inspect(&self, _ctx: &RunContext) -> Result<Option<Conflict>> {
            let n = self.inspections.fetch_add(1, Ordering::SeqCst) + 1;
            let fixed = self.fixes.load(Ordering::SeqCst) >= self.fix_after;
            if fixed && self.relapse_at != Some(n) {
                return Ok(None);
            }
            Ok(Some(Conflict {
                kind: ConflictKind::OrphanedRule,
                scope: self.scope(),
                detail: ConflictDetail::Orphans {
                    kind: ResourceKind::EventRule,
                    resources: Vec::new(),
                },
            }))
        }

        fn chain(&self) -> RemediationChain {
            let step = |name, level| -> Box<dyn RemediationStrategy> {
                Box::new(Step {
                    name,
                    level,
                    fixes: Arc::clone(&self.fixes),
                    attempts: Arc::clone(&self.attempts),
                })
            };
            RemediationChain::new(vec![
                step("delete", Destructiveness::Delete),
                step("reuse", Destructiveness::Reuse),
                step("rename", Destructiveness::Rename),
            ])
        }
    }

    #[tokio::test]
    async fn test_stops_at_first_strategy_that_clears_conflict() {
        let harness = TestHarness::new();
        let ctx = harness.context();
        let probe = CountingProbe::new(2);
        let attempts = Arc::clone(&probe.attempts);

        let report = ConflictScanner::new(&ctx).run(vec![Box::new(probe)]).await.unwrap();
        let check = &report.checks[0];

        assert_eq!(check.status, CheckStatus::Pass);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        let order: Vec<&str> = check.remediation_log.iter().map(|r| r.strategy.as_str()).collect();
        assert_eq!(order, vec!["reuse", "rename"]);
    }

    #[tokio::test]
    async fn test_reverification_can_block_remediated_check() {
        let harness = TestHarness::new();
        let ctx = harness.context();
        // initial, after reuse (clear), final re-verify (relapse)
        let mut probe = CountingProbe::new(1);
        probe.relapse_at = Some(3);

        let report = ConflictScanner::new(&ctx).run(vec![Box::new(probe)]).await.unwrap();
        assert_eq!(report.checks[0].status, CheckStatus::Blocked);
    }

    #[tokio::test]
    async fn test_exhausted_chain_blocks_and_gates() {
        let harness = TestHarness::new();
        let ctx = harness.context();
        let probe = CountingProbe::new(10);

        let report = ConflictScanner::new(&ctx).run(vec![Box::new(probe)]).await.unwrap();
        assert_eq!(report.checks[0].status, CheckStatus::Blocked);
        assert_eq!(report.checks[0].remediation_log.len(), 3);
        assert!(report.checks[0].remediation_log.iter().all(|r| r.outcome == StrategyOutcome::Resolved));

        match report.gate(false) {
            Err(CoreError::Blocked(names)) => assert_eq!(names, vec!["counting"]),
            other => panic!("expected blocked gate, got {:?}", other),
        }
        assert!(report.gate(true).is_ok());
    }

    #[tokio::test]
    async fn test_battery_follows_plan() {
        let harness = TestHarness::new();
        harness
            .cloud
            .add(CloudResource::new(ResourceKind::IamRole, "gpu-dev-node").with_name("gpu-dev-node"));
        let ctx = harness.context();

        let plan = PlanSummary {
            to_create: 3,
            resources: vec![
                PlannedResource {
                    address: "aws_vpc.main".into(),
                    resource_type: "aws_vpc".into(),
                    name: None,
                    action: PlannedAction::Create,
                },
                PlannedResource {
                    address: "aws_eip.nat".into(),
                    resource_type: "aws_eip".into(),
                    name: None,
                    action: PlannedAction::Create,
                },
                PlannedResource {
                    address: "aws_iam_role.node".into(),
                    resource_type: "aws_iam_role".into(),
                    name: Some("gpu-dev-node".into()),
                    action: PlannedAction::Create,
                },
            ],
            ..Default::default()
        };

        let probes = battery(&ctx, &plan).await.unwrap();
        let names: Vec<String> = probes.iter().map(|p| p.name()).collect();
        assert_eq!(names[0], "elastic-ip-capacity");
        assert_eq!(names[1], "vpc-capacity");
        assert_eq!(names[2], "exists:aws_iam_role.node");
        assert_eq!(names[3], "network-ranges");
        assert_eq!(names.len(), 7);
        assert!(probes[4..].iter().all(|p| !p.blocking()));

        let report = ConflictScanner::new(&ctx).scan(&plan).await.unwrap();
        assert!(report.is_clear());
        assert!(report.changed_state());
    }

    #[tokio::test]
    async fn test_prefix_rename_rechecks_earlier_passes() {
        let harness = TestHarness::new();
        harness
            .cloud
            .add(CloudResource::new(ResourceKind::IamRole, "gpu-dev-node").with_name("gpu-dev-node"));
        // Free under the old prefix, taken under the region-suffixed one
        harness.cloud.add(
            CloudResource::new(ResourceKind::SecurityGroup, "sg-taken").with_name("gpu-dev-us-east-1-sg"),
        );
        harness.engine.fail_imports();
        let ctx = harness.context();

        let planned = |address: &str, resource_type: &str, name: &str| PlannedResource {
            address: address.into(),
            resource_type: resource_type.into(),
            name: Some(name.into()),
            action: PlannedAction::Create,
        };
        let sg = ExistingProbe::for_planned(
            ResourceKind::SecurityGroup,
            &planned("aws_security_group.gpu", "aws_security_group", "gpu-dev-sg"),
            "gpu-dev",
        )
        .unwrap();
        let role = ExistingProbe::for_planned(
            ResourceKind::IamRole,
            &planned("aws_iam_role.node", "aws_iam_role", "gpu-dev-node"),
            "gpu-dev",
        )
        .unwrap();

        let report = ConflictScanner::new(&ctx)
            .run(vec![Box::new(sg), Box::new(role)])
            .await
            .unwrap();

        let statuses: Vec<CheckStatus> = report.checks.iter().map(|c| c.status).collect();
        assert_eq!(statuses, vec![CheckStatus::Pass, CheckStatus::Pass]);

        let sg_log: Vec<&str> = report.checks[0]
            .remediation_log
            .iter()
            .map(|r| r.strategy.as_str())
            .collect();
        assert_eq!(sg_log, vec!["import-existing", "rename-with-suffix"]);

        let prefix = harness.var("name_prefix").unwrap();
        let prefix = prefix.as_str().unwrap();
        assert!(prefix.starts_with("gpu-dev-us-east-1-"), "{prefix}");
        let taken: Vec<String> = harness.cloud.resources().into_iter().filter_map(|r| r.name).collect();
        assert!(!taken.contains(&format!("{prefix}-sg")));
        assert!(!taken.contains(&format!("{prefix}-node")));
    }

    /// Clean until someone else's fix lands, with nothing to try
    struct WatchProbe {
        fixes: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ConflictProbe for WatchProbe {
        fn name(&self) -> String {
            "watch".into()
        }

        fn kind(&self) -> ConflictKind {
            ConflictKind::AlreadyExists
        }

        fn scope(&self) -> ConflictScope {
            ConflictScope::new("test", "watch")
        }

        async fn inspect(&self, _ctx: &RunContext) -> Result<Option<Conflict>> {
            if self.fixes.load(Ordering::SeqCst) == 0 {
                return Ok(None);
            }
            Ok(Some(Conflict {
                kind: ConflictKind::AlreadyExists,
                scope: self.scope(),
                detail: ConflictDetail::Orphans {
                    kind: ResourceKind::IamRole,
                    resources: Vec::new(),
                },
            }))
        }

        fn chain(&self) -> RemediationChain {
            RemediationChain::new(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_later_fix_reopens_earlier_pass() {
        let harness = TestHarness::new();
        let ctx = harness.context();
        let later = CountingProbe::new(1);
        let watch = WatchProbe {
            fixes: Arc::clone(&later.fixes),
        };

        let report = ConflictScanner::new(&ctx)
            .run(vec![Box::new(watch), Box::new(later)])
            .await
            .unwrap();

        assert_eq!(report.checks[0].status, CheckStatus::Blocked);
        assert_eq!(report.checks[1].status, CheckStatus::Pass);
        assert!(matches!(report.gate(false), Err(CoreError::Blocked(names)) if names == vec!["watch"]));
    }
}
