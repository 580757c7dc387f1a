//! Allocation ceiling checks (addresses, networks)

use super::strategy::write_manual_report;
use super::{
    Attempt, Conflict, ConflictDetail, ConflictKind, ConflictProbe, ConflictScope, Destructiveness,
    RemediationChain, RemediationStrategy, is_tracked, tracked_keys,
};
use crate::cleanup::{CleanupOptions, CleanupOrchestrator, is_gone_status};
use crate::context::RunContext;
use crate::error::Result;
use crate::report::ManualOption;
use async_trait::async_trait;
use gpufleet_cloud::{CloudResource, ResourceFilter, ResourceKind};

/// Provider quota behind the allocation ceiling of a kind
pub fn quota_for(kind: ResourceKind) -> Option<(&'static str, &'static str)> {
    match kind {
        ResourceKind::ElasticIp => Some(("ec2", "L-0263D0A3")),
        ResourceKind::Vpc => Some(("vpc", "L-F678F1CE")),
        _ => None,
    }
}

/// Kinds whose presence inside a network means the network is in use
const WORKLOAD_KINDS: [ResourceKind; 10] = [
    ResourceKind::AutoScalingGroup,
    ResourceKind::Instance,
    ResourceKind::LoadBalancer,
    ResourceKind::NatGateway,
    ResourceKind::VpcEndpoint,
    ResourceKind::VpcPeering,
    ResourceKind::TransitGatewayAttachment,
    ResourceKind::DataStore,
    ResourceKind::Function,
    ResourceKind::NetworkInterface,
];

/// A network counts as unused only when nothing live runs inside it;
/// the provider reports no associations for networks themselves
async fn network_is_empty(ctx: &RunContext, network_id: &str) -> Result<bool> {
    let filter = ResourceFilter::all().in_network(network_id);
    for kind in WORKLOAD_KINDS {
        let found = ctx.cloud.describe(kind, &filter).await?;
        if let Some(resource) = found.iter().find(|r| !is_gone_status(r.status.as_deref())) {
            tracing::debug!(network_id, kind = %kind, resource_id = %resource.id, "network in use");
            return Ok(false);
        }
    }
    Ok(true)
}

pub struct CapacityProbe {
    kind: ResourceKind,
    required: u32,
    /// Ceiling assumed when the provider reports no quota value
    fallback_limit: u32,
}

impl CapacityProbe {
    pub fn new(kind: ResourceKind, required: u32, fallback_limit: u32) -> Self {
        Self {
            kind,
            required,
            fallback_limit,
        }
    }

    pub fn addresses(required: u32, fallback_limit: u32) -> Self {
        Self::new(ResourceKind::ElasticIp, required, fallback_limit)
    }

    pub fn networks(required: u32, fallback_limit: u32) -> Self {
        Self::new(ResourceKind::Vpc, required, fallback_limit)
    }

    async fn limit(&self, ctx: &RunContext) -> Result<u32> {
        let Some((service, code)) = quota_for(self.kind) else {
            return Ok(self.fallback_limit);
        };
        Ok(ctx
            .cloud
            .service_quota(service, code)
            .await?
            .unwrap_or(self.fallback_limit))
    }
}

#[async_trait]
impl ConflictProbe for CapacityProbe {
    fn name(&self) -> String {
        format!("{}-capacity", self.kind)
    }

    fn kind(&self) -> ConflictKind {
        ConflictKind::CapacityLimit
    }

    fn scope(&self) -> ConflictScope {
        ConflictScope::new(self.kind.label(), "*")
    }

    async fn inspect(&self, ctx: &RunContext) -> Result<Option<Conflict>> {
        let limit = self.limit(ctx).await?;
        let all = ctx.cloud.describe(self.kind, &ResourceFilter::all()).await?;
        let used = all.len() as u32;

        if used + self.required <= limit {
            tracing::debug!(kind = %self.kind, used, limit, required = self.required, "capacity ok");
            return Ok(None);
        }

        let owned = ctx.owned_filter()?;
        let tracked = tracked_keys(ctx).await?;
        let mut candidates = Vec::new();
        let mut in_use = Vec::new();
        for resource in all {
            let releasable = owned.matches(&resource)
                && ctx.tag_allows(&resource)
                && resource.is_unassociated()
                && !resource.is_default
                && !is_tracked(&tracked, &resource)
                && (self.kind != ResourceKind::Vpc || network_is_empty(ctx, &resource.id).await?);
            if releasable {
                candidates.push(resource);
            } else {
                in_use.push(resource);
            }
        }

        Ok(Some(Conflict {
            kind: ConflictKind::CapacityLimit,
            scope: self.scope(),
            detail: ConflictDetail::Capacity {
                kind: self.kind,
                limit,
                used,
                required: self.required,
                candidates,
                in_use,
            },
        }))
    }

    fn chain(&self) -> RemediationChain {
        RemediationChain::new(vec![
            Box::new(ReleaseUnusedAllocations),
            Box::new(ReportCapacityUsage),
        ])
    }
}

/// Release just enough unused allocations owned by this environment,
/// after the operator agrees
pub struct ReleaseUnusedAllocations;

#[async_trait]
impl RemediationStrategy for ReleaseUnusedAllocations {
    fn name(&self) -> &'static str {
        "release-unused-allocations"
    }

    fn destructiveness(&self) -> Destructiveness {
        Destructiveness::Delete
    }

    fn applies(&self, conflict: &Conflict) -> bool {
        matches!(
            &conflict.detail,
            ConflictDetail::Capacity { candidates, .. } if !candidates.is_empty()
        )
    }

    async fn attempt(&self, ctx: &RunContext, conflict: &Conflict) -> Result<Attempt> {
        let ConflictDetail::Capacity {
            kind,
            limit,
            used,
            required,
            candidates,
            ..
        } = &conflict.detail
        else {
            return Ok(Attempt::not_applicable("not a capacity conflict"));
        };

        let need = (used + required).saturating_sub(*limit) as usize;
        let chosen: Vec<&CloudResource> = candidates.iter().take(need).collect();
        let names: Vec<&str> = chosen.iter().map(|r| r.display_name()).collect();
        if !ctx
            .decider
            .confirm(&format!("Release unused {}: {}?", kind, names.join(", ")))
        {
            tracing::info!(kind = %kind, "release declined");
            return Ok(Attempt::failed(format!("release of {} declined", names.join(", "))));
        }

        let mut released = Vec::new();
        for candidate in chosen {
            let ok = match kind {
                ResourceKind::Vpc => {
                    if network_is_empty(ctx, &candidate.id).await? {
                        // Confirmed above
                        let options = CleanupOptions {
                            force: true,
                            network_id: Some(candidate.id.clone()),
                            ..Default::default()
                        };
                        let report = CleanupOrchestrator::new(ctx, options).run().await?;
                        report.is_success()
                    } else {
                        tracing::warn!(network_id = %candidate.id, "network gained a workload, keeping it");
                        false
                    }
                }
                _ => match ctx.cloud.delete(*kind, &candidate.id).await {
                    Ok(()) => true,
                    Err(e) if e.is_not_found() => true,
                    Err(e) => {
                        tracing::warn!(kind = %kind, resource_id = %candidate.id, error = %e, "release failed");
                        false
                    }
                },
            };
            if ok {
                tracing::info!(kind = %kind, resource_id = %candidate.id, "released unused allocation");
                released.push(candidate.id.clone());
            }
        }

        let detail = format!("released {} of {} needed: {}", released.len(), need, released.join(", "));
        Ok(if released.len() >= need {
            Attempt::resolved(detail)
        } else if released.is_empty() {
            Attempt::failed(detail)
        } else {
            Attempt::partial(detail)
        })
    }
}

/// Terminal: usage vs limit, with release and quota-increase commands
pub struct ReportCapacityUsage;

#[async_trait]
impl RemediationStrategy for ReportCapacityUsage {
    fn name(&self) -> &'static str {
        "report-capacity-usage"
    }

    fn destructiveness(&self) -> Destructiveness {
        Destructiveness::Manual
    }

    fn applies(&self, conflict: &Conflict) -> bool {
        matches!(conflict.detail, ConflictDetail::Capacity { .. })
    }

    async fn attempt(&self, ctx: &RunContext, conflict: &Conflict) -> Result<Attempt> {
        let ConflictDetail::Capacity {
            kind,
            used,
            required,
            candidates,
            in_use,
            ..
        } = &conflict.detail
        else {
            return Ok(Attempt::not_applicable("not a capacity conflict"));
        };
        let region = ctx.cloud.region();

        let mut options = Vec::new();
        let deletable: Vec<&CloudResource> = candidates.iter().chain(in_use.iter()).collect();
        if !deletable.is_empty() {
            options.push(ManualOption::new(
                format!("Delete {} allocations you no longer need", kind),
                deletable
                    .iter()
                    .map(|r| delete_command(*kind, r, region))
                    .collect(),
            ));
        }
        if let Some((service, code)) = quota_for(*kind) {
            options.push(ManualOption::new(
                "Request a higher quota",
                vec![format!(
                    "aws service-quotas request-service-quota-increase --service-code {service} --quota-code {code} --desired-value {} --region {region}",
                    used + required
                )],
            ));
        }

        write_manual_report(ctx, conflict, options).await
    }
}

fn delete_command(kind: ResourceKind, resource: &CloudResource, region: &str) -> String {
    match kind {
        ResourceKind::ElasticIp => format!(
            "aws ec2 release-address --allocation-id {} --region {region}  # {}",
            resource.id,
            resource.display_name()
        ),
        ResourceKind::Vpc => format!("gpufleet cleanup --network {}  # {}", resource.id, resource.display_name()),
        _ => format!("# delete {} {}", kind, resource.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::{CheckStatus, ConflictScanner, StrategyOutcome};
    use crate::testing::TestHarness;

    fn seed_addresses(harness: &TestHarness) {
        harness.cloud.quota("L-0263D0A3", 5);
        harness.cloud.add(
            CloudResource::new(ResourceKind::ElasticIp, "eipalloc-used")
                .with_name("gpu-dev-bastion")
                .with_association("eipassoc-1"),
        );
        harness
            .cloud
            .add(CloudResource::new(ResourceKind::ElasticIp, "eipalloc-a").with_name("gpu-dev-eip-a"));
        harness
            .cloud
            .add(CloudResource::new(ResourceKind::ElasticIp, "eipalloc-b").with_name("gpu-dev-eip-b"));
    }

    #[tokio::test]
    async fn test_releases_exactly_what_is_needed() {
        let harness = TestHarness::new().assume_yes();
        seed_addresses(&harness);
        let ctx = harness.context();

        // 3 of 5 used, 3 more required: one release is enough
        let report = ConflictScanner::new(&ctx)
            .run(vec![Box::new(CapacityProbe::addresses(3, 5))])
            .await
            .unwrap();

        assert_eq!(report.checks[0].status, CheckStatus::Pass);
        assert_eq!(harness.cloud.deleted(), vec!["eipalloc-a"]);
        assert!(harness.cloud.has(ResourceKind::ElasticIp, "eipalloc-b"));
        assert!(harness.cloud.has(ResourceKind::ElasticIp, "eipalloc-used"));
    }

    #[tokio::test]
    async fn test_both_orphans_released_for_larger_requirement() {
        let harness = TestHarness::new().assume_yes();
        seed_addresses(&harness);
        let ctx = harness.context();

        let report = ConflictScanner::new(&ctx)
            .run(vec![Box::new(CapacityProbe::addresses(4, 5))])
            .await
            .unwrap();

        assert_eq!(report.checks[0].status, CheckStatus::Pass);
        assert_eq!(harness.cloud.deleted().len(), 2);
        assert_eq!(report.checks[0].remediation_log.len(), 1);
    }

    #[tokio::test]
    async fn test_headroom_means_no_conflict() {
        let harness = TestHarness::new();
        seed_addresses(&harness);
        let ctx = harness.context();

        let conflict = CapacityProbe::addresses(2, 5).inspect(&ctx).await.unwrap();
        assert!(conflict.is_none());
    }

    #[tokio::test]
    async fn test_not_enough_orphans_blocks_with_report() {
        let harness = TestHarness::new().assume_yes();
        seed_addresses(&harness);
        let ctx = harness.context();

        let report = ConflictScanner::new(&ctx)
            .run(vec![Box::new(CapacityProbe::addresses(5, 5))])
            .await
            .unwrap();

        let check = &report.checks[0];
        assert_eq!(check.status, CheckStatus::Blocked);
        let strategies: Vec<&str> = check.remediation_log.iter().map(|r| r.strategy.as_str()).collect();
        assert_eq!(strategies, vec!["release-unused-allocations", "report-capacity-usage"]);

        let path = check.manual_report.as_ref().unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("request-service-quota-increase"));
        assert!(content.contains("--desired-value 6"));
    }

    #[tokio::test]
    async fn test_fallback_limit_when_quota_unknown() {
        let harness = TestHarness::new();
        harness.cloud.add(CloudResource::new(ResourceKind::Vpc, "vpc-1").with_name("other"));
        let ctx = harness.context();

        assert!(CapacityProbe::networks(1, 2).inspect(&ctx).await.unwrap().is_none());
        assert!(CapacityProbe::networks(1, 1).inspect(&ctx).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_full_allocation_releases_only_the_orphans() {
        let harness = TestHarness::new().assume_yes();
        harness.cloud.quota("L-0263D0A3", 5);
        for n in 1..=3 {
            harness.cloud.add(
                CloudResource::new(ResourceKind::ElasticIp, format!("eipalloc-used-{n}"))
                    .with_name(format!("gpu-dev-eip-used-{n}"))
                    .with_association(format!("eipassoc-{n}")),
            );
        }
        for n in 1..=2 {
            harness.cloud.add(
                CloudResource::new(ResourceKind::ElasticIp, format!("eipalloc-orphan-{n}"))
                    .with_name(format!("gpu-dev-eip-orphan-{n}")),
            );
        }
        let ctx = harness.context();

        // 5 of 5 used, 2 more required
        let report = ConflictScanner::new(&ctx)
            .run(vec![Box::new(CapacityProbe::addresses(2, 5))])
            .await
            .unwrap();

        assert_eq!(report.checks[0].status, CheckStatus::Pass);
        assert_eq!(harness.cloud.deleted(), vec!["eipalloc-orphan-1", "eipalloc-orphan-2"]);
        for n in 1..=3 {
            assert!(harness.cloud.has(ResourceKind::ElasticIp, &format!("eipalloc-used-{n}")));
        }
    }

    #[tokio::test]
    async fn test_associated_and_foreign_allocations_are_never_released() {
        let harness = TestHarness::new().assume_yes();
        harness.cloud.quota("L-0263D0A3", 3);
        harness.cloud.add(
            CloudResource::new(ResourceKind::ElasticIp, "eipalloc-bastion")
                .with_name("gpu-dev-bastion")
                .with_association("eipassoc-1"),
        );
        // Same project, another environment: matched by tag only
        harness.cloud.add(
            CloudResource::new(ResourceKind::ElasticIp, "eipalloc-prod")
                .with_name("gpu-prod-eip")
                .with_tag("Project", "gpu"),
        );
        harness.cloud.add(
            CloudResource::new(ResourceKind::ElasticIp, "eipalloc-dev2").with_name("gpu-dev2-eip"),
        );
        let ctx = harness.context();

        let report = ConflictScanner::new(&ctx)
            .run(vec![Box::new(CapacityProbe::addresses(1, 3))])
            .await
            .unwrap();

        let check = &report.checks[0];
        assert_eq!(check.status, CheckStatus::Blocked);
        assert_eq!(check.remediation_log[0].outcome, StrategyOutcome::NotApplicable);
        assert!(harness.cloud.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_other_project_tag_is_never_released() {
        let harness = TestHarness::new().assume_yes();
        harness.cloud.quota("L-0263D0A3", 1);
        harness.cloud.add(
            CloudResource::new(ResourceKind::ElasticIp, "eipalloc-x")
                .with_name("gpu-dev-eip")
                .with_tag("Project", "billing"),
        );
        let ctx = harness.context();

        let conflict = CapacityProbe::addresses(1, 1).inspect(&ctx).await.unwrap().unwrap();
        let ConflictDetail::Capacity { candidates, in_use, .. } = conflict.detail else {
            panic!("expected a capacity conflict");
        };
        assert!(candidates.is_empty());
        assert_eq!(in_use.len(), 1);
    }

    #[tokio::test]
    async fn test_live_network_of_another_environment_is_kept() {
        let harness = TestHarness::new().assume_yes();
        harness.cloud.quota("L-F678F1CE", 1);
        harness.cloud.add(
            CloudResource::new(ResourceKind::Vpc, "vpc-prod")
                .with_name("gpu-prod-vpc")
                .with_tag("Project", "gpu"),
        );
        harness.cloud.add(
            CloudResource::new(ResourceKind::Instance, "i-prod")
                .with_network("vpc-prod")
                .with_status("running"),
        );
        let ctx = harness.context();

        let report = ConflictScanner::new(&ctx)
            .run(vec![Box::new(CapacityProbe::networks(1, 1))])
            .await
            .unwrap();

        assert_eq!(report.checks[0].status, CheckStatus::Blocked);
        assert!(harness.cloud.deleted().is_empty());
        assert!(harness.cloud.has(ResourceKind::Instance, "i-prod"));
    }

    #[tokio::test]
    async fn test_own_network_with_workload_is_kept() {
        let harness = TestHarness::new().assume_yes();
        harness.cloud.quota("L-F678F1CE", 1);
        harness
            .cloud
            .add(CloudResource::new(ResourceKind::Vpc, "vpc-1").with_name("gpu-dev-vpc"));
        harness.cloud.add(
            CloudResource::new(ResourceKind::NetworkInterface, "eni-1")
                .with_network("vpc-1")
                .with_association("eni-attach-1"),
        );
        let ctx = harness.context();

        let conflict = CapacityProbe::networks(1, 1).inspect(&ctx).await.unwrap().unwrap();
        let ConflictDetail::Capacity { candidates, .. } = conflict.detail else {
            panic!("expected a capacity conflict");
        };
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_empty_own_network_is_released_with_its_scaffolding() {
        let harness = TestHarness::new().assume_yes();
        harness.cloud.quota("L-F678F1CE", 1);
        harness
            .cloud
            .add(CloudResource::new(ResourceKind::Vpc, "vpc-1").with_name("gpu-dev-vpc"));
        harness
            .cloud
            .add(CloudResource::new(ResourceKind::Subnet, "subnet-1").with_network("vpc-1"));
        // Terminated instances do not hold the network
        harness.cloud.add(
            CloudResource::new(ResourceKind::Instance, "i-old")
                .with_network("vpc-1")
                .with_status("terminated"),
        );
        let ctx = harness.context();

        let report = ConflictScanner::new(&ctx)
            .run(vec![Box::new(CapacityProbe::networks(1, 1))])
            .await
            .unwrap();

        assert_eq!(report.checks[0].status, CheckStatus::Pass);
        assert!(!harness.cloud.has(ResourceKind::Vpc, "vpc-1"));
        assert!(!harness.cloud.has(ResourceKind::Subnet, "subnet-1"));
    }

    #[tokio::test]
    async fn test_declined_release_deletes_nothing() {
        let harness = TestHarness::new();
        seed_addresses(&harness);
        harness.cloud.quota("L-F678F1CE", 1);
        harness
            .cloud
            .add(CloudResource::new(ResourceKind::Vpc, "vpc-1").with_name("gpu-dev-vpc"));
        let ctx = harness.context();

        let report = ConflictScanner::new(&ctx)
            .run(vec![
                Box::new(CapacityProbe::addresses(3, 5)),
                Box::new(CapacityProbe::networks(1, 1)),
            ])
            .await
            .unwrap();

        for check in &report.checks {
            assert_eq!(check.status, CheckStatus::Blocked);
            let release = &check.remediation_log[0];
            assert_eq!(release.strategy, "release-unused-allocations");
            assert_eq!(release.outcome, StrategyOutcome::Failed);
            assert!(release.detail.contains("declined"));
        }
        assert!(harness.cloud.deleted().is_empty());
    }
}
