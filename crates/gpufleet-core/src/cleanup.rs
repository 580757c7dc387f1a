//! Dependency-ordered cleanup
//!
//! Twelve fixed stages, each re-discovered at execution time so a run
//! picks up wherever an earlier one stopped. A resource that is already
//! gone counts as done. Dry-run discovers and reports only.

use crate::context::RunContext;
use crate::error::Result;
use gpufleet_cloud::{
    ActionLog, ActionType, CloudInspector, CloudResource, PollConfig, PollOutcome,
    ResourceFilter, ResourceKind, poll_until,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// One step of the fixed deletion order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupStage {
    pub number: u8,
    pub name: &'static str,
    pub kinds: &'static [ResourceKind],
}

pub const STAGES: [CleanupStage; 12] = [
    CleanupStage {
        number: 1,
        name: "compute",
        kinds: &[
            ResourceKind::AutoScalingGroup,
            ResourceKind::Instance,
            ResourceKind::LoadBalancer,
            ResourceKind::TargetGroup,
        ],
    },
    CleanupStage {
        number: 2,
        name: "nat-gateways-and-addresses",
        kinds: &[ResourceKind::NatGateway, ResourceKind::ElasticIp],
    },
    CleanupStage {
        number: 3,
        name: "network-endpoints",
        kinds: &[ResourceKind::VpcEndpoint],
    },
    CleanupStage {
        number: 4,
        name: "peering-and-transit",
        kinds: &[
            ResourceKind::VpcPeering,
            ResourceKind::TransitGatewayAttachment,
        ],
    },
    CleanupStage {
        number: 5,
        name: "data-stores",
        kinds: &[ResourceKind::DataStore],
    },
    CleanupStage {
        number: 6,
        name: "functions",
        kinds: &[ResourceKind::Function],
    },
    CleanupStage {
        number: 7,
        name: "network-interfaces",
        kinds: &[ResourceKind::NetworkInterface],
    },
    CleanupStage {
        number: 8,
        name: "subnets",
        kinds: &[ResourceKind::Subnet],
    },
    CleanupStage {
        number: 9,
        name: "routing-and-firewalls",
        kinds: &[
            ResourceKind::RouteTable,
            ResourceKind::SecurityGroup,
            ResourceKind::NetworkAcl,
        ],
    },
    CleanupStage {
        number: 10,
        name: "internet-gateways",
        kinds: &[ResourceKind::InternetGateway],
    },
    CleanupStage {
        number: 11,
        name: "networks",
        kinds: &[ResourceKind::Vpc],
    },
    CleanupStage {
        number: 12,
        name: "logging-identity-events",
        kinds: &[
            ResourceKind::LogGroup,
            ResourceKind::EventRule,
            ResourceKind::InstanceProfile,
            ResourceKind::IamRole,
        ],
    },
];

/// Kinds that live inside a network and are swept by network membership
fn is_network_scoped(kind: ResourceKind) -> bool {
    !matches!(
        kind,
        ResourceKind::Vpc
            | ResourceKind::ElasticIp
            | ResourceKind::LogGroup
            | ResourceKind::EventRule
            | ResourceKind::InstanceProfile
            | ResourceKind::IamRole
    )
}

/// Provider statuses that mean the resource is on its way out for good
pub(crate) fn is_gone_status(status: Option<&str>) -> bool {
    matches!(status, Some("terminated" | "deleted" | "deleting"))
}

#[derive(Debug, Clone, Default)]
pub struct CleanupOptions {
    /// Discover and report only
    pub dry_run: bool,
    /// Skip the confirmation prompt
    pub force: bool,
    /// Naming prefix override (defaults to the run's prefix)
    pub prefix: Option<String>,
    /// Restrict to one network and everything inside it
    pub network_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    pub number: u8,
    pub name: &'static str,
    pub discovered: usize,
    pub deleted: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    pub scope: String,
    pub dry_run: bool,
    /// False when the operator declined
    pub confirmed: bool,
    pub stages: Vec<StageSummary>,
    pub log: ActionLog,
}

impl CleanupReport {
    pub fn is_success(&self) -> bool {
        self.confirmed && self.log.is_success()
    }

    pub fn is_noop(&self) -> bool {
        self.log.is_noop()
    }
}

pub struct CleanupOrchestrator<'a> {
    ctx: &'a RunContext,
    options: CleanupOptions,
}

impl<'a> CleanupOrchestrator<'a> {
    pub fn new(ctx: &'a RunContext, options: CleanupOptions) -> Self {
        Self { ctx, options }
    }

    fn scope_label(&self, prefix: &str) -> String {
        match self.options.network_id {
            Some(ref id) => format!("network {}", id),
            None => format!("prefix {}", prefix),
        }
    }

    fn prefix(&self) -> Result<String> {
        match self.options.prefix {
            Some(ref p) => Ok(p.clone()),
            None => self.ctx.naming_prefix(),
        }
    }

    /// Base filter for the run
    fn base_filter(&self, prefix: &str) -> ResourceFilter {
        match self.options.network_id {
            Some(ref id) => ResourceFilter::all().in_network(id.clone()),
            None => self.ctx.owned_filter_for(prefix),
        }
    }

    /// Networks whose contents are in scope
    async fn scoped_networks(&self, filter: &ResourceFilter) -> Result<Vec<String>> {
        if let Some(ref id) = self.options.network_id {
            return Ok(vec![id.clone()]);
        }
        Ok(self
            .ctx
            .cloud
            .describe(ResourceKind::Vpc, filter)
            .await?
            .into_iter()
            .filter(|v| !v.is_default)
            .map(|v| v.id)
            .collect())
    }

    async fn discover_kind(
        &self,
        kind: ResourceKind,
        filter: &ResourceFilter,
        networks: &[String],
    ) -> Result<Vec<CloudResource>> {
        let cloud = &self.ctx.cloud;
        let mut found = cloud.describe(kind, filter).await?;

        if is_network_scoped(kind) {
            for network in networks {
                let inside = cloud
                    .describe(kind, &ResourceFilter::all().in_network(network.clone()))
                    .await?;
                for resource in inside {
                    if !found.iter().any(|f| f.id == resource.id) {
                        found.push(resource);
                    }
                }
            }
        }

        // Gateways report the networks they are attached to, not an owner
        if kind == ResourceKind::InternetGateway && !networks.is_empty() {
            for gateway in cloud.describe(kind, &ResourceFilter::all()).await? {
                let attached = gateway.associations.iter().any(|a| networks.contains(a));
                if attached && !found.iter().any(|f| f.id == gateway.id) {
                    found.push(gateway);
                }
            }
        }

        found.retain(|r| !r.is_default && !is_gone_status(r.status.as_deref()));
        Ok(found)
    }

    /// Everything the run would delete, by stage
    pub async fn discover(&self) -> Result<Vec<(CleanupStage, Vec<CloudResource>)>> {
        let prefix = self.prefix()?;
        let filter = self.base_filter(&prefix);
        let networks = self.scoped_networks(&filter).await?;

        let mut plan = Vec::with_capacity(STAGES.len());
        for stage in STAGES {
            let mut resources = Vec::new();
            for kind in stage.kinds {
                resources.extend(self.discover_kind(*kind, &filter, &networks).await?);
            }
            plan.push((stage, resources));
        }
        Ok(plan)
    }

    pub async fn run(&self) -> Result<CleanupReport> {
        let started = Instant::now();
        let prefix = self.prefix()?;
        let scope = self.scope_label(&prefix);
        let discovered = self.discover().await?;
        let total: usize = discovered.iter().map(|(_, r)| r.len()).sum();

        let mut report = CleanupReport {
            scope: scope.clone(),
            dry_run: self.options.dry_run,
            confirmed: true,
            stages: Vec::new(),
            log: ActionLog::new(),
        };

        if self.options.dry_run {
            for (stage, resources) in discovered {
                let mut log = ActionLog::new();
                for r in &resources {
                    log.add_skipped(
                        ActionType::Delete,
                        r.kind,
                        &r.id,
                        format!("would delete {} {}", r.kind, r.display_name()),
                    );
                }
                report.stages.push(summary(stage, resources.len(), &log));
                report.log.merge(log);
            }
            tracing::info!(scope = %scope, total, "cleanup dry run");
            return Ok(report);
        }

        if total == 0 {
            tracing::info!(scope = %scope, "nothing to clean up");
            return Ok(report);
        }

        if !self.options.force
            && !self
                .ctx
                .decider
                .confirm(&format!("Delete {} resources in {}?", total, scope))
        {
            tracing::info!(scope = %scope, "cleanup declined");
            report.confirmed = false;
            return Ok(report);
        }

        let filter = self.base_filter(&prefix);
        let networks = self.scoped_networks(&filter).await?;

        for stage in STAGES {
            let mut log = ActionLog::new();
            let mut count = 0;
            for kind in stage.kinds {
                let resources = self.discover_kind(*kind, &filter, &networks).await?;
                count += resources.len();
                self.delete_kind(*kind, &resources, &mut log).await;
            }

            tracing::info!(
                stage = stage.number,
                name = stage.name,
                deleted = log.succeeded.len(),
                failed = log.failed.len(),
                "cleanup stage finished"
            );
            report.stages.push(summary(stage, count, &log));
            report.log.merge(log);
        }

        report.log.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(scope = %scope, result = %report.log, "cleanup finished");
        Ok(report)
    }

    async fn delete_kind(&self, kind: ResourceKind, resources: &[CloudResource], log: &mut ActionLog) {
        if resources.is_empty() {
            return;
        }

        match kind {
            ResourceKind::NetworkInterface => {
                for eni in resources {
                    if !eni.is_unassociated() && !self.wait_detached(eni).await {
                        log.add_skipped(
                            ActionType::Wait,
                            kind,
                            &eni.id,
                            "still attached after waiting",
                        );
                        continue;
                    }
                    self.delete_one(kind, eni, ActionType::Delete, log).await;
                }
            }
            ResourceKind::ElasticIp => {
                for eip in resources {
                    self.detach_all(eip, log).await;
                    self.delete_one(kind, eip, ActionType::Release, log).await;
                }
            }
            _ => {
                for resource in resources {
                    if detaches_before_delete(kind) {
                        self.detach_all(resource, log).await;
                    }
                    self.delete_one(kind, resource, ActionType::Delete, log).await;
                }
            }
        }

        match kind {
            ResourceKind::Instance | ResourceKind::AutoScalingGroup => {
                self.wait_gone(kind, resources, log).await;
            }
            ResourceKind::NatGateway => {
                self.wait_gone(kind, resources, log).await;
                self.release_nat_allocations(resources, log).await;
            }
            _ => {}
        }
    }

    async fn delete_one(
        &self,
        kind: ResourceKind,
        resource: &CloudResource,
        action: ActionType,
        log: &mut ActionLog,
    ) {
        match self.ctx.cloud.delete(kind, &resource.id).await {
            Ok(()) => {
                tracing::info!(kind = %kind, resource_id = %resource.id, "deleted");
                log.add_success(action, kind, &resource.id, resource.display_name());
            }
            Err(e) if e.is_not_found() => {
                log.add_skipped(action, kind, &resource.id, "already gone");
            }
            Err(e) => {
                tracing::warn!(kind = %kind, resource_id = %resource.id, error = %e, "delete failed");
                log.add_failure(action, kind, &resource.id, e.to_string());
            }
        }
    }

    async fn detach_all(&self, resource: &CloudResource, log: &mut ActionLog) {
        for association in &resource.associations {
            match self
                .ctx
                .cloud
                .detach(resource.kind, &resource.id, association)
                .await
            {
                Ok(()) => log.add_success(
                    ActionType::Detach,
                    resource.kind,
                    &resource.id,
                    association.as_str(),
                ),
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    tracing::warn!(
                        kind = %resource.kind,
                        resource_id = %resource.id,
                        association = %association,
                        error = %e,
                        "detach failed"
                    );
                    log.add_failure(ActionType::Detach, resource.kind, &resource.id, e.to_string());
                }
            }
        }
    }

    /// Poll until none of `resources` is still live
    async fn wait_gone(&self, kind: ResourceKind, resources: &[CloudResource], log: &mut ActionLog) {
        let ids: Vec<String> = resources.iter().map(|r| r.id.clone()).collect();
        let label = format!("{} deletion", kind);
        let outcome = wait_until_gone(&self.ctx.cloud, &self.ctx.poll, kind, ids, &label).await;

        if let PollOutcome::TimedOut { waited, .. } = outcome {
            for r in resources {
                log.add_skipped(
                    ActionType::Wait,
                    kind,
                    &r.id,
                    format!("still present after {:?}", waited),
                );
            }
        }
    }

    async fn wait_detached(&self, eni: &CloudResource) -> bool {
        let cloud = Arc::clone(&self.ctx.cloud);
        let id = eni.id.clone();
        let outcome = poll_until(&self.ctx.poll, "network interface detach", || {
            let cloud = Arc::clone(&cloud);
            let id = id.clone();
            async move {
                let current = cloud
                    .describe(ResourceKind::NetworkInterface, &ResourceFilter::named(id.clone()))
                    .await?;
                let attached = current.iter().any(|r| r.id == id && !r.is_unassociated());
                Ok(if attached { None } else { Some(()) })
            }
        })
        .await;
        outcome.is_ready()
    }

    /// NAT gateways keep their address allocations after deletion
    async fn release_nat_allocations(&self, gateways: &[CloudResource], log: &mut ActionLog) {
        for nat in gateways {
            for allocation in &nat.associations {
                let eip = CloudResource::new(ResourceKind::ElasticIp, allocation.clone());
                self.delete_one(ResourceKind::ElasticIp, &eip, ActionType::Release, log)
                    .await;
            }
        }
    }
}

fn detaches_before_delete(kind: ResourceKind) -> bool {
    matches!(
        kind,
        ResourceKind::InternetGateway
            | ResourceKind::RouteTable
            | ResourceKind::InstanceProfile
            | ResourceKind::IamRole
            | ResourceKind::EventRule
    )
}

fn summary(stage: CleanupStage, discovered: usize, log: &ActionLog) -> StageSummary {
    StageSummary {
        number: stage.number,
        name: stage.name,
        discovered,
        deleted: log.succeeded.iter().filter(|r| r.action_type != ActionType::Detach).count(),
        failed: log.failed.len(),
        skipped: log.skipped.len(),
    }
}

pub(crate) async fn wait_until_gone(
    cloud: &Arc<dyn CloudInspector>,
    poll: &PollConfig,
    kind: ResourceKind,
    ids: Vec<String>,
    label: &str,
) -> PollOutcome<()> {
    poll_until(poll, label, || {
        let cloud = Arc::clone(cloud);
        let ids = ids.clone();
        async move {
            let remaining = cloud.describe(kind, &ResourceFilter::all()).await?;
            let pending = remaining
                .iter()
                .any(|r| ids.contains(&r.id) && !is_gone_status(r.status.as_deref()));
            Ok(if pending { None } else { Some(()) })
        }
    })
    .await
}
