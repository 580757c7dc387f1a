//! Address range overlap between the requested network and existing ones

use super::strategy::write_manual_report;
use super::{
    Attempt, CidrCollision, Conflict, ConflictDetail, ConflictKind, ConflictProbe, ConflictScope,
    Destructiveness, RemediationChain, RemediationStrategy, is_tracked, tracked_keys,
};
use crate::context::RunContext;
use crate::error::{CoreError, Result};
use crate::report::ManualOption;
use async_trait::async_trait;
use gpufleet_cloud::{CloudResource, ResourceFilter, ResourceKind};
use serde_json::Value;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// IPv4 block in CIDR notation, stored normalised to its network address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    base: u32,
    prefix: u8,
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

impl Ipv4Cidr {
    pub fn new(addr: u32, prefix: u8) -> Self {
        let prefix = prefix.min(32);
        Self {
            base: addr & mask(prefix),
            prefix,
        }
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Number of addresses in the block
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix))
    }

    fn last(&self) -> u32 {
        self.base | !mask(self.prefix)
    }

    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.base <= other.last() && other.base <= self.last()
    }

    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix >= self.prefix && other.base & mask(self.prefix) == self.base
    }

    /// Same offset inside `to` as `self` has inside `from`
    pub fn rebase(&self, from: &Ipv4Cidr, to: &Ipv4Cidr) -> Option<Ipv4Cidr> {
        if !from.contains(self) || to.prefix != from.prefix {
            return None;
        }
        Some(Ipv4Cidr::new(to.base + (self.base - from.base), self.prefix))
    }
}

impl FromStr for Ipv4Cidr {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CoreError::InvalidCidr(s.to_string());
        let (addr, prefix) = s.trim().split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        if prefix > 32 {
            return Err(invalid());
        }
        Ok(Ipv4Cidr::new(u32::from(addr), prefix))
    }
}

impl std::fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", Ipv4Addr::from(self.base), self.prefix)
    }
}

const PRIVATE_RANGES: [&str; 3] = ["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16"];
const MAX_POOL: usize = 64;

/// Fixed pool of same-size alternates inside the requested block's
/// private range (or its /8). Stride is ten blocks when the range is
/// large enough for that to give a useful pool, one block otherwise.
pub fn candidate_pool(requested: &Ipv4Cidr) -> Vec<Ipv4Cidr> {
    let parent = PRIVATE_RANGES
        .iter()
        .filter_map(|r| r.parse::<Ipv4Cidr>().ok())
        .find(|r| r.contains(requested))
        .unwrap_or_else(|| Ipv4Cidr::new(requested.base, requested.prefix.min(8)));

    let block = requested.size();
    let span = parent.size();
    let stride = if span / (block * 10) >= 8 { block * 10 } else { block };

    let mut pool = Vec::new();
    let mut offset = 0u64;
    while offset + block <= span && pool.len() < MAX_POOL {
        let candidate = Ipv4Cidr::new((u64::from(parent.base) + offset) as u32, requested.prefix);
        if candidate != *requested {
            pool.push(candidate);
        }
        offset += stride;
    }
    pool
}

/// Parsed address blocks of untracked networks, unparsable ones skipped
fn network_blocks(networks: &[CloudResource]) -> Vec<(&CloudResource, String, Ipv4Cidr)> {
    let mut blocks = Vec::new();
    for network in networks {
        for block in &network.cidr_blocks {
            match block.parse::<Ipv4Cidr>() {
                Ok(cidr) => blocks.push((network, block.clone(), cidr)),
                Err(_) => {
                    tracing::warn!(network = %network.id, block = %block, "skipping unparsable range")
                }
            }
        }
    }
    blocks
}

async fn untracked_networks(ctx: &RunContext) -> Result<Vec<CloudResource>> {
    let tracked = tracked_keys(ctx).await?;
    Ok(ctx
        .cloud
        .describe(ResourceKind::Vpc, &ResourceFilter::all())
        .await?
        .into_iter()
        .filter(|n| !is_tracked(&tracked, n))
        .collect())
}

pub struct CidrProbe;

#[async_trait]
impl ConflictProbe for CidrProbe {
    fn name(&self) -> String {
        "network-ranges".to_string()
    }

    fn kind(&self) -> ConflictKind {
        ConflictKind::CidrOverlap
    }

    fn scope(&self) -> ConflictScope {
        ConflictScope::new(ResourceKind::Vpc.label(), "requested-ranges")
    }

    async fn inspect(&self, ctx: &RunContext) -> Result<Option<Conflict>> {
        let vars = ctx.var_file()?;
        let net = &ctx.settings.network;

        if vars.get_str(&net.existing_vpc_var).is_some_and(|v| !v.is_empty()) {
            return Ok(None);
        }
        let Some(vpc_cidr) = vars.get_str(&net.vpc_cidr_var).map(String::from) else {
            tracing::debug!(var = %net.vpc_cidr_var, "no requested range");
            return Ok(None);
        };
        let requested: Ipv4Cidr = vpc_cidr.parse()?;

        let networks = untracked_networks(ctx).await?;
        let collisions: Vec<CidrCollision> = network_blocks(&networks)
            .into_iter()
            .filter(|(_, _, cidr)| cidr.overlaps(&requested))
            .map(|(network, block, _)| CidrCollision {
                requested: vpc_cidr.clone(),
                network_id: network.id.clone(),
                existing_cidr: block,
                is_default: network.is_default,
            })
            .collect();

        if collisions.is_empty() {
            return Ok(None);
        }

        let mut ranges = vec![vpc_cidr];
        ranges.extend(vars.get_str_list(&net.subnet_cidrs_var));
        Ok(Some(Conflict {
            kind: ConflictKind::CidrOverlap,
            scope: self.scope(),
            detail: ConflictDetail::Cidr {
                requested: ranges,
                collisions,
            },
        }))
    }

    fn chain(&self) -> RemediationChain {
        RemediationChain::new(vec![
            Box::new(ReuseExistingNetwork),
            Box::new(SelectAlternateRanges),
            Box::new(ReportCidrConflict),
        ])
    }
}

/// Reuse the one network every collision lives in, if it can reach the
/// internet already
pub struct ReuseExistingNetwork;

fn single_network(collisions: &[CidrCollision]) -> Option<&CidrCollision> {
    let first = collisions.first()?;
    let ids: HashSet<&str> = collisions.iter().map(|c| c.network_id.as_str()).collect();
    (ids.len() == 1 && !first.is_default).then_some(first)
}

#[async_trait]
impl RemediationStrategy for ReuseExistingNetwork {
    fn name(&self) -> &'static str {
        "reuse-existing-network"
    }

    fn destructiveness(&self) -> Destructiveness {
        Destructiveness::Reuse
    }

    fn applies(&self, conflict: &Conflict) -> bool {
        matches!(&conflict.detail, ConflictDetail::Cidr { collisions, .. } if single_network(collisions).is_some())
    }

    async fn attempt(&self, ctx: &RunContext, conflict: &Conflict) -> Result<Attempt> {
        let ConflictDetail::Cidr { collisions, .. } = &conflict.detail else {
            return Ok(Attempt::not_applicable("not a range conflict"));
        };
        let Some(collision) = single_network(collisions) else {
            return Ok(Attempt::not_applicable("collisions span several networks"));
        };
        let network = &collision.network_id;

        let gateways = ctx
            .cloud
            .describe(ResourceKind::InternetGateway, &ResourceFilter::all())
            .await?;
        if !gateways.iter().any(|g| g.associations.contains(network)) {
            return Ok(Attempt::not_applicable(format!(
                "{} has no internet gateway attached",
                network
            )));
        }

        let subnets = ctx
            .cloud
            .describe(
                ResourceKind::Subnet,
                &ResourceFilter::all().in_network(network.clone()),
            )
            .await?;
        let subnet_ids: Vec<String> = subnets.iter().map(|s| s.id.clone()).collect();
        let subnet_cidrs: Vec<String> = subnets
            .iter()
            .flat_map(|s| s.cidr_blocks.iter().cloned())
            .collect();

        let net = &ctx.settings.network;
        let mut vars = ctx.var_file()?;
        vars.set(&net.existing_vpc_var, network.clone());
        vars.set(&net.existing_subnets_var, Value::from(subnet_ids));
        vars.set(&net.vpc_cidr_var, collision.existing_cidr.clone());
        if !subnet_cidrs.is_empty() {
            vars.set(&net.subnet_cidrs_var, Value::from(subnet_cidrs));
        }
        let edit = vars.save()?;

        Ok(Attempt::resolved(format!("reusing network {}", network)).with_edit(edit))
    }
}

/// Move the requested network (and its subnets) to free ranges
pub struct SelectAlternateRanges;

#[async_trait]
impl RemediationStrategy for SelectAlternateRanges {
    fn name(&self) -> &'static str {
        "select-alternate-ranges"
    }

    fn destructiveness(&self) -> Destructiveness {
        Destructiveness::Rename
    }

    fn applies(&self, conflict: &Conflict) -> bool {
        matches!(conflict.detail, ConflictDetail::Cidr { .. })
    }

    async fn attempt(&self, ctx: &RunContext, _conflict: &Conflict) -> Result<Attempt> {
        let net = &ctx.settings.network;
        let mut vars = ctx.var_file()?;
        let Some(current) = vars.get_str(&net.vpc_cidr_var).map(String::from) else {
            return Ok(Attempt::not_applicable("no requested range in the variable file"));
        };
        let requested: Ipv4Cidr = current.parse()?;

        let networks = untracked_networks(ctx).await?;
        let taken: Vec<Ipv4Cidr> = network_blocks(&networks)
            .into_iter()
            .map(|(_, _, cidr)| cidr)
            .collect();

        let Some(chosen) = candidate_pool(&requested)
            .into_iter()
            .find(|c| !taken.iter().any(|t| t.overlaps(c)))
        else {
            return Ok(Attempt::failed(format!(
                "no free /{} left in the candidate pool",
                requested.prefix()
            )));
        };

        let mut subnets = Vec::new();
        for subnet in vars.get_str_list(&net.subnet_cidrs_var) {
            let parsed: Ipv4Cidr = subnet.parse()?;
            match parsed.rebase(&requested, &chosen) {
                Some(moved) => subnets.push(moved.to_string()),
                None => {
                    return Ok(Attempt::failed(format!(
                        "subnet {} lies outside {}",
                        subnet, requested
                    )));
                }
            }
        }

        vars.set(&net.vpc_cidr_var, chosen.to_string());
        if !subnets.is_empty() {
            vars.set(&net.subnet_cidrs_var, Value::from(subnets));
        }
        let edit = vars.save()?;

        Ok(Attempt::resolved(format!("network range {} -> {}", requested, chosen)).with_edit(edit))
    }
}

/// Terminal: the colliding ranges and the manual options
pub struct ReportCidrConflict;

#[async_trait]
impl RemediationStrategy for ReportCidrConflict {
    fn name(&self) -> &'static str {
        "report-cidr-conflict"
    }

    fn destructiveness(&self) -> Destructiveness {
        Destructiveness::Manual
    }

    fn applies(&self, conflict: &Conflict) -> bool {
        matches!(conflict.detail, ConflictDetail::Cidr { .. })
    }

    async fn attempt(&self, ctx: &RunContext, conflict: &Conflict) -> Result<Attempt> {
        let ConflictDetail::Cidr { collisions, .. } = &conflict.detail else {
            return Ok(Attempt::not_applicable("not a range conflict"));
        };
        let region = ctx.cloud.region();
        let net = &ctx.settings.network;
        let var_file = ctx.settings.var_file();

        let mut networks: Vec<&str> = collisions.iter().map(|c| c.network_id.as_str()).collect();
        networks.dedup();

        let options = vec![
            ManualOption::new(
                "Delete the colliding networks if they are unused",
                networks
                    .iter()
                    .map(|n| format!("aws ec2 delete-vpc --vpc-id {} --region {}", n, region))
                    .collect(),
            ),
            ManualOption::new(
                "Reuse an existing network",
                vec![format!(
                    "set \"{}\" and \"{}\" in {}",
                    net.existing_vpc_var,
                    net.existing_subnets_var,
                    var_file.display()
                )],
            ),
            ManualOption::new(
                "Pick explicit alternate ranges",
                vec![
                    format!("aws ec2 describe-vpcs --query 'Vpcs[].CidrBlock' --region {}", region),
                    format!(
                        "set \"{}\" and \"{}\" in {}",
                        net.vpc_cidr_var,
                        net.subnet_cidrs_var,
                        var_file.display()
                    ),
                ],
            ),
        ];

        write_manual_report(ctx, conflict, options).await
    }
}
