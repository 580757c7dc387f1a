//! Provider-neutral description of cloud resources
//!
//! Every adapter parses its provider output into [`CloudResource`] values
//! once, at the boundary. Nothing above the adapter layer looks at raw
//! command output.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Resource types the orchestrator reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    AutoScalingGroup,
    Instance,
    LoadBalancer,
    TargetGroup,
    NatGateway,
    ElasticIp,
    VpcEndpoint,
    VpcPeering,
    TransitGatewayAttachment,
    DataStore,
    Function,
    NetworkInterface,
    Subnet,
    RouteTable,
    SecurityGroup,
    NetworkAcl,
    InternetGateway,
    Vpc,
    LogGroup,
    EventRule,
    InstanceProfile,
    IamRole,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 22] = [
        ResourceKind::AutoScalingGroup,
        ResourceKind::Instance,
        ResourceKind::LoadBalancer,
        ResourceKind::TargetGroup,
        ResourceKind::NatGateway,
        ResourceKind::ElasticIp,
        ResourceKind::VpcEndpoint,
        ResourceKind::VpcPeering,
        ResourceKind::TransitGatewayAttachment,
        ResourceKind::DataStore,
        ResourceKind::Function,
        ResourceKind::NetworkInterface,
        ResourceKind::Subnet,
        ResourceKind::RouteTable,
        ResourceKind::SecurityGroup,
        ResourceKind::NetworkAcl,
        ResourceKind::InternetGateway,
        ResourceKind::Vpc,
        ResourceKind::LogGroup,
        ResourceKind::EventRule,
        ResourceKind::InstanceProfile,
        ResourceKind::IamRole,
    ];

    /// Short label used in logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::AutoScalingGroup => "auto-scaling-group",
            ResourceKind::Instance => "instance",
            ResourceKind::LoadBalancer => "load-balancer",
            ResourceKind::TargetGroup => "target-group",
            ResourceKind::NatGateway => "nat-gateway",
            ResourceKind::ElasticIp => "elastic-ip",
            ResourceKind::VpcEndpoint => "vpc-endpoint",
            ResourceKind::VpcPeering => "vpc-peering",
            ResourceKind::TransitGatewayAttachment => "transit-gateway-attachment",
            ResourceKind::DataStore => "data-store",
            ResourceKind::Function => "function",
            ResourceKind::NetworkInterface => "network-interface",
            ResourceKind::Subnet => "subnet",
            ResourceKind::RouteTable => "route-table",
            ResourceKind::SecurityGroup => "security-group",
            ResourceKind::NetworkAcl => "network-acl",
            ResourceKind::InternetGateway => "internet-gateway",
            ResourceKind::Vpc => "vpc",
            ResourceKind::LogGroup => "log-group",
            ResourceKind::EventRule => "event-rule",
            ResourceKind::InstanceProfile => "instance-profile",
            ResourceKind::IamRole => "iam-role",
        }
    }

    /// Kinds a live resource of this kind can still hold a reference to.
    ///
    /// A resource must be deleted before anything listed here.
    pub fn dependencies(&self) -> &'static [ResourceKind] {
        use ResourceKind::*;
        match self {
            AutoScalingGroup => &[
                LoadBalancer,
                TargetGroup,
                Subnet,
                SecurityGroup,
                InstanceProfile,
            ],
            Instance => &[NetworkInterface, Subnet, SecurityGroup, InstanceProfile],
            LoadBalancer => &[TargetGroup, ElasticIp, Subnet, SecurityGroup],
            TargetGroup => &[Vpc],
            NatGateway => &[ElasticIp, Subnet],
            ElasticIp => &[],
            VpcEndpoint => &[Subnet, RouteTable, SecurityGroup, Vpc],
            VpcPeering => &[Vpc],
            TransitGatewayAttachment => &[Subnet, Vpc],
            DataStore => &[Subnet, SecurityGroup],
            Function => &[Subnet, SecurityGroup, LogGroup, IamRole],
            NetworkInterface => &[Subnet, SecurityGroup],
            Subnet => &[Vpc],
            RouteTable => &[InternetGateway, Vpc],
            SecurityGroup => &[Vpc],
            NetworkAcl => &[Vpc],
            InternetGateway => &[Vpc],
            Vpc => &[],
            LogGroup => &[],
            EventRule => &[IamRole],
            InstanceProfile => &[IamRole],
            IamRole => &[],
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Structured existence facts about one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudResource {
    /// Resource type
    pub kind: ResourceKind,

    /// Provider-specific resource ID
    pub id: String,

    /// Human name (name field or `Name` tag)
    pub name: Option<String>,

    /// Tags as reported by the provider
    pub tags: HashMap<String, String>,

    /// IDs of things attached to or associated with this resource
    /// (EIP association, ENI attachment, IGW attachment, role policies...)
    pub associations: Vec<String>,

    /// Address ranges owned by this resource (VPC and subnet blocks)
    pub cidr_blocks: Vec<String>,

    /// Owning network, if any
    pub network_id: Option<String>,

    /// Availability zone, if any
    pub zone: Option<String>,

    /// Provider-created default (default VPC, main route table, default SG...)
    pub is_default: bool,

    /// Provider lifecycle status (running, available, deleting...)
    pub status: Option<String>,
}

impl CloudResource {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            name: None,
            tags: HashMap::new(),
            associations: Vec::new(),
            cidr_blocks: Vec::new(),
            network_id: None,
            zone: None,
            is_default: false,
            status: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_association(mut self, association: impl Into<String>) -> Self {
        self.associations.push(association.into());
        self
    }

    pub fn with_cidr(mut self, cidr: impl Into<String>) -> Self {
        self.cidr_blocks.push(cidr.into());
        self
    }

    pub fn with_network(mut self, network_id: impl Into<String>) -> Self {
        self.network_id = Some(network_id.into());
        self
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// True when nothing is attached to the resource
    pub fn is_unassociated(&self) -> bool {
        self.associations.is_empty()
    }

    /// Name if known, ID otherwise
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Which resources a describe call should return
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Every resource of the kind in the region
    All,
    /// Exactly this name (or ID)
    Named(String),
    /// The project's naming/tag convention: the name is `prefix` or
    /// starts with `prefix-`, or the resource carries the tag. Names under
    /// an `exclude` prefix belong to someone else.
    Convention {
        prefix: String,
        tag: Option<(String, String)>,
        exclude: Vec<String>,
    },
}

/// Filter for [`crate::CloudInspector::describe`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFilter {
    pub selector: Selector,
    pub network_id: Option<String>,
}

impl ResourceFilter {
    pub fn all() -> Self {
        Self {
            selector: Selector::All,
            network_id: None,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            selector: Selector::Named(name.into()),
            network_id: None,
        }
    }

    pub fn convention(prefix: impl Into<String>, tag: Option<(String, String)>) -> Self {
        Self {
            selector: Selector::Convention {
                prefix: prefix.into(),
                tag,
                exclude: Vec::new(),
            },
            network_id: None,
        }
    }

    /// Leave out names under other prefixes that extend this one
    /// (`gpu-dev-eu` under `gpu-dev`); no effect on other selectors
    pub fn excluding<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Selector::Convention { ref mut exclude, .. } = self.selector {
            exclude.extend(prefixes.into_iter().map(Into::into));
        }
        self
    }

    pub fn in_network(mut self, network_id: impl Into<String>) -> Self {
        self.network_id = Some(network_id.into());
        self
    }

    pub fn matches(&self, resource: &CloudResource) -> bool {
        if let Some(ref network) = self.network_id {
            let in_network = resource.network_id.as_deref() == Some(network.as_str())
                || (resource.kind == ResourceKind::Vpc && resource.id == *network);
            if !in_network {
                return false;
            }
        }

        match &self.selector {
            Selector::All => true,
            Selector::Named(name) => {
                resource.name.as_deref() == Some(name.as_str()) || resource.id == *name
            }
            Selector::Convention {
                prefix,
                tag,
                exclude,
            } => {
                let by_name = resource.name.as_deref().is_some_and(|n| {
                    has_name_prefix(n, prefix) && !exclude.iter().any(|e| has_name_prefix(n, e))
                });
                let by_tag = tag
                    .as_ref()
                    .is_some_and(|(k, v)| resource.tags.get(k) == Some(v));
                by_name || by_tag
            }
        }
    }
}

/// `name` is `prefix` itself or `prefix-<more>`
pub fn has_name_prefix(name: &str, prefix: &str) -> bool {
    match name.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('-'),
        None => false,
    }
}
