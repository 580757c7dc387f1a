//! Typed views of `aws ... --output json` responses
//!
//! Each describe response is converted into [`CloudResource`] values here,
//! once. Field names follow the AWS API (PascalCase, except CloudWatch Logs).

use gpufleet_cloud::{CloudResource, ResourceKind};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Tag {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value", default)]
    pub value: String,
}

fn apply_tags(mut resource: CloudResource, tags: &[Tag]) -> CloudResource {
    for tag in tags {
        if tag.key == "Name" && resource.name.is_none() && !tag.value.is_empty() {
            resource.name = Some(tag.value.clone());
        }
        resource.tags.insert(tag.key.clone(), tag.value.clone());
    }
    resource
}

#[derive(Debug, Deserialize)]
pub struct CallerIdentity {
    #[serde(rename = "Account")]
    pub account: String,
    #[serde(rename = "Arn")]
    pub arn: String,
}

// ---- EC2 networking ----

#[derive(Debug, Deserialize)]
pub struct VpcList {
    #[serde(rename = "Vpcs", default)]
    pub vpcs: Vec<Vpc>,
}

#[derive(Debug, Deserialize)]
pub struct Vpc {
    #[serde(rename = "VpcId")]
    pub vpc_id: String,
    #[serde(rename = "CidrBlock")]
    pub cidr_block: Option<String>,
    #[serde(rename = "CidrBlockAssociationSet", default)]
    pub cidr_associations: Vec<CidrAssociation>,
    #[serde(rename = "IsDefault", default)]
    pub is_default: bool,
    #[serde(rename = "State")]
    pub state: Option<String>,
    #[serde(rename = "Tags", default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
pub struct CidrAssociation {
    #[serde(rename = "CidrBlock")]
    pub cidr_block: String,
}

impl Vpc {
    pub fn into_resource(self) -> CloudResource {
        let mut resource = CloudResource::new(ResourceKind::Vpc, &self.vpc_id);
        let mut cidrs: Vec<String> = self
            .cidr_associations
            .into_iter()
            .map(|a| a.cidr_block)
            .collect();
        if let Some(primary) = self.cidr_block
            && !cidrs.contains(&primary)
        {
            cidrs.insert(0, primary);
        }
        resource.cidr_blocks = cidrs;
        resource.network_id = Some(self.vpc_id);
        resource.is_default = self.is_default;
        resource.status = self.state;
        apply_tags(resource, &self.tags)
    }
}

#[derive(Debug, Deserialize)]
pub struct SubnetList {
    #[serde(rename = "Subnets", default)]
    pub subnets: Vec<Subnet>,
}

#[derive(Debug, Deserialize)]
pub struct Subnet {
    #[serde(rename = "SubnetId")]
    pub subnet_id: String,
    #[serde(rename = "VpcId")]
    pub vpc_id: String,
    #[serde(rename = "CidrBlock")]
    pub cidr_block: Option<String>,
    #[serde(rename = "AvailabilityZone")]
    pub availability_zone: Option<String>,
    #[serde(rename = "DefaultForAz", default)]
    pub default_for_az: bool,
    #[serde(rename = "State")]
    pub state: Option<String>,
    #[serde(rename = "Tags", default)]
    pub tags: Vec<Tag>,
}

impl Subnet {
    pub fn into_resource(self) -> CloudResource {
        let mut resource =
            CloudResource::new(ResourceKind::Subnet, self.subnet_id).with_network(self.vpc_id);
        resource.cidr_blocks = self.cidr_block.into_iter().collect();
        resource.zone = self.availability_zone;
        resource.is_default = self.default_for_az;
        resource.status = self.state;
        apply_tags(resource, &self.tags)
    }
}

#[derive(Debug, Deserialize)]
pub struct AddressList {
    #[serde(rename = "Addresses", default)]
    pub addresses: Vec<Address>,
}

#[derive(Debug, Deserialize)]
pub struct Address {
    #[serde(rename = "AllocationId")]
    pub allocation_id: Option<String>,
    #[serde(rename = "PublicIp")]
    pub public_ip: Option<String>,
    #[serde(rename = "AssociationId")]
    pub association_id: Option<String>,
    #[serde(rename = "Tags", default)]
    pub tags: Vec<Tag>,
}

impl Address {
    /// EC2-Classic addresses have no allocation ID and are skipped
    pub fn into_resource(self) -> Option<CloudResource> {
        let allocation_id = self.allocation_id?;
        let mut resource = CloudResource::new(ResourceKind::ElasticIp, allocation_id);
        resource.associations = self.association_id.into_iter().collect();
        resource.status = self.public_ip;
        Some(apply_tags(resource, &self.tags))
    }
}

#[derive(Debug, Deserialize)]
pub struct NatGatewayList {
    #[serde(rename = "NatGateways", default)]
    pub nat_gateways: Vec<NatGateway>,
}

#[derive(Debug, Deserialize)]
pub struct NatGateway {
    #[serde(rename = "NatGatewayId")]
    pub nat_gateway_id: String,
    #[serde(rename = "VpcId")]
    pub vpc_id: Option<String>,
    #[serde(rename = "State")]
    pub state: Option<String>,
    #[serde(rename = "NatGatewayAddresses", default)]
    pub addresses: Vec<NatGatewayAddress>,
    #[serde(rename = "Tags", default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
pub struct NatGatewayAddress {
    #[serde(rename = "AllocationId")]
    pub allocation_id: Option<String>,
}

impl NatGateway {
    pub fn into_resource(self) -> CloudResource {
        let mut resource = CloudResource::new(ResourceKind::NatGateway, self.nat_gateway_id);
        resource.network_id = self.vpc_id;
        // Addresses the gateway holds; released after the gateway is gone
        resource.associations = self
            .addresses
            .into_iter()
            .filter_map(|a| a.allocation_id)
            .collect();
        resource.status = self.state;
        apply_tags(resource, &self.tags)
    }
}

#[derive(Debug, Deserialize)]
pub struct InternetGatewayList {
    #[serde(rename = "InternetGateways", default)]
    pub internet_gateways: Vec<InternetGateway>,
}

#[derive(Debug, Deserialize)]
pub struct InternetGateway {
    #[serde(rename = "InternetGatewayId")]
    pub internet_gateway_id: String,
    #[serde(rename = "Attachments", default)]
    pub attachments: Vec<IgwAttachment>,
    #[serde(rename = "Tags", default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
pub struct IgwAttachment {
    #[serde(rename = "VpcId")]
    pub vpc_id: String,
}

impl InternetGateway {
    pub fn into_resource(self) -> CloudResource {
        let mut resource =
            CloudResource::new(ResourceKind::InternetGateway, self.internet_gateway_id);
        resource.network_id = self.attachments.first().map(|a| a.vpc_id.clone());
        resource.associations = self.attachments.into_iter().map(|a| a.vpc_id).collect();
        apply_tags(resource, &self.tags)
    }
}

#[derive(Debug, Deserialize)]
pub struct RouteTableList {
    #[serde(rename = "RouteTables", default)]
    pub route_tables: Vec<RouteTable>,
}

#[derive(Debug, Deserialize)]
pub struct RouteTable {
    #[serde(rename = "RouteTableId")]
    pub route_table_id: String,
    #[serde(rename = "VpcId")]
    pub vpc_id: Option<String>,
    #[serde(rename = "Associations", default)]
    pub associations: Vec<RouteTableAssociation>,
    #[serde(rename = "Tags", default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
pub struct RouteTableAssociation {
    #[serde(rename = "RouteTableAssociationId")]
    pub association_id: String,
    #[serde(rename = "Main", default)]
    pub main: bool,
}

impl RouteTable {
    pub fn into_resource(self) -> CloudResource {
        let mut resource = CloudResource::new(ResourceKind::RouteTable, self.route_table_id);
        resource.network_id = self.vpc_id;
        resource.is_default = self.associations.iter().any(|a| a.main);
        resource.associations = self
            .associations
            .into_iter()
            .filter(|a| !a.main)
            .map(|a| a.association_id)
            .collect();
        apply_tags(resource, &self.tags)
    }
}

#[derive(Debug, Deserialize)]
pub struct SecurityGroupList {
    #[serde(rename = "SecurityGroups", default)]
    pub security_groups: Vec<SecurityGroup>,
}

#[derive(Debug, Deserialize)]
pub struct SecurityGroup {
    #[serde(rename = "GroupId")]
    pub group_id: String,
    #[serde(rename = "GroupName")]
    pub group_name: String,
    #[serde(rename = "VpcId")]
    pub vpc_id: Option<String>,
    #[serde(rename = "Tags", default)]
    pub tags: Vec<Tag>,
}

impl SecurityGroup {
    pub fn into_resource(self) -> CloudResource {
        let mut resource = CloudResource::new(ResourceKind::SecurityGroup, self.group_id);
        resource.is_default = self.group_name == "default";
        resource.name = Some(self.group_name);
        resource.network_id = self.vpc_id;
        apply_tags(resource, &self.tags)
    }
}

#[derive(Debug, Deserialize)]
pub struct NetworkAclList {
    #[serde(rename = "NetworkAcls", default)]
    pub network_acls: Vec<NetworkAcl>,
}

#[derive(Debug, Deserialize)]
pub struct NetworkAcl {
    #[serde(rename = "NetworkAclId")]
    pub network_acl_id: String,
    #[serde(rename = "VpcId")]
    pub vpc_id: Option<String>,
    #[serde(rename = "IsDefault", default)]
    pub is_default: bool,
    #[serde(rename = "Tags", default)]
    pub tags: Vec<Tag>,
}

impl NetworkAcl {
    pub fn into_resource(self) -> CloudResource {
        let mut resource = CloudResource::new(ResourceKind::NetworkAcl, self.network_acl_id);
        resource.network_id = self.vpc_id;
        resource.is_default = self.is_default;
        apply_tags(resource, &self.tags)
    }
}

#[derive(Debug, Deserialize)]
pub struct NetworkInterfaceList {
    #[serde(rename = "NetworkInterfaces", default)]
    pub network_interfaces: Vec<NetworkInterface>,
}

#[derive(Debug, Deserialize)]
pub struct NetworkInterface {
    #[serde(rename = "NetworkInterfaceId")]
    pub network_interface_id: String,
    #[serde(rename = "VpcId")]
    pub vpc_id: Option<String>,
    #[serde(rename = "AvailabilityZone")]
    pub availability_zone: Option<String>,
    #[serde(rename = "Status")]
    pub status: Option<String>,
    #[serde(rename = "Description")]
    pub description: Option<String>,
    #[serde(rename = "RequesterManaged", default)]
    pub requester_managed: bool,
    #[serde(rename = "Attachment")]
    pub attachment: Option<EniAttachment>,
    #[serde(rename = "TagSet", default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
pub struct EniAttachment {
    #[serde(rename = "AttachmentId")]
    pub attachment_id: Option<String>,
}

impl NetworkInterface {
    pub fn into_resource(self) -> CloudResource {
        let mut resource =
            CloudResource::new(ResourceKind::NetworkInterface, self.network_interface_id);
        resource.network_id = self.vpc_id;
        resource.zone = self.availability_zone;
        resource.status = self.status;
        // Interfaces owned by other services go away with their owner
        resource.is_default = self.requester_managed;
        resource.associations = self
            .attachment
            .and_then(|a| a.attachment_id)
            .into_iter()
            .collect();
        let resource = apply_tags(resource, &self.tags);
        match (resource.name.is_none(), self.description) {
            (true, Some(desc)) if !desc.is_empty() => resource.with_name(desc),
            _ => resource,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VpcEndpointList {
    #[serde(rename = "VpcEndpoints", default)]
    pub vpc_endpoints: Vec<VpcEndpoint>,
}

#[derive(Debug, Deserialize)]
pub struct VpcEndpoint {
    #[serde(rename = "VpcEndpointId")]
    pub vpc_endpoint_id: String,
    #[serde(rename = "VpcId")]
    pub vpc_id: Option<String>,
    #[serde(rename = "State")]
    pub state: Option<String>,
    #[serde(rename = "Tags", default)]
    pub tags: Vec<Tag>,
}

impl VpcEndpoint {
    pub fn into_resource(self) -> CloudResource {
        let mut resource = CloudResource::new(ResourceKind::VpcEndpoint, self.vpc_endpoint_id);
        resource.network_id = self.vpc_id;
        resource.status = self.state;
        apply_tags(resource, &self.tags)
    }
}

#[derive(Debug, Deserialize)]
pub struct VpcPeeringList {
    #[serde(rename = "VpcPeeringConnections", default)]
    pub connections: Vec<VpcPeering>,
}

#[derive(Debug, Deserialize)]
pub struct VpcPeering {
    #[serde(rename = "VpcPeeringConnectionId")]
    pub id: String,
    #[serde(rename = "RequesterVpcInfo")]
    pub requester: Option<PeeringVpcInfo>,
    #[serde(rename = "AccepterVpcInfo")]
    pub accepter: Option<PeeringVpcInfo>,
    #[serde(rename = "Status")]
    pub status: Option<StatusCode>,
    #[serde(rename = "Tags", default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
pub struct PeeringVpcInfo {
    #[serde(rename = "VpcId")]
    pub vpc_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusCode {
    #[serde(rename = "Code")]
    pub code: Option<String>,
}

impl VpcPeering {
    pub fn into_resource(self) -> CloudResource {
        let mut resource = CloudResource::new(ResourceKind::VpcPeering, self.id);
        resource.network_id = self.requester.and_then(|r| r.vpc_id);
        resource.associations = self
            .accepter
            .and_then(|a| a.vpc_id)
            .into_iter()
            .collect();
        resource.status = self.status.and_then(|s| s.code);
        apply_tags(resource, &self.tags)
    }
}

#[derive(Debug, Deserialize)]
pub struct TgwAttachmentList {
    #[serde(rename = "TransitGatewayVpcAttachments", default)]
    pub attachments: Vec<TgwAttachment>,
}

#[derive(Debug, Deserialize)]
pub struct TgwAttachment {
    #[serde(rename = "TransitGatewayAttachmentId")]
    pub id: String,
    #[serde(rename = "VpcId")]
    pub vpc_id: Option<String>,
    #[serde(rename = "State")]
    pub state: Option<String>,
    #[serde(rename = "Tags", default)]
    pub tags: Vec<Tag>,
}

impl TgwAttachment {
    pub fn into_resource(self) -> CloudResource {
        let mut resource = CloudResource::new(ResourceKind::TransitGatewayAttachment, self.id);
        resource.network_id = self.vpc_id;
        resource.status = self.state;
        apply_tags(resource, &self.tags)
    }
}

// ---- Compute ----

#[derive(Debug, Deserialize)]
pub struct ReservationList {
    #[serde(rename = "Reservations", default)]
    pub reservations: Vec<Reservation>,
}

#[derive(Debug, Deserialize)]
pub struct Reservation {
    #[serde(rename = "Instances", default)]
    pub instances: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
pub struct Instance {
    #[serde(rename = "InstanceId")]
    pub instance_id: String,
    #[serde(rename = "VpcId")]
    pub vpc_id: Option<String>,
    #[serde(rename = "State")]
    pub state: Option<InstanceState>,
    #[serde(rename = "Placement")]
    pub placement: Option<Placement>,
    #[serde(rename = "Tags", default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
pub struct InstanceState {
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct Placement {
    #[serde(rename = "AvailabilityZone")]
    pub availability_zone: Option<String>,
}

impl Instance {
    pub fn into_resource(self) -> CloudResource {
        let mut resource = CloudResource::new(ResourceKind::Instance, self.instance_id);
        resource.network_id = self.vpc_id;
        resource.status = self.state.map(|s| s.name);
        resource.zone = self.placement.and_then(|p| p.availability_zone);
        apply_tags(resource, &self.tags)
    }
}

#[derive(Debug, Deserialize)]
pub struct AutoScalingGroupList {
    #[serde(rename = "AutoScalingGroups", default)]
    pub groups: Vec<AutoScalingGroup>,
}

#[derive(Debug, Deserialize)]
pub struct AutoScalingGroup {
    #[serde(rename = "AutoScalingGroupName")]
    pub name: String,
    #[serde(rename = "Status")]
    pub status: Option<String>,
    #[serde(rename = "Instances", default)]
    pub instances: Vec<AsgInstance>,
    #[serde(rename = "Tags", default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
pub struct AsgInstance {
    #[serde(rename = "InstanceId")]
    pub instance_id: String,
}

impl AutoScalingGroup {
    pub fn into_resource(self) -> CloudResource {
        let mut resource =
            CloudResource::new(ResourceKind::AutoScalingGroup, &self.name).with_name(&self.name);
        resource.status = self.status;
        resource.associations = self.instances.into_iter().map(|i| i.instance_id).collect();
        apply_tags(resource, &self.tags)
    }
}

#[derive(Debug, Deserialize)]
pub struct LoadBalancerList {
    #[serde(rename = "LoadBalancers", default)]
    pub load_balancers: Vec<LoadBalancer>,
}

#[derive(Debug, Deserialize)]
pub struct LoadBalancer {
    #[serde(rename = "LoadBalancerArn")]
    pub arn: String,
    #[serde(rename = "LoadBalancerName")]
    pub name: String,
    #[serde(rename = "VpcId")]
    pub vpc_id: Option<String>,
    #[serde(rename = "State")]
    pub state: Option<StatusCode>,
}

impl LoadBalancer {
    pub fn into_resource(self) -> CloudResource {
        let mut resource = CloudResource::new(ResourceKind::LoadBalancer, self.arn).with_name(self.name);
        resource.network_id = self.vpc_id;
        resource.status = self.state.and_then(|s| s.code);
        resource
    }
}

#[derive(Debug, Deserialize)]
pub struct TargetGroupList {
    #[serde(rename = "TargetGroups", default)]
    pub target_groups: Vec<TargetGroup>,
}

#[derive(Debug, Deserialize)]
pub struct TargetGroup {
    #[serde(rename = "TargetGroupArn")]
    pub arn: String,
    #[serde(rename = "TargetGroupName")]
    pub name: String,
    #[serde(rename = "VpcId")]
    pub vpc_id: Option<String>,
    #[serde(rename = "LoadBalancerArns", default)]
    pub load_balancer_arns: Vec<String>,
}

impl TargetGroup {
    pub fn into_resource(self) -> CloudResource {
        let mut resource = CloudResource::new(ResourceKind::TargetGroup, self.arn).with_name(self.name);
        resource.network_id = self.vpc_id;
        resource.associations = self.load_balancer_arns;
        resource
    }
}

// ---- Data and functions ----

#[derive(Debug, Deserialize)]
pub struct DbInstanceList {
    #[serde(rename = "DBInstances", default)]
    pub db_instances: Vec<DbInstance>,
}

#[derive(Debug, Deserialize)]
pub struct DbInstance {
    #[serde(rename = "DBInstanceIdentifier")]
    pub identifier: String,
    #[serde(rename = "DBInstanceStatus")]
    pub status: Option<String>,
    #[serde(rename = "AvailabilityZone")]
    pub availability_zone: Option<String>,
    #[serde(rename = "DBSubnetGroup")]
    pub subnet_group: Option<DbSubnetGroup>,
    #[serde(rename = "TagList", default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
pub struct DbSubnetGroup {
    #[serde(rename = "VpcId")]
    pub vpc_id: Option<String>,
}

impl DbInstance {
    pub fn into_resource(self) -> CloudResource {
        let mut resource = CloudResource::new(ResourceKind::DataStore, &self.identifier)
            .with_name(&self.identifier);
        resource.status = self.status;
        resource.zone = self.availability_zone;
        resource.network_id = self.subnet_group.and_then(|g| g.vpc_id);
        apply_tags(resource, &self.tags)
    }
}

#[derive(Debug, Deserialize)]
pub struct FunctionList {
    #[serde(rename = "Functions", default)]
    pub functions: Vec<Function>,
}

#[derive(Debug, Deserialize)]
pub struct Function {
    #[serde(rename = "FunctionName")]
    pub name: String,
    #[serde(rename = "VpcConfig")]
    pub vpc_config: Option<FunctionVpcConfig>,
    #[serde(rename = "State")]
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FunctionVpcConfig {
    #[serde(rename = "VpcId")]
    pub vpc_id: Option<String>,
}

impl Function {
    pub fn into_resource(self) -> CloudResource {
        let mut resource =
            CloudResource::new(ResourceKind::Function, &self.name).with_name(&self.name);
        resource.network_id = self
            .vpc_config
            .and_then(|c| c.vpc_id)
            .filter(|v| !v.is_empty());
        resource.status = self.state;
        resource
    }
}

// ---- Logging, events, identity ----

#[derive(Debug, Deserialize)]
pub struct LogGroupList {
    #[serde(rename = "logGroups", default)]
    pub log_groups: Vec<LogGroup>,
}

#[derive(Debug, Deserialize)]
pub struct LogGroup {
    #[serde(rename = "logGroupName")]
    pub name: String,
}

impl LogGroup {
    pub fn into_resource(self) -> CloudResource {
        CloudResource::new(ResourceKind::LogGroup, &self.name).with_name(self.name)
    }
}

#[derive(Debug, Deserialize)]
pub struct EventRuleList {
    #[serde(rename = "Rules", default)]
    pub rules: Vec<EventRule>,
}

#[derive(Debug, Deserialize)]
pub struct EventRule {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "State")]
    pub state: Option<String>,
    #[serde(rename = "ManagedBy")]
    pub managed_by: Option<String>,
}

impl EventRule {
    pub fn into_resource(self) -> CloudResource {
        let mut resource =
            CloudResource::new(ResourceKind::EventRule, &self.name).with_name(self.name);
        resource.status = self.state;
        resource.is_default = self.managed_by.is_some();
        resource
    }
}

#[derive(Debug, Deserialize)]
pub struct EventTargetList {
    #[serde(rename = "Targets", default)]
    pub targets: Vec<EventTarget>,
}

#[derive(Debug, Deserialize)]
pub struct EventTarget {
    #[serde(rename = "Id")]
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleList {
    #[serde(rename = "Roles", default)]
    pub roles: Vec<Role>,
}

#[derive(Debug, Deserialize)]
pub struct Role {
    #[serde(rename = "RoleName")]
    pub role_name: String,
    #[serde(rename = "Path", default)]
    pub path: String,
}

impl Role {
    pub fn into_resource(self) -> CloudResource {
        let mut resource =
            CloudResource::new(ResourceKind::IamRole, &self.role_name).with_name(self.role_name);
        resource.is_default = self.path.starts_with("/aws-service-role/");
        resource
    }
}

#[derive(Debug, Deserialize)]
pub struct InstanceProfileList {
    #[serde(rename = "InstanceProfiles", default)]
    pub instance_profiles: Vec<InstanceProfile>,
}

#[derive(Debug, Deserialize)]
pub struct InstanceProfile {
    #[serde(rename = "InstanceProfileName")]
    pub name: String,
    #[serde(rename = "Roles", default)]
    pub roles: Vec<Role>,
}

impl InstanceProfile {
    pub fn into_resource(self) -> CloudResource {
        let mut resource =
            CloudResource::new(ResourceKind::InstanceProfile, &self.name).with_name(&self.name);
        resource.associations = self
            .roles
            .into_iter()
            .map(|r| format!("{}{}", ROLE_PREFIX, r.role_name))
            .collect();
        resource
    }
}

#[derive(Debug, Deserialize)]
pub struct AttachedPolicyList {
    #[serde(rename = "AttachedPolicies", default)]
    pub attached_policies: Vec<AttachedPolicy>,
}

#[derive(Debug, Deserialize)]
pub struct AttachedPolicy {
    #[serde(rename = "PolicyArn")]
    pub policy_arn: String,
}

#[derive(Debug, Deserialize)]
pub struct InlinePolicyList {
    #[serde(rename = "PolicyNames", default)]
    pub policy_names: Vec<String>,
}

/// Association prefixes for IAM resources
pub const POLICY_PREFIX: &str = "policy:";
pub const INLINE_PREFIX: &str = "inline:";
pub const PROFILE_PREFIX: &str = "profile:";
pub const ROLE_PREFIX: &str = "role:";

// ---- Quotas and placement ----

#[derive(Debug, Deserialize)]
pub struct ServiceQuotaResponse {
    #[serde(rename = "Quota")]
    pub quota: ServiceQuota,
}

#[derive(Debug, Deserialize)]
pub struct ServiceQuota {
    #[serde(rename = "Value")]
    pub value: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct InstanceTypeList {
    #[serde(rename = "InstanceTypes", default)]
    pub instance_types: Vec<InstanceTypeInfo>,
}

#[derive(Debug, Deserialize)]
pub struct InstanceTypeInfo {
    #[serde(rename = "InstanceType")]
    pub instance_type: String,
    #[serde(rename = "VCpuInfo")]
    pub vcpu_info: Option<VCpuInfo>,
}

#[derive(Debug, Deserialize)]
pub struct VCpuInfo {
    #[serde(rename = "DefaultVCpus")]
    pub default_vcpus: u32,
}

#[derive(Debug, Deserialize)]
pub struct InstanceTypeOfferingList {
    #[serde(rename = "InstanceTypeOfferings", default)]
    pub offerings: Vec<InstanceTypeOffering>,
}

#[derive(Debug, Deserialize)]
pub struct InstanceTypeOffering {
    #[serde(rename = "Location")]
    pub location: String,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityZoneList {
    #[serde(rename = "AvailabilityZones", default)]
    pub zones: Vec<AvailabilityZone>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityZone {
    #[serde(rename = "ZoneName")]
    pub zone_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vpc_cidrs_and_name_tag() {
        let json = r#"{"Vpcs": [{
            "VpcId": "vpc-1", "CidrBlock": "10.0.0.0/16", "IsDefault": false, "State": "available",
            "CidrBlockAssociationSet": [
                {"CidrBlock": "10.0.0.0/16"}, {"CidrBlock": "10.1.0.0/16"}
            ],
            "Tags": [{"Key": "Name", "Value": "gpu-dev-vpc"}, {"Key": "Project", "Value": "gpu"}]
        }]}"#;
        let list: VpcList = serde_json::from_str(json).unwrap();
        let vpc = list.vpcs.into_iter().next().unwrap().into_resource();

        assert_eq!(vpc.name.as_deref(), Some("gpu-dev-vpc"));
        assert_eq!(vpc.cidr_blocks, vec!["10.0.0.0/16", "10.1.0.0/16"]);
        assert_eq!(vpc.network_id.as_deref(), Some("vpc-1"));
        assert_eq!(vpc.tags.get("Project").map(String::as_str), Some("gpu"));
    }

    #[test]
    fn test_address_association() {
        let json = r#"{"Addresses": [
            {"AllocationId": "eipalloc-1", "PublicIp": "1.2.3.4", "AssociationId": "eipassoc-1"},
            {"AllocationId": "eipalloc-2", "PublicIp": "1.2.3.5"},
            {"PublicIp": "5.6.7.8"}
        ]}"#;
        let list: AddressList = serde_json::from_str(json).unwrap();
        let resources: Vec<_> = list
            .addresses
            .into_iter()
            .filter_map(Address::into_resource)
            .collect();

        assert_eq!(resources.len(), 2);
        assert!(!resources[0].is_unassociated());
        assert!(resources[1].is_unassociated());
    }

    #[test]
    fn test_main_route_table_is_default() {
        let json = r#"{"RouteTables": [{
            "RouteTableId": "rtb-1", "VpcId": "vpc-1",
            "Associations": [
                {"RouteTableAssociationId": "rtbassoc-main", "Main": true},
                {"RouteTableAssociationId": "rtbassoc-2", "Main": false, "SubnetId": "subnet-1"}
            ]
        }]}"#;
        let list: RouteTableList = serde_json::from_str(json).unwrap();
        let table = list.route_tables.into_iter().next().unwrap().into_resource();

        assert!(table.is_default);
        assert_eq!(table.associations, vec!["rtbassoc-2"]);
    }

    #[test]
    fn test_instance_profile_roles() {
        let json = r#"{"InstanceProfiles": [{
            "InstanceProfileName": "gpu-dev-profile",
            "Roles": [{"RoleName": "gpu-dev-node", "Path": "/"}]
        }]}"#;
        let list: InstanceProfileList = serde_json::from_str(json).unwrap();
        let profile = list.instance_profiles.into_iter().next().unwrap().into_resource();

        assert_eq!(profile.associations, vec!["role:gpu-dev-node"]);
    }

    #[test]
    fn test_service_linked_role_is_default() {
        let role = Role {
            role_name: "AWSServiceRoleForEC2Spot".to_string(),
            path: "/aws-service-role/spot.amazonaws.com/".to_string(),
        }
        .into_resource();
        assert!(role.is_default);
    }
}
