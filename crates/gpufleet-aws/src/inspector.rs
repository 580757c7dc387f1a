//! AWS implementation of [`CloudInspector`]

use crate::awscli::AwsCli;
use crate::types::{INLINE_PREFIX, POLICY_PREFIX, PROFILE_PREFIX, ROLE_PREFIX};
use async_trait::async_trait;
use gpufleet_cloud::{
    AuthStatus, CloudError, CloudInspector, CloudResource, ResourceFilter, ResourceKind, Result,
};

/// AWS provider backed by the aws CLI
pub struct AwsInspector {
    cli: AwsCli,
}

impl AwsInspector {
    pub fn new(region: impl Into<String>, profile: Option<String>) -> Self {
        Self {
            cli: AwsCli::new(region).with_profile(profile),
        }
    }

    async fn list(&self, kind: ResourceKind) -> Result<Vec<CloudResource>> {
        use ResourceKind::*;
        let cli = &self.cli;
        let resources = match kind {
            AutoScalingGroup => map(cli.describe_auto_scaling_groups().await?, |g| {
                g.into_resource()
            }),
            Instance => map(cli.describe_instances().await?, |i| i.into_resource()),
            LoadBalancer => map(cli.describe_load_balancers().await?, |l| l.into_resource()),
            TargetGroup => map(cli.describe_target_groups().await?, |t| t.into_resource()),
            NatGateway => map(cli.describe_nat_gateways().await?, |n| n.into_resource()),
            ElasticIp => cli
                .describe_addresses()
                .await?
                .into_iter()
                .filter_map(|a| a.into_resource())
                .collect(),
            VpcEndpoint => map(cli.describe_vpc_endpoints().await?, |e| e.into_resource()),
            VpcPeering => map(cli.describe_vpc_peerings().await?, |p| p.into_resource()),
            TransitGatewayAttachment => {
                map(cli.describe_tgw_attachments().await?, |a| a.into_resource())
            }
            DataStore => map(cli.describe_db_instances().await?, |d| d.into_resource()),
            Function => map(cli.list_functions().await?, |f| f.into_resource()),
            NetworkInterface => map(cli.describe_network_interfaces().await?, |n| {
                n.into_resource()
            }),
            Subnet => map(cli.describe_subnets().await?, |s| s.into_resource()),
            RouteTable => map(cli.describe_route_tables().await?, |r| r.into_resource()),
            SecurityGroup => map(cli.describe_security_groups().await?, |s| s.into_resource()),
            NetworkAcl => map(cli.describe_network_acls().await?, |n| n.into_resource()),
            InternetGateway => map(cli.describe_internet_gateways().await?, |i| {
                i.into_resource()
            }),
            Vpc => map(cli.describe_vpcs().await?, |v| v.into_resource()),
            LogGroup => map(cli.describe_log_groups().await?, |l| l.into_resource()),
            EventRule => map(cli.list_event_rules().await?, |r| r.into_resource()),
            InstanceProfile => map(cli.list_instance_profiles().await?, |p| p.into_resource()),
            IamRole => map(cli.list_roles().await?, |r| r.into_resource()),
        };
        Ok(resources)
    }
}

fn map<T>(items: Vec<T>, f: impl Fn(T) -> CloudResource) -> Vec<CloudResource> {
    items.into_iter().map(f).collect()
}

/// aws CLI arguments deleting one resource
pub fn delete_args(kind: ResourceKind, id: &str) -> Vec<String> {
    use ResourceKind::*;
    let args: &[&str] = match kind {
        AutoScalingGroup => &[
            "autoscaling",
            "delete-auto-scaling-group",
            "--force-delete",
            "--auto-scaling-group-name",
        ],
        Instance => &["ec2", "terminate-instances", "--instance-ids"],
        LoadBalancer => &["elbv2", "delete-load-balancer", "--load-balancer-arn"],
        TargetGroup => &["elbv2", "delete-target-group", "--target-group-arn"],
        NatGateway => &["ec2", "delete-nat-gateway", "--nat-gateway-id"],
        ElasticIp => &["ec2", "release-address", "--allocation-id"],
        VpcEndpoint => &["ec2", "delete-vpc-endpoints", "--vpc-endpoint-ids"],
        VpcPeering => &[
            "ec2",
            "delete-vpc-peering-connection",
            "--vpc-peering-connection-id",
        ],
        TransitGatewayAttachment => &[
            "ec2",
            "delete-transit-gateway-vpc-attachment",
            "--transit-gateway-attachment-id",
        ],
        DataStore => &[
            "rds",
            "delete-db-instance",
            "--skip-final-snapshot",
            "--delete-automated-backups",
            "--db-instance-identifier",
        ],
        Function => &["lambda", "delete-function", "--function-name"],
        NetworkInterface => &["ec2", "delete-network-interface", "--network-interface-id"],
        Subnet => &["ec2", "delete-subnet", "--subnet-id"],
        RouteTable => &["ec2", "delete-route-table", "--route-table-id"],
        SecurityGroup => &["ec2", "delete-security-group", "--group-id"],
        NetworkAcl => &["ec2", "delete-network-acl", "--network-acl-id"],
        InternetGateway => &["ec2", "delete-internet-gateway", "--internet-gateway-id"],
        Vpc => &["ec2", "delete-vpc", "--vpc-id"],
        LogGroup => &["logs", "delete-log-group", "--log-group-name"],
        EventRule => &["events", "delete-rule", "--name"],
        InstanceProfile => &[
            "iam",
            "delete-instance-profile",
            "--instance-profile-name",
        ],
        IamRole => &["iam", "delete-role", "--role-name"],
    };

    let mut out: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    out.push(id.to_string());
    out
}

/// aws CLI arguments removing one association; `None` when the kind has no
/// detach operation or the association is not recognised
pub fn detach_args(kind: ResourceKind, id: &str, association: &str) -> Option<Vec<String>> {
    use ResourceKind::*;
    let args: Vec<&str> = match kind {
        ElasticIp => vec!["ec2", "disassociate-address", "--association-id", association],
        NetworkInterface => vec![
            "ec2",
            "detach-network-interface",
            "--force",
            "--attachment-id",
            association,
        ],
        InternetGateway => vec![
            "ec2",
            "detach-internet-gateway",
            "--internet-gateway-id",
            id,
            "--vpc-id",
            association,
        ],
        RouteTable => vec!["ec2", "disassociate-route-table", "--association-id", association],
        EventRule => vec!["events", "remove-targets", "--rule", id, "--ids", association],
        InstanceProfile => {
            let role = association.strip_prefix(ROLE_PREFIX)?;
            vec![
                "iam",
                "remove-role-from-instance-profile",
                "--instance-profile-name",
                id,
                "--role-name",
                role,
            ]
        }
        IamRole => {
            if let Some(arn) = association.strip_prefix(POLICY_PREFIX) {
                vec!["iam", "detach-role-policy", "--role-name", id, "--policy-arn", arn]
            } else if let Some(name) = association.strip_prefix(INLINE_PREFIX) {
                vec!["iam", "delete-role-policy", "--role-name", id, "--policy-name", name]
            } else if let Some(profile) = association.strip_prefix(PROFILE_PREFIX) {
                vec![
                    "iam",
                    "remove-role-from-instance-profile",
                    "--instance-profile-name",
                    profile,
                    "--role-name",
                    id,
                ]
            } else {
                return None;
            }
        }
        _ => return None,
    };
    Some(args.into_iter().map(String::from).collect())
}

#[async_trait]
impl CloudInspector for AwsInspector {
    fn name(&self) -> &str {
        "aws"
    }

    fn region(&self) -> &str {
        self.cli.region()
    }

    fn engine_type(&self, kind: ResourceKind) -> &'static str {
        use ResourceKind::*;
        match kind {
            AutoScalingGroup => "aws_autoscaling_group",
            Instance => "aws_instance",
            LoadBalancer => "aws_lb",
            TargetGroup => "aws_lb_target_group",
            NatGateway => "aws_nat_gateway",
            ElasticIp => "aws_eip",
            VpcEndpoint => "aws_vpc_endpoint",
            VpcPeering => "aws_vpc_peering_connection",
            TransitGatewayAttachment => "aws_ec2_transit_gateway_vpc_attachment",
            DataStore => "aws_db_instance",
            Function => "aws_lambda_function",
            NetworkInterface => "aws_network_interface",
            Subnet => "aws_subnet",
            RouteTable => "aws_route_table",
            SecurityGroup => "aws_security_group",
            NetworkAcl => "aws_network_acl",
            InternetGateway => "aws_internet_gateway",
            Vpc => "aws_vpc",
            LogGroup => "aws_cloudwatch_log_group",
            EventRule => "aws_cloudwatch_event_rule",
            InstanceProfile => "aws_iam_instance_profile",
            IamRole => "aws_iam_role",
        }
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        if let Err(e) = self.cli.check_installed().await {
            return Ok(AuthStatus::failed(e.to_string()));
        }

        match self.cli.caller_identity().await {
            Ok(identity) => Ok(AuthStatus::ok(format!(
                "{} ({})",
                identity.account, identity.arn
            ))),
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn describe(
        &self,
        kind: ResourceKind,
        filter: &ResourceFilter,
    ) -> Result<Vec<CloudResource>> {
        let mut matched: Vec<CloudResource> = self
            .list(kind)
            .await?
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect();

        // Associations that need a call per resource
        match kind {
            ResourceKind::IamRole => {
                for role in matched.iter_mut().filter(|r| !r.is_default) {
                    role.associations = self.cli.role_attachments(&role.id).await?;
                }
            }
            ResourceKind::EventRule => {
                for rule in matched.iter_mut() {
                    rule.associations = self.cli.list_event_targets(&rule.id).await?;
                }
            }
            _ => {}
        }

        tracing::debug!(kind = %kind, count = matched.len(), "described resources");
        Ok(matched)
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<()> {
        let args = delete_args(kind, id);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.cli.run(&refs).await?;
        tracing::info!(kind = %kind, resource_id = %id, "deleted");
        Ok(())
    }

    async fn detach(&self, kind: ResourceKind, id: &str, association: &str) -> Result<()> {
        let args = detach_args(kind, id, association).ok_or_else(|| {
            CloudError::Unsupported(format!("detach {} from {} {}", association, kind, id))
        })?;
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.cli.run(&refs).await?;
        tracing::info!(kind = %kind, resource_id = %id, association = %association, "detached");
        Ok(())
    }

    async fn service_quota(&self, service_code: &str, quota_code: &str) -> Result<Option<u32>> {
        Ok(self.cli.service_quota(service_code, quota_code).await?)
    }

    async fn instance_vcpus(&self, instance_type: &str) -> Result<Option<u32>> {
        Ok(self.cli.instance_vcpus(instance_type).await?)
    }

    async fn zones_offering(&self, instance_type: &str) -> Result<Vec<String>> {
        Ok(self.cli.zones_offering(instance_type).await?)
    }

    async fn available_zones(&self) -> Result<Vec<String>> {
        Ok(self.cli.available_zones().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_type_round_trip() {
        let inspector = AwsInspector::new("us-east-1", None);
        for kind in ResourceKind::ALL {
            let engine_type = inspector.engine_type(kind);
            assert_eq!(inspector.kind_for_engine_type(engine_type), Some(kind));
        }
        assert_eq!(inspector.kind_for_engine_type("aws_ami"), None);
    }

    #[test]
    fn test_delete_args_end_with_id() {
        for kind in ResourceKind::ALL {
            let args = delete_args(kind, "res-1");
            assert_eq!(args.last().map(String::as_str), Some("res-1"));
        }
        assert_eq!(
            delete_args(ResourceKind::ElasticIp, "eipalloc-1"),
            vec!["ec2", "release-address", "--allocation-id", "eipalloc-1"]
        );
    }

    #[test]
    fn test_detach_args() {
        assert_eq!(
            detach_args(ResourceKind::IamRole, "node", "policy:arn:aws:iam::aws:policy/X"),
            Some(
                vec![
                    "iam",
                    "detach-role-policy",
                    "--role-name",
                    "node",
                    "--policy-arn",
                    "arn:aws:iam::aws:policy/X"
                ]
                .into_iter()
                .map(String::from)
                .collect()
            )
        );
        assert!(detach_args(ResourceKind::InstanceProfile, "p", "role:node").is_some());
        assert!(detach_args(ResourceKind::InstanceProfile, "p", "node").is_none());
        assert!(detach_args(ResourceKind::Vpc, "vpc-1", "x").is_none());
    }
}
