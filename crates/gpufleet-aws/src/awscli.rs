//! aws CLI wrapper
//!
//! Runs `aws` with `--output json` and parses responses into the typed
//! views in [`crate::types`]. Errors are mapped from stderr once, here.

use crate::error::{AwsError, Result};
use crate::types::*;
use serde::de::DeserializeOwned;
use std::process::Stdio;
use tokio::process::Command;

/// aws CLI wrapper bound to one region (and optionally one profile)
pub struct AwsCli {
    binary: String,
    region: String,
    profile: Option<String>,
}

impl AwsCli {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            binary: "aws".to_string(),
            region: region.into(),
            profile: None,
        }
    }

    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "--region".to_string(),
            self.region.clone(),
            "--output".to_string(),
            "json".to_string(),
        ];
        if let Some(ref profile) = self.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        args
    }

    /// Check the aws CLI is installed
    pub async fn check_installed(&self) -> Result<()> {
        let which = Command::new("which").arg(&self.binary).output().await?;
        if !which.status.success() {
            return Err(AwsError::AwsCliNotFound);
        }
        Ok(())
    }

    /// Run an aws command and return stdout
    pub async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        cmd.args(self.base_args());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.env("AWS_PAGER", "");

        tracing::debug!("Running: {} {} --region {}", self.binary, args.join(" "), self.region);

        let output = cmd.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AwsError::from_stderr(&stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run an aws command and parse its JSON output
    async fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let output = self.run_command(args).await?;
        let trimmed = output.trim();
        let body = if trimmed.is_empty() { "{}" } else { trimmed };
        Ok(serde_json::from_str(body)?)
    }

    /// Run a mutating aws command, discarding output
    pub async fn run(&self, args: &[&str]) -> Result<()> {
        self.run_command(args).await?;
        Ok(())
    }

    pub async fn caller_identity(&self) -> Result<CallerIdentity> {
        self.run_json(&["sts", "get-caller-identity"]).await
    }

    // ---- describe calls ----

    pub async fn describe_vpcs(&self) -> Result<Vec<Vpc>> {
        let list: VpcList = self.run_json(&["ec2", "describe-vpcs"]).await?;
        Ok(list.vpcs)
    }

    pub async fn describe_subnets(&self) -> Result<Vec<Subnet>> {
        let list: SubnetList = self.run_json(&["ec2", "describe-subnets"]).await?;
        Ok(list.subnets)
    }

    pub async fn describe_addresses(&self) -> Result<Vec<Address>> {
        let list: AddressList = self.run_json(&["ec2", "describe-addresses"]).await?;
        Ok(list.addresses)
    }

    pub async fn describe_nat_gateways(&self) -> Result<Vec<NatGateway>> {
        let list: NatGatewayList = self
            .run_json(&[
                "ec2",
                "describe-nat-gateways",
                "--filter",
                "Name=state,Values=pending,available,deleting",
            ])
            .await?;
        Ok(list.nat_gateways)
    }

    pub async fn describe_internet_gateways(&self) -> Result<Vec<InternetGateway>> {
        let list: InternetGatewayList =
            self.run_json(&["ec2", "describe-internet-gateways"]).await?;
        Ok(list.internet_gateways)
    }

    pub async fn describe_route_tables(&self) -> Result<Vec<RouteTable>> {
        let list: RouteTableList = self.run_json(&["ec2", "describe-route-tables"]).await?;
        Ok(list.route_tables)
    }

    pub async fn describe_security_groups(&self) -> Result<Vec<SecurityGroup>> {
        let list: SecurityGroupList =
            self.run_json(&["ec2", "describe-security-groups"]).await?;
        Ok(list.security_groups)
    }

    pub async fn describe_network_acls(&self) -> Result<Vec<NetworkAcl>> {
        let list: NetworkAclList = self.run_json(&["ec2", "describe-network-acls"]).await?;
        Ok(list.network_acls)
    }

    pub async fn describe_network_interfaces(&self) -> Result<Vec<NetworkInterface>> {
        let list: NetworkInterfaceList =
            self.run_json(&["ec2", "describe-network-interfaces"]).await?;
        Ok(list.network_interfaces)
    }

    pub async fn describe_vpc_endpoints(&self) -> Result<Vec<VpcEndpoint>> {
        let list: VpcEndpointList = self
            .run_json(&[
                "ec2",
                "describe-vpc-endpoints",
                "--filters",
                "Name=vpc-endpoint-state,Values=pendingAcceptance,pending,available,rejected,failed",
            ])
            .await?;
        Ok(list.vpc_endpoints)
    }

    pub async fn describe_vpc_peerings(&self) -> Result<Vec<VpcPeering>> {
        let list: VpcPeeringList = self
            .run_json(&[
                "ec2",
                "describe-vpc-peering-connections",
                "--filters",
                "Name=status-code,Values=pending-acceptance,provisioning,active",
            ])
            .await?;
        Ok(list.connections)
    }

    pub async fn describe_tgw_attachments(&self) -> Result<Vec<TgwAttachment>> {
        let list: TgwAttachmentList = self
            .run_json(&[
                "ec2",
                "describe-transit-gateway-vpc-attachments",
                "--filters",
                "Name=state,Values=pending,available,modifying",
            ])
            .await?;
        Ok(list.attachments)
    }

    pub async fn describe_instances(&self) -> Result<Vec<Instance>> {
        let list: ReservationList = self
            .run_json(&[
                "ec2",
                "describe-instances",
                "--filters",
                "Name=instance-state-name,Values=pending,running,shutting-down,stopping,stopped",
            ])
            .await?;
        Ok(list
            .reservations
            .into_iter()
            .flat_map(|r| r.instances)
            .collect())
    }

    pub async fn describe_auto_scaling_groups(&self) -> Result<Vec<AutoScalingGroup>> {
        let list: AutoScalingGroupList = self
            .run_json(&["autoscaling", "describe-auto-scaling-groups"])
            .await?;
        Ok(list.groups)
    }

    pub async fn describe_load_balancers(&self) -> Result<Vec<LoadBalancer>> {
        let list: LoadBalancerList = self
            .run_json(&["elbv2", "describe-load-balancers"])
            .await?;
        Ok(list.load_balancers)
    }

    pub async fn describe_target_groups(&self) -> Result<Vec<TargetGroup>> {
        let list: TargetGroupList = self.run_json(&["elbv2", "describe-target-groups"]).await?;
        Ok(list.target_groups)
    }

    pub async fn describe_db_instances(&self) -> Result<Vec<DbInstance>> {
        let list: DbInstanceList = self.run_json(&["rds", "describe-db-instances"]).await?;
        Ok(list.db_instances)
    }

    pub async fn list_functions(&self) -> Result<Vec<Function>> {
        let list: FunctionList = self.run_json(&["lambda", "list-functions"]).await?;
        Ok(list.functions)
    }

    pub async fn describe_log_groups(&self) -> Result<Vec<LogGroup>> {
        let list: LogGroupList = self.run_json(&["logs", "describe-log-groups"]).await?;
        Ok(list.log_groups)
    }

    pub async fn list_event_rules(&self) -> Result<Vec<EventRule>> {
        let list: EventRuleList = self.run_json(&["events", "list-rules"]).await?;
        Ok(list.rules)
    }

    pub async fn list_event_targets(&self, rule: &str) -> Result<Vec<String>> {
        let list: EventTargetList = self
            .run_json(&["events", "list-targets-by-rule", "--rule", rule])
            .await?;
        Ok(list.targets.into_iter().map(|t| t.id).collect())
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        let list: RoleList = self.run_json(&["iam", "list-roles"]).await?;
        Ok(list.roles)
    }

    pub async fn list_instance_profiles(&self) -> Result<Vec<InstanceProfile>> {
        let list: InstanceProfileList = self.run_json(&["iam", "list-instance-profiles"]).await?;
        Ok(list.instance_profiles)
    }

    /// Everything attached to a role, encoded with the association prefixes
    pub async fn role_attachments(&self, role: &str) -> Result<Vec<String>> {
        let attached: AttachedPolicyList = self
            .run_json(&["iam", "list-attached-role-policies", "--role-name", role])
            .await?;
        let inline: InlinePolicyList = self
            .run_json(&["iam", "list-role-policies", "--role-name", role])
            .await?;
        let profiles: InstanceProfileList = self
            .run_json(&["iam", "list-instance-profiles-for-role", "--role-name", role])
            .await?;

        let mut out = Vec::new();
        out.extend(
            attached
                .attached_policies
                .into_iter()
                .map(|p| format!("{}{}", POLICY_PREFIX, p.policy_arn)),
        );
        out.extend(
            inline
                .policy_names
                .into_iter()
                .map(|n| format!("{}{}", INLINE_PREFIX, n)),
        );
        out.extend(
            profiles
                .instance_profiles
                .into_iter()
                .map(|p| format!("{}{}", PROFILE_PREFIX, p.name)),
        );
        Ok(out)
    }

    // ---- quotas and placement ----

    pub async fn service_quota(&self, service_code: &str, quota_code: &str) -> Result<Option<u32>> {
        let result: Result<ServiceQuotaResponse> = self
            .run_json(&[
                "service-quotas",
                "get-service-quota",
                "--service-code",
                service_code,
                "--quota-code",
                quota_code,
            ])
            .await;

        match result {
            Ok(resp) => Ok(resp.quota.value.map(|v| v.max(0.0) as u32)),
            Err(AwsError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn instance_vcpus(&self, instance_type: &str) -> Result<Option<u32>> {
        let result: Result<InstanceTypeList> = self
            .run_json(&[
                "ec2",
                "describe-instance-types",
                "--instance-types",
                instance_type,
            ])
            .await;

        match result {
            Ok(list) => Ok(list
                .instance_types
                .into_iter()
                .find(|t| t.instance_type == instance_type)
                .and_then(|t| t.vcpu_info)
                .map(|v| v.default_vcpus)),
            Err(AwsError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn zones_offering(&self, instance_type: &str) -> Result<Vec<String>> {
        let filter = format!("Name=instance-type,Values={}", instance_type);
        let list: InstanceTypeOfferingList = self
            .run_json(&[
                "ec2",
                "describe-instance-type-offerings",
                "--location-type",
                "availability-zone",
                "--filters",
                filter.as_str(),
            ])
            .await?;
        let mut zones: Vec<String> = list.offerings.into_iter().map(|o| o.location).collect();
        zones.sort();
        zones.dedup();
        Ok(zones)
    }

    pub async fn available_zones(&self) -> Result<Vec<String>> {
        let list: AvailabilityZoneList = self
            .run_json(&[
                "ec2",
                "describe-availability-zones",
                "--filters",
                "Name=state,Values=available",
            ])
            .await?;
        Ok(list.zones.into_iter().map(|z| z.zone_name).collect())
    }
}
