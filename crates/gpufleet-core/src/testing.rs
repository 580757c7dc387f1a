//! In-memory provider and engine for orchestrator tests

use crate::context::RunContext;
use crate::decision::AutoDecider;
use async_trait::async_trait;
use gpufleet_cloud::{
    AuthStatus, CloudError, CloudInspector, CloudResource, MemoryStateStore, ResourceFilter,
    ResourceKind,
};
use gpufleet_config::{Settings, VarFile};
use gpufleet_engine::{
    EngineError, InfraEngine, LineSink, PlanSummary, StreamExit, TrackedResource,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const SETTINGS: &str = "\
project: gpu
environment: dev
region: us-east-1
polling:
  max_attempts: 3
  interval_secs: 0
";

pub struct TestHarness {
    // Keeps the directory alive
    _dir: TempDir,
    pub settings: Settings,
    pub cloud: Arc<FakeCloud>,
    pub engine: Arc<FakeEngine>,
    pub store: Arc<MemoryStateStore>,
    pub decider: AutoDecider,
}

impl TestHarness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gpufleet.yaml");
        std::fs::write(&path, SETTINGS).unwrap();
        let settings = Settings::load(&path).unwrap();

        Self {
            _dir: dir,
            settings,
            cloud: Arc::new(FakeCloud::default()),
            engine: Arc::new(FakeEngine::default()),
            store: Arc::new(MemoryStateStore::new()),
            decider: AutoDecider::default(),
        }
    }

    pub fn assume_yes(mut self) -> Self {
        self.decider.assume_yes = true;
        self
    }

    pub fn keep_partial(mut self) -> Self {
        self.decider.keep_partial = true;
        self
    }

    pub fn context(&self) -> RunContext {
        RunContext::new(
            self.settings.clone(),
            self.cloud.clone(),
            self.engine.clone(),
            self.store.clone(),
            Arc::new(self.decider),
        )
    }

    pub fn set_var(&self, key: &str, value: impl Into<Value>) {
        let mut vars = VarFile::load(self.settings.var_file()).unwrap();
        vars.set(key, value);
        vars.save().unwrap();
    }

    pub fn var(&self, key: &str) -> Option<Value> {
        VarFile::load(self.settings.var_file())
            .unwrap()
            .get(key)
            .cloned()
    }
}

#[derive(Default)]
struct CloudState {
    resources: Vec<CloudResource>,
    deleted: Vec<String>,
    quotas: HashMap<String, u32>,
    vcpus: HashMap<String, u32>,
    offerings: HashMap<String, Vec<String>>,
    zones: Option<Vec<String>>,
    failing: HashSet<String>,
    auth_error: Option<String>,
    calls: Vec<String>,
}

#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<CloudState>,
}

impl FakeCloud {
    fn with<T>(&self, f: impl FnOnce(&mut CloudState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn add(&self, resource: CloudResource) {
        self.with(|s| s.resources.push(resource));
    }

    pub fn resources(&self) -> Vec<CloudResource> {
        self.with(|s| s.resources.clone())
    }

    pub fn has(&self, kind: ResourceKind, id: &str) -> bool {
        self.with(|s| s.resources.iter().any(|r| r.kind == kind && r.id == id))
    }

    /// IDs of successful deletes, in order
    pub fn deleted(&self) -> Vec<String> {
        self.with(|s| s.deleted.clone())
    }

    pub fn quota(&self, code: &str, value: u32) {
        self.with(|s| s.quotas.insert(code.to_string(), value));
    }

    /// Known instance type with its vCPUs and the zones offering it
    pub fn instance_type(&self, instance_type: &str, vcpus: u32, zones: &[&str]) {
        self.with(|s| s.vcpus.insert(instance_type.to_string(), vcpus));
        self.offer(instance_type, zones);
    }

    pub fn offer(&self, instance_type: &str, zones: &[&str]) {
        let zones = zones.iter().map(|z| z.to_string()).collect();
        self.with(|s| s.offerings.insert(instance_type.to_string(), zones));
    }

    pub fn set_zones(&self, zones: &[&str]) {
        let zones = zones.iter().map(|z| z.to_string()).collect();
        self.with(|s| s.zones = Some(zones));
    }

    pub fn fail_delete(&self, id: &str) {
        self.with(|s| s.failing.insert(id.to_string()));
    }

    pub fn fail_auth(&self, error: &str) {
        self.with(|s| s.auth_error = Some(error.to_string()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }
}

#[async_trait]
impl CloudInspector for FakeCloud {
    fn name(&self) -> &str {
        "fake"
    }

    fn region(&self) -> &str {
        "us-east-1"
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

    async fn check_auth(&self) -> gpufleet_cloud::Result<AuthStatus> {
        Ok(self.with(|s| match s.auth_error {
            Some(ref e) => AuthStatus::failed(e.clone()),
            None => AuthStatus::ok("123456789012"),
        }))
    }

    async fn describe(
        &self,
        kind: ResourceKind,
        filter: &ResourceFilter,
    ) -> gpufleet_cloud::Result<Vec<CloudResource>> {
        Ok(self.with(|s| {
            s.calls.push(format!("describe {}", kind));
            s.resources
                .iter()
                .filter(|r| r.kind == kind && filter.matches(r))
                .cloned()
                .collect()
        }))
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> gpufleet_cloud::Result<()> {
        self.with(|s| {
            s.calls.push(format!("delete {} {}", kind, id));
            let Some(index) = s.resources.iter().position(|r| r.kind == kind && r.id == id) else {
                return Err(CloudError::ResourceNotFound(id.to_string()));
            };
            if s.failing.contains(id) {
                return Err(CloudError::DependencyViolation(id.to_string()));
            }
            s.resources.remove(index);
            s.deleted.push(id.to_string());
            Ok(())
        })
    }

    async fn detach(
        &self,
        kind: ResourceKind,
        id: &str,
        association: &str,
    ) -> gpufleet_cloud::Result<()> {
        self.with(|s| {
            s.calls.push(format!("detach {} {} {}", kind, id, association));
            let Some(resource) = s.resources.iter_mut().find(|r| r.kind == kind && r.id == id) else {
                return Err(CloudError::ResourceNotFound(id.to_string()));
            };
            resource.associations.retain(|a| a != association);
            Ok(())
        })
    }

    async fn service_quota(
        &self,
        _service_code: &str,
        quota_code: &str,
    ) -> gpufleet_cloud::Result<Option<u32>> {
        Ok(self.with(|s| s.quotas.get(quota_code).copied()))
    }

    async fn instance_vcpus(&self, instance_type: &str) -> gpufleet_cloud::Result<Option<u32>> {
        Ok(self.with(|s| {
            s.calls.push(format!("vcpus {}", instance_type));
            s.vcpus.get(instance_type).copied()
        }))
    }

    async fn zones_offering(&self, instance_type: &str) -> gpufleet_cloud::Result<Vec<String>> {
        Ok(self.with(|s| {
            s.calls.push(format!("offerings {}", instance_type));
            s.offerings.get(instance_type).cloned().unwrap_or_default()
        }))
    }

    async fn available_zones(&self) -> gpufleet_cloud::Result<Vec<String>> {
        Ok(self.with(|s| {
            s.zones.clone().unwrap_or_else(|| {
                vec![
                    "us-east-1a".to_string(),
                    "us-east-1b".to_string(),
                    "us-east-1c".to_string(),
                ]
            })
        }))
    }
}

type Script = (Vec<String>, StreamExit);

#[derive(Default)]
struct EngineState {
    plan: PlanSummary,
    queued_plans: VecDeque<PlanSummary>,
    tracked: Vec<TrackedResource>,
    imports: Vec<(String, String)>,
    fail_imports: bool,
    apply_scripts: VecDeque<Script>,
    destroy_scripts: VecDeque<Script>,
    plan_cleared: bool,
    plan_count: usize,
    apply_count: usize,
    destroy_count: usize,
}

#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<EngineState>,
}

fn script(lines: &[&str], exit: StreamExit) -> Script {
    (lines.iter().map(|l| l.to_string()).collect(), exit)
}

impl FakeEngine {
    fn with<T>(&self, f: impl FnOnce(&mut EngineState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn set_plan(&self, plan: PlanSummary) {
        self.with(|s| s.plan = plan);
    }

    /// Returned by the next plan call, ahead of the standing plan
    pub fn queue_plan(&self, plan: PlanSummary) {
        self.with(|s| s.queued_plans.push_back(plan));
    }

    pub fn track(&self, address: &str, resource_type: &str, id: &str, name: Option<&str>) {
        let tracked = TrackedResource {
            address: address.to_string(),
            resource_type: resource_type.to_string(),
            id: Some(id.to_string()),
            name: name.map(String::from),
        };
        self.with(|s| s.tracked.push(tracked));
    }

    pub fn fail_imports(&self) {
        self.with(|s| s.fail_imports = true);
    }

    pub fn imports(&self) -> Vec<(String, String)> {
        self.with(|s| s.imports.clone())
    }

    /// Queue the output of the next apply; unscripted applies succeed
    pub fn script_apply(&self, lines: &[&str], exit: StreamExit) {
        let script = script(lines, exit);
        self.with(|s| s.apply_scripts.push_back(script));
    }

    pub fn script_destroy(&self, lines: &[&str], exit: StreamExit) {
        let script = script(lines, exit);
        self.with(|s| s.destroy_scripts.push_back(script));
    }

    pub fn plan_cleared(&self) -> bool {
        self.with(|s| s.plan_cleared)
    }

    pub fn plan_count(&self) -> usize {
        self.with(|s| s.plan_count)
    }

    pub fn apply_count(&self) -> usize {
        self.with(|s| s.apply_count)
    }

    pub fn destroy_count(&self) -> usize {
        self.with(|s| s.destroy_count)
    }
}

#[async_trait]
impl InfraEngine for FakeEngine {
    fn name(&self) -> &str {
        "terraform"
    }

    async fn init(&self) -> gpufleet_engine::Result<()> {
        Ok(())
    }

    async fn plan(&self) -> gpufleet_engine::Result<PlanSummary> {
        Ok(self.with(|s| {
            s.plan_count += 1;
            s.queued_plans.pop_front().unwrap_or_else(|| s.plan.clone())
        }))
    }

    async fn apply(&self, sink: LineSink<'_>) -> gpufleet_engine::Result<StreamExit> {
        let (lines, exit) = self.with(|s| {
            s.apply_count += 1;
            s.apply_scripts.pop_front().unwrap_or_else(|| {
                script(
                    &["Apply complete! Resources: 0 added, 0 changed, 0 destroyed."],
                    StreamExit::ok(),
                )
            })
        });
        for line in &lines {
            sink(line.as_str());
        }
        Ok(exit)
    }

    async fn import(&self, address: &str, id: &str) -> gpufleet_engine::Result<()> {
        self.with(|s| {
            if s.fail_imports {
                return Err(EngineError::CommandFailed {
                    command: format!("terraform import {} {}", address, id),
                    stderr: "Error: Cannot import non-existent remote object".to_string(),
                });
            }
            s.imports.push((address.to_string(), id.to_string()));
            s.tracked.push(TrackedResource {
                address: address.to_string(),
                resource_type: address.split('.').next().unwrap_or_default().to_string(),
                id: Some(id.to_string()),
                name: None,
            });
            Ok(())
        })
    }

    async fn state_list(&self) -> gpufleet_engine::Result<Vec<String>> {
        Ok(self.with(|s| s.tracked.iter().map(|t| t.address.clone()).collect()))
    }

    async fn tracked_resources(&self) -> gpufleet_engine::Result<Vec<TrackedResource>> {
        Ok(self.with(|s| s.tracked.clone()))
    }

    async fn destroy(&self, sink: LineSink<'_>) -> gpufleet_engine::Result<StreamExit> {
        let (lines, exit) = self.with(|s| {
            s.destroy_count += 1;
            s.destroy_scripts.pop_front().unwrap_or_else(|| {
                script(&["Destroy complete! Resources: 3 destroyed."], StreamExit::ok())
            })
        });
        for line in &lines {
            sink(line.as_str());
        }
        if exit.success {
            self.with(|s| s.tracked.clear());
        }
        Ok(exit)
    }

    async fn clear_plan(&self) -> gpufleet_engine::Result<()> {
        self.with(|s| s.plan_cleared = true);
        Ok(())
    }
}
