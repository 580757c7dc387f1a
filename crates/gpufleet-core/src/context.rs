//! Run context passed to every orchestrator component

use crate::decision::Decider;
use crate::error::{CoreError, Result};
use crate::report::ReportWriter;
use gpufleet_cloud::{
    CloudInspector, CloudResource, DeploymentRecord, DeploymentState, PollConfig, ResourceFilter,
    StateStore,
};
use gpufleet_config::{Settings, VarFile};
use gpufleet_engine::InfraEngine;
use std::sync::Arc;
use std::time::Duration;

/// Everything one run needs: settings, adapters, persistence and the
/// operator decision channel
pub struct RunContext {
    pub settings: Settings,
    pub cloud: Arc<dyn CloudInspector>,
    pub engine: Arc<dyn InfraEngine>,
    pub store: Arc<dyn StateStore>,
    pub decider: Arc<dyn Decider>,
    pub reports: ReportWriter,
    pub poll: PollConfig,
}

impl RunContext {
    pub fn new(
        settings: Settings,
        cloud: Arc<dyn CloudInspector>,
        engine: Arc<dyn InfraEngine>,
        store: Arc<dyn StateStore>,
        decider: Arc<dyn Decider>,
    ) -> Self {
        let reports = ReportWriter::new(settings.reports_dir());
        let poll = PollConfig::new(
            settings.polling.max_attempts,
            Duration::from_secs(settings.polling.interval_secs),
        );
        Self {
            settings,
            cloud,
            engine,
            store,
            decider,
            reports,
            poll,
        }
    }

    pub fn project(&self) -> &str {
        &self.settings.project
    }

    pub fn environment(&self) -> &str {
        &self.settings.environment
    }

    /// Fresh view of the engine variable file
    pub fn var_file(&self) -> Result<VarFile> {
        Ok(VarFile::load(self.settings.var_file())?)
    }

    /// Current naming prefix: the variable file value, else `<project>-<env>`
    pub fn naming_prefix(&self) -> Result<String> {
        let vars = self.var_file()?;
        Ok(vars
            .get_str(&self.settings.naming.prefix_var)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .unwrap_or_else(|| self.settings.default_prefix()))
    }

    /// Resources this environment owns by name: the prefix itself or
    /// `<prefix>-...`, minus configured sibling environments. Tags are
    /// shared by every environment of a project, so they never widen it.
    pub fn owned_filter_for(&self, prefix: &str) -> ResourceFilter {
        ResourceFilter::convention(prefix, None)
            .excluding(self.settings.naming.sibling_prefixes.iter().cloned())
    }

    pub fn owned_filter(&self) -> Result<ResourceFilter> {
        let prefix = self.naming_prefix()?;
        Ok(self.owned_filter_for(&prefix))
    }

    /// False when the resource carries the project tag with another value
    pub fn tag_allows(&self, resource: &CloudResource) -> bool {
        resource
            .tags
            .get(&self.settings.naming.tag_key)
            .is_none_or(|project| *project == self.settings.project)
    }

    pub async fn current_record(&self) -> Result<Option<DeploymentRecord>> {
        Ok(self.store.get(self.project(), self.environment()).await?)
    }

    pub async fn current_state(&self) -> Result<DeploymentState> {
        Ok(self
            .current_record()
            .await?
            .map(|r| r.state)
            .unwrap_or(DeploymentState::NotDeployed))
    }

    /// Persist the next state, refusing transitions the lifecycle forbids
    pub async fn transition(
        &self,
        next: DeploymentState,
        detail: Option<String>,
    ) -> Result<DeploymentRecord> {
        let current = self.current_state().await?;
        if !current.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: current,
                to: next,
            });
        }

        let mut record = DeploymentRecord::new(self.project(), self.environment(), next);
        record.detail = detail;
        self.store.set(&record).await?;

        tracing::info!(
            project = %self.project(),
            environment = %self.environment(),
            from = %current,
            to = %next,
            "deployment state changed"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::TestHarness;
    use gpufleet_cloud::{CloudResource, DeploymentState, ResourceKind};

    #[tokio::test]
    async fn test_transition_rejects_backwards_moves() {
        let harness = TestHarness::new();
        let ctx = harness.context();

        assert_eq!(ctx.current_state().await.unwrap(), DeploymentState::NotDeployed);
        assert!(ctx.transition(DeploymentState::RolledBack, None).await.is_err());

        ctx.transition(DeploymentState::Failed, Some("boom".into()))
            .await
            .unwrap();
        ctx.transition(DeploymentState::RolledBack, None).await.unwrap();
        assert_eq!(ctx.current_state().await.unwrap(), DeploymentState::RolledBack);
    }

    #[tokio::test]
    async fn test_naming_prefix_prefers_var_file() {
        let harness = TestHarness::new();
        let ctx = harness.context();
        assert_eq!(ctx.naming_prefix().unwrap(), "gpu-dev");

        harness.set_var("name_prefix", "custom");
        assert_eq!(ctx.naming_prefix().unwrap(), "custom");
    }

    #[test]
    fn test_owned_filter_skips_siblings_and_tag_only_matches() {
        let mut harness = TestHarness::new();
        harness.settings.naming.sibling_prefixes = vec!["gpu-dev-eu".into()];
        let ctx = harness.context();
        let filter = ctx.owned_filter().unwrap();

        let vpc = |id: &str, name: &str| CloudResource::new(ResourceKind::Vpc, id).with_name(name);
        assert!(filter.matches(&vpc("vpc-1", "gpu-dev-vpc")));
        assert!(!filter.matches(&vpc("vpc-2", "gpu-dev-eu-vpc")));
        assert!(!filter.matches(&vpc("vpc-3", "gpu-dev2-vpc")));
        assert!(!filter.matches(&vpc("vpc-4", "gpu-prod-vpc").with_tag("Project", "gpu")));
    }

    #[test]
    fn test_tag_allows_only_this_project() {
        let harness = TestHarness::new();
        let ctx = harness.context();
        let eip = CloudResource::new(ResourceKind::ElasticIp, "eipalloc-1");

        assert!(ctx.tag_allows(&eip));
        assert!(ctx.tag_allows(&eip.clone().with_tag("Project", "gpu")));
        assert!(!ctx.tag_allows(&eip.with_tag("Project", "billing")));
    }
}
