//! Name collisions with resources the plan will create

use super::strategy::write_manual_report;
use super::{
    Attempt, Conflict, ConflictDetail, ConflictKind, ConflictProbe, ConflictScope, Destructiveness,
    RemediationChain, RemediationStrategy, is_tracked, tracked_keys,
};
use crate::context::RunContext;
use crate::error::Result;
use crate::report::ManualOption;
use async_trait::async_trait;
use gpufleet_cloud::{ResourceFilter, ResourceKind};
use gpufleet_engine::PlannedResource;

/// One check per named resource in the plan's create set
pub struct ExistingProbe {
    kind: ResourceKind,
    address: String,
    resource_type: String,
    planned_name: String,
    /// Prefix in effect when the plan was made
    plan_prefix: String,
}

impl ExistingProbe {
    /// `None` when the planned resource has no provider-side name
    pub fn for_planned(kind: ResourceKind, planned: &PlannedResource, plan_prefix: &str) -> Option<Self> {
        Some(Self {
            kind,
            address: planned.address.clone(),
            resource_type: planned.resource_type.clone(),
            planned_name: planned.name.clone()?,
            plan_prefix: plan_prefix.to_string(),
        })
    }

    /// Name the resource would get with the current prefix, and that prefix
    /// when the name is derived from it
    fn current_name(&self, ctx: &RunContext) -> Result<(String, Option<String>)> {
        match self.planned_name.strip_prefix(self.plan_prefix.as_str()) {
            Some(suffix) if !self.plan_prefix.is_empty() => {
                let prefix = ctx.naming_prefix()?;
                Ok((format!("{}{}", prefix, suffix), Some(prefix)))
            }
            _ => Ok((self.planned_name.clone(), None)),
        }
    }
}

#[async_trait]
impl ConflictProbe for ExistingProbe {
    fn name(&self) -> String {
        format!("exists:{}", self.address)
    }

    fn kind(&self) -> ConflictKind {
        ConflictKind::AlreadyExists
    }

    fn scope(&self) -> ConflictScope {
        ConflictScope::new(&self.resource_type, &self.planned_name)
    }

    async fn inspect(&self, ctx: &RunContext) -> Result<Option<Conflict>> {
        let (name, prefix) = self.current_name(ctx)?;
        let found = ctx
            .cloud
            .describe(self.kind, &ResourceFilter::named(name.clone()))
            .await?;
        if found.is_empty() {
            return Ok(None);
        }

        let tracked = tracked_keys(ctx).await?;
        let Some(existing) = found.into_iter().find(|r| !is_tracked(&tracked, r)) else {
            return Ok(None);
        };

        Ok(Some(Conflict {
            kind: ConflictKind::AlreadyExists,
            scope: self.scope(),
            detail: ConflictDetail::Existing {
                kind: self.kind,
                name,
                address: self.address.clone(),
                prefix,
                existing,
            },
        }))
    }

    fn chain(&self) -> RemediationChain {
        RemediationChain::new(vec![
            Box::new(ImportExisting),
            Box::new(RenameWithSuffix),
            Box::new(ReportExistingResource),
        ])
    }
}

/// Bring the existing resource under engine management
pub struct ImportExisting;

#[async_trait]
impl RemediationStrategy for ImportExisting {
    fn name(&self) -> &'static str {
        "import-existing"
    }

    fn destructiveness(&self) -> Destructiveness {
        Destructiveness::Import
    }

    fn applies(&self, conflict: &Conflict) -> bool {
        matches!(conflict.detail, ConflictDetail::Existing { .. })
    }

    async fn attempt(&self, ctx: &RunContext, conflict: &Conflict) -> Result<Attempt> {
        let ConflictDetail::Existing {
            address, existing, ..
        } = &conflict.detail
        else {
            return Ok(Attempt::not_applicable("not a name collision"));
        };

        if ctx.engine.state_list().await?.iter().any(|a| a == address) {
            return Ok(Attempt::not_applicable(format!("{} already tracked", address)));
        }

        ctx.engine.import(address, &existing.id).await?;
        tracing::info!(address = %address, resource_id = %existing.id, "imported existing resource");
        Ok(Attempt::resolved(format!("imported {} as {}", existing.id, address)))
    }
}

/// Move the run's naming prefix out of the way: region first, then a
/// random token
pub struct RenameWithSuffix;

fn random_token() -> String {
    format!("{:04x}", rand::random::<u16>())
}

#[async_trait]
impl RemediationStrategy for RenameWithSuffix {
    fn name(&self) -> &'static str {
        "rename-with-suffix"
    }

    fn destructiveness(&self) -> Destructiveness {
        Destructiveness::Rename
    }

    fn applies(&self, conflict: &Conflict) -> bool {
        matches!(
            conflict.detail,
            ConflictDetail::Existing {
                prefix: Some(_),
                ..
            }
        )
    }

    async fn attempt(&self, ctx: &RunContext, conflict: &Conflict) -> Result<Attempt> {
        let ConflictDetail::Existing {
            kind,
            name,
            prefix: Some(prefix),
            ..
        } = &conflict.detail
        else {
            return Ok(Attempt::not_applicable("name does not derive from the prefix"));
        };
        let suffix = name.strip_prefix(prefix.as_str()).unwrap_or_default();
        let region = ctx.cloud.region();

        let mut candidates = Vec::with_capacity(2);
        if !prefix.ends_with(region) {
            candidates.push(format!("{}-{}", prefix, region));
        }
        candidates.push(format!("{}-{}", prefix, random_token()));

        for candidate in candidates {
            let renamed = format!("{}{}", candidate, suffix);
            let taken = ctx
                .cloud
                .describe(*kind, &ResourceFilter::named(renamed.clone()))
                .await?;
            if !taken.is_empty() {
                tracing::debug!(name = %renamed, "suffixed name also taken");
                continue;
            }

            let mut vars = ctx.var_file()?;
            vars.set(&ctx.settings.naming.prefix_var, candidate.clone());
            let edit = vars.save()?;
            return Ok(
                Attempt::resolved(format!("naming prefix {} -> {} ({})", prefix, candidate, renamed))
                    .with_edit(edit),
            );
        }

        Ok(Attempt::failed("every suffixed name is taken"))
    }
}

/// Terminal: both ways out, as commands
pub struct ReportExistingResource;

#[async_trait]
impl RemediationStrategy for ReportExistingResource {
    fn name(&self) -> &'static str {
        "report-existing-resource"
    }

    fn destructiveness(&self) -> Destructiveness {
        Destructiveness::Manual
    }

    fn applies(&self, conflict: &Conflict) -> bool {
        matches!(conflict.detail, ConflictDetail::Existing { .. })
    }

    async fn attempt(&self, ctx: &RunContext, conflict: &Conflict) -> Result<Attempt> {
        let ConflictDetail::Existing {
            address,
            existing,
            prefix,
            ..
        } = &conflict.detail
        else {
            return Ok(Attempt::not_applicable("not a name collision"));
        };

        let engine_dir = ctx.settings.engine_dir();
        let var_file = ctx.settings.var_file();
        let prefix_var = &ctx.settings.naming.prefix_var;
        let new_prefix = format!(
            "{}-{}",
            prefix.clone().unwrap_or_else(|| ctx.settings.default_prefix()),
            ctx.cloud.region()
        );

        let options = vec![
            ManualOption::new(
                "Import the existing resource into engine state",
                vec![format!(
                    "cd {} && {} import {} {}",
                    engine_dir.display(),
                    ctx.settings.engine.binary,
                    address,
                    existing.id
                )],
            ),
            ManualOption::new(
                "Rename the run's resources with a new naming prefix",
                vec![
                    format!(
                        "jq '.{} = \"{}\"' {} > {}.tmp",
                        prefix_var,
                        new_prefix,
                        var_file.display(),
                        var_file.display()
                    ),
                    format!("mv {}.tmp {}", var_file.display(), var_file.display()),
                ],
            ),
        ];

        write_manual_report(ctx, conflict, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::{CheckStatus, ConflictScanner, StrategyOutcome};
    use crate::testing::TestHarness;
    use gpufleet_cloud::CloudResource;
    use gpufleet_engine::PlannedAction;

    fn planned_role(name: &str) -> PlannedResource {
        PlannedResource {
            address: "aws_iam_role.node".into(),
            resource_type: "aws_iam_role".into(),
            name: Some(name.into()),
            action: PlannedAction::Create,
        }
    }

    fn probe() -> Box<dyn ConflictProbe> {
        Box::new(ExistingProbe::for_planned(ResourceKind::IamRole, &planned_role("gpu-dev-node"), "gpu-dev").unwrap())
    }

    #[tokio::test]
    async fn test_import_resolves_collision() {
        let harness = TestHarness::new();
        harness
            .cloud
            .add(CloudResource::new(ResourceKind::IamRole, "gpu-dev-node").with_name("gpu-dev-node"));
        let ctx = harness.context();

        let report = ConflictScanner::new(&ctx).run(vec![probe()]).await.unwrap();
        let check = &report.checks[0];
        assert_eq!(check.status, CheckStatus::Pass);
        assert_eq!(check.remediation_log.len(), 1);
        assert_eq!(check.remediation_log[0].strategy, "import-existing");
        assert_eq!(
            harness.engine.imports(),
            vec![("aws_iam_role.node".to_string(), "gpu-dev-node".to_string())]
        );
        // Rename never ran
        assert!(harness.var("name_prefix").is_none());
    }

    #[tokio::test]
    async fn test_tracked_resource_is_not_a_conflict() {
        let harness = TestHarness::new();
        harness
            .cloud
            .add(CloudResource::new(ResourceKind::IamRole, "gpu-dev-node").with_name("gpu-dev-node"));
        harness
            .engine
            .track("aws_iam_role.node", "aws_iam_role", "gpu-dev-node", Some("gpu-dev-node"));
        let ctx = harness.context();

        assert!(probe().inspect(&ctx).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rename_with_region_suffix_when_import_fails() {
        let harness = TestHarness::new();
        harness.set_var("vpc_cidr", "10.0.0.0/16");
        harness
            .cloud
            .add(CloudResource::new(ResourceKind::IamRole, "gpu-dev-node").with_name("gpu-dev-node"));
        harness.engine.fail_imports();
        let ctx = harness.context();

        let report = ConflictScanner::new(&ctx).run(vec![probe()]).await.unwrap();
        let check = &report.checks[0];
        assert_eq!(check.status, CheckStatus::Pass);
        assert_eq!(check.remediation_log[0].outcome, StrategyOutcome::Failed);

        let rename = &check.remediation_log[1];
        assert_eq!(rename.strategy, "rename-with-suffix");
        assert_eq!(rename.changes[0].after, serde_json::json!("gpu-dev-us-east-1"));
        assert!(rename.backup.as_ref().unwrap().exists());
        assert_eq!(harness.var("name_prefix"), Some(serde_json::json!("gpu-dev-us-east-1")));
    }

    #[tokio::test]
    async fn test_random_token_when_region_name_taken() {
        let harness = TestHarness::new();
        for name in ["gpu-dev-node", "gpu-dev-us-east-1-node"] {
            harness
                .cloud
                .add(CloudResource::new(ResourceKind::IamRole, name).with_name(name));
        }
        harness.engine.fail_imports();
        let ctx = harness.context();

        let report = ConflictScanner::new(&ctx).run(vec![probe()]).await.unwrap();
        assert_eq!(report.checks[0].status, CheckStatus::Pass);

        let prefix = harness.var("name_prefix").unwrap();
        let prefix = prefix.as_str().unwrap();
        let token = prefix.strip_prefix("gpu-dev-").unwrap();
        assert_eq!(token.len(), 4);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_fixed_name_ends_in_manual_report() {
        let harness = TestHarness::new();
        harness
            .cloud
            .add(CloudResource::new(ResourceKind::IamRole, "legacy-role").with_name("legacy-role"));
        harness.engine.fail_imports();
        let ctx = harness.context();

        let probe = ExistingProbe::for_planned(ResourceKind::IamRole, &planned_role("legacy-role"), "gpu-dev")
            .unwrap();
        let report = ConflictScanner::new(&ctx).run(vec![Box::new(probe)]).await.unwrap();

        let check = &report.checks[0];
        assert_eq!(check.status, CheckStatus::Blocked);
        let outcomes: Vec<StrategyOutcome> = check.remediation_log.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                StrategyOutcome::Failed,
                StrategyOutcome::NotApplicable,
                StrategyOutcome::Failed
            ]
        );
        let content = std::fs::read_to_string(check.manual_report.as_ref().unwrap()).unwrap();
        assert!(content.contains("import aws_iam_role.node legacy-role"));
        assert!(content.contains("name_prefix"));
    }
}
