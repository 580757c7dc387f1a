//! Housekeeping: leftover roles, instance profiles and event rules

use super::{
    Attempt, Conflict, ConflictDetail, ConflictKind, ConflictProbe, ConflictScope, Destructiveness,
    RemediationChain, RemediationStrategy, is_tracked, tracked_keys,
};
use crate::context::RunContext;
use crate::error::Result;
use async_trait::async_trait;
use gpufleet_cloud::{CloudResource, ResourceKind};

pub struct OrphanProbe {
    kind: ResourceKind,
}

impl OrphanProbe {
    pub fn new(kind: ResourceKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl ConflictProbe for OrphanProbe {
    fn name(&self) -> String {
        format!("orphaned-{}", self.kind)
    }

    fn kind(&self) -> ConflictKind {
        match self.kind {
            ResourceKind::EventRule => ConflictKind::OrphanedRule,
            _ => ConflictKind::OrphanedRole,
        }
    }

    fn scope(&self) -> ConflictScope {
        ConflictScope::new(self.kind.label(), "*")
    }

    fn blocking(&self) -> bool {
        false
    }

    async fn inspect(&self, ctx: &RunContext) -> Result<Option<Conflict>> {
        let filter = ctx.owned_filter()?;
        let tracked = tracked_keys(ctx).await?;
        let resources: Vec<CloudResource> = ctx
            .cloud
            .describe(self.kind, &filter)
            .await?
            .into_iter()
            .filter(|r| !r.is_default && !is_tracked(&tracked, r))
            .collect();

        if resources.is_empty() {
            return Ok(None);
        }
        Ok(Some(Conflict {
            kind: self.kind(),
            scope: self.scope(),
            detail: ConflictDetail::Orphans {
                kind: self.kind,
                resources,
            },
        }))
    }

    fn chain(&self) -> RemediationChain {
        RemediationChain::new(vec![Box::new(DetachAndDelete)])
    }
}

/// Detach every attachment, then delete
pub struct DetachAndDelete;

#[async_trait]
impl RemediationStrategy for DetachAndDelete {
    fn name(&self) -> &'static str {
        "detach-and-delete"
    }

    fn destructiveness(&self) -> Destructiveness {
        Destructiveness::Delete
    }

    fn applies(&self, conflict: &Conflict) -> bool {
        matches!(&conflict.detail, ConflictDetail::Orphans { resources, .. } if !resources.is_empty())
    }

    async fn attempt(&self, ctx: &RunContext, conflict: &Conflict) -> Result<Attempt> {
        let ConflictDetail::Orphans { kind, resources } = &conflict.detail else {
            return Ok(Attempt::not_applicable("not an orphan conflict"));
        };

        let mut deleted = Vec::new();
        for resource in resources {
            for association in &resource.associations {
                if let Err(e) = ctx.cloud.detach(*kind, &resource.id, association).await {
                    if !e.is_not_found() {
                        tracing::warn!(kind = %kind, resource_id = %resource.id, association = %association, error = %e, "detach failed");
                    }
                }
            }
            match ctx.cloud.delete(*kind, &resource.id).await {
                Ok(()) => {
                    tracing::info!(kind = %kind, resource_id = %resource.id, "deleted orphan");
                    deleted.push(resource.display_name().to_string());
                }
                Err(e) if e.is_not_found() => deleted.push(resource.display_name().to_string()),
                Err(e) => {
                    tracing::warn!(kind = %kind, resource_id = %resource.id, error = %e, "orphan delete failed");
                }
            }
        }

        let detail = format!("deleted {} of {}: {}", deleted.len(), resources.len(), deleted.join(", "));
        Ok(if deleted.len() == resources.len() {
            Attempt::resolved(detail)
        } else if deleted.is_empty() {
            Attempt::failed(detail)
        } else {
            Attempt::partial(detail)
        })
    }
}
