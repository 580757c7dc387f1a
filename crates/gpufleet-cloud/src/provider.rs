//! Cloud inspector trait definition

use crate::error::Result;
use crate::resource::{CloudResource, ResourceFilter, ResourceKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Typed adapter over a cloud provider's command surface
///
/// Each provider (AWS today) implements this trait so the orchestrator can
/// inspect, detach and delete resources without ever parsing CLI text.
/// Every call is a blocking round trip from the caller's point of view.
#[async_trait]
pub trait CloudInspector: Send + Sync {
    /// Returns the provider name (e.g., "aws")
    fn name(&self) -> &str;

    /// Region this inspector is bound to
    fn region(&self) -> &str;

    /// Engine resource type for a kind (e.g. `aws_vpc`)
    fn engine_type(&self, kind: ResourceKind) -> &'static str;

    /// Reverse of [`CloudInspector::engine_type`]
    fn kind_for_engine_type(&self, engine_type: &str) -> Option<ResourceKind> {
        ResourceKind::ALL
            .into_iter()
            .find(|k| self.engine_type(*k) == engine_type)
    }

    /// Check if the provider is properly configured and authenticated
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// List resources of one kind matching the filter
    async fn describe(&self, kind: ResourceKind, filter: &ResourceFilter)
    -> Result<Vec<CloudResource>>;

    /// Delete (or release, or terminate) one resource.
    ///
    /// Returns `CloudError::ResourceNotFound` when it is already gone.
    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<()>;

    /// Remove one association reported in [`CloudResource::associations`]
    async fn detach(&self, kind: ResourceKind, id: &str, association: &str) -> Result<()>;

    /// Current value of a provider quota; `None` when the provider has no
    /// value for the code
    async fn service_quota(&self, service_code: &str, quota_code: &str) -> Result<Option<u32>>;

    /// vCPU count of an instance type; `None` for unknown types
    async fn instance_vcpus(&self, instance_type: &str) -> Result<Option<u32>>;

    /// Zones in the region that currently offer the instance type
    async fn zones_offering(&self, instance_type: &str) -> Result<Vec<String>>;

    /// Zones in the region currently reporting `available`
    async fn available_zones(&self) -> Result<Vec<String>>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}
