//! Quota-aware instance type and pricing selection
//!
//! Quotas are read fresh on every call. Order of preference: spot for the
//! requested type, on-demand for the requested type, then the largest
//! smaller fallback type that is offered in the region and fits either
//! quota. A substitution is validated by running the same procedure again
//! on the substitute. When nothing fits, a [`QuotaIncreaseRequest`] is
//! produced and the run halts.

use crate::context::RunContext;
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

pub const QUOTA_SERVICE: &str = "ec2";

/// Fixed fallback ladder, ascending by vCPU count
pub const FALLBACK_INSTANCE_TYPES: &[&str] = &[
    "g4dn.xlarge",
    "g5.xlarge",
    "g6.xlarge",
    "g4dn.2xlarge",
    "g5.2xlarge",
    "g6.2xlarge",
    "p3.2xlarge",
    "g4dn.4xlarge",
    "g5.4xlarge",
    "g6.4xlarge",
    "g4dn.8xlarge",
    "g5.8xlarge",
    "p3.8xlarge",
    "g5.12xlarge",
    "g5.16xlarge",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PricingModel {
    Spot,
    OnDemand,
}

impl std::fmt::Display for PricingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PricingModel::Spot => write!(f, "spot"),
            PricingModel::OnDemand => write!(f, "on-demand"),
        }
    }
}

/// vCPU quota family an instance type draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaFamily {
    /// G and VT instances
    Graphics,
    /// P instances
    Accelerated,
    /// A, C, D, H, I, M, R, T, Z instances
    Standard,
}

impl QuotaFamily {
    pub fn of(instance_type: &str) -> Self {
        let prefix: String = instance_type
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_lowercase();
        match prefix.as_str() {
            "g" | "vt" => QuotaFamily::Graphics,
            "p" => QuotaFamily::Accelerated,
            _ => QuotaFamily::Standard,
        }
    }

    pub fn on_demand_code(&self) -> &'static str {
        match self {
            QuotaFamily::Graphics => "L-DB2E81BA",
            QuotaFamily::Accelerated => "L-417A185B",
            QuotaFamily::Standard => "L-1216C47A",
        }
    }

    pub fn spot_code(&self) -> &'static str {
        match self {
            QuotaFamily::Graphics => "L-3819A6DF",
            QuotaFamily::Accelerated => "L-7212CCBC",
            QuotaFamily::Standard => "L-34B43A08",
        }
    }
}

/// Quota values read for one decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub on_demand_vcpu_quota: u32,
    pub spot_vcpu_quota: u32,
    pub vcpus_required_for_instance_type: u32,
}

impl QuotaSnapshot {
    pub fn spot_fits(&self) -> bool {
        self.vcpus_required_for_instance_type <= self.spot_vcpu_quota
    }

    pub fn on_demand_fits(&self) -> bool {
        self.vcpus_required_for_instance_type <= self.on_demand_vcpu_quota
    }
}

/// Everything an operator needs to ask for more quota
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaIncreaseRequest {
    pub region: String,
    pub instance_type: String,
    pub family: QuotaFamily,
    pub service_code: String,
    pub on_demand_quota_code: String,
    pub spot_quota_code: String,
    pub current: QuotaSnapshot,
    pub suggested_value: u32,
    pub console_urls: Vec<String>,
    pub cli_commands: Vec<String>,
}

impl QuotaIncreaseRequest {
    fn new(region: &str, instance_type: &str, snapshot: QuotaSnapshot) -> Self {
        let family = QuotaFamily::of(instance_type);
        let suggested_value = snapshot.vcpus_required_for_instance_type;
        let codes = [family.on_demand_code(), family.spot_code()];

        Self {
            region: region.to_string(),
            instance_type: instance_type.to_string(),
            family,
            service_code: QUOTA_SERVICE.to_string(),
            on_demand_quota_code: codes[0].to_string(),
            spot_quota_code: codes[1].to_string(),
            current: snapshot,
            suggested_value,
            console_urls: codes
                .iter()
                .map(|code| {
                    format!(
                        "https://{region}.console.aws.amazon.com/servicequotas/home/services/{QUOTA_SERVICE}/quotas/{code}"
                    )
                })
                .collect(),
            cli_commands: codes
                .iter()
                .map(|code| {
                    format!(
                        "aws service-quotas request-service-quota-increase --service-code {QUOTA_SERVICE} --quota-code {code} --desired-value {suggested_value} --region {region}"
                    )
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum QuotaDecision {
    Selected {
        instance_type: String,
        pricing: PricingModel,
        snapshot: QuotaSnapshot,
        /// Requested type when a fallback was chosen
        substituted_for: Option<String>,
    },
    IncreaseRequired(QuotaIncreaseRequest),
}

pub struct QuotaAdvisor<'a> {
    ctx: &'a RunContext,
}

impl<'a> QuotaAdvisor<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx }
    }

    /// Read the current quota snapshot for an instance type
    pub async fn snapshot(&self, instance_type: &str) -> Result<Option<QuotaSnapshot>> {
        let cloud = &self.ctx.cloud;
        let Some(vcpus) = cloud.instance_vcpus(instance_type).await? else {
            return Ok(None);
        };
        let family = QuotaFamily::of(instance_type);
        let on_demand = cloud
            .service_quota(QUOTA_SERVICE, family.on_demand_code())
            .await?
            .unwrap_or(0);
        let spot = cloud
            .service_quota(QUOTA_SERVICE, family.spot_code())
            .await?
            .unwrap_or(0);

        Ok(Some(QuotaSnapshot {
            on_demand_vcpu_quota: on_demand,
            spot_vcpu_quota: spot,
            vcpus_required_for_instance_type: vcpus,
        }))
    }

    pub async fn advise(&self, instance_type: &str) -> Result<QuotaDecision> {
        self.advise_inner(instance_type.to_string(), None).await
    }

    fn advise_inner<'b>(
        &'b self,
        instance_type: String,
        substituted_for: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<QuotaDecision>> + Send + 'b>> {
        Box::pin(async move {
            let region = self.ctx.cloud.region().to_string();
            let Some(snapshot) = self.snapshot(&instance_type).await? else {
                return Err(CoreError::UnknownInstanceType(instance_type));
            };

            tracing::debug!(
                instance_type = %instance_type,
                vcpus = snapshot.vcpus_required_for_instance_type,
                spot = snapshot.spot_vcpu_quota,
                on_demand = snapshot.on_demand_vcpu_quota,
                "quota snapshot"
            );

            if snapshot.spot_fits() {
                return Ok(QuotaDecision::Selected {
                    instance_type,
                    pricing: PricingModel::Spot,
                    snapshot,
                    substituted_for,
                });
            }
            if snapshot.on_demand_fits() {
                return Ok(QuotaDecision::Selected {
                    instance_type,
                    pricing: PricingModel::OnDemand,
                    snapshot,
                    substituted_for,
                });
            }

            if let Some(candidate) = self
                .find_fallback(snapshot.vcpus_required_for_instance_type)
                .await?
            {
                tracing::info!(
                    requested = %instance_type,
                    candidate = %candidate,
                    "trying a smaller instance type"
                );
                let original = substituted_for
                    .clone()
                    .unwrap_or_else(|| instance_type.clone());
                let decision = self.advise_inner(candidate, Some(original)).await?;
                if matches!(decision, QuotaDecision::Selected { .. }) {
                    return Ok(decision);
                }
            }

            Ok(QuotaDecision::IncreaseRequired(QuotaIncreaseRequest::new(
                &region,
                substituted_for.as_deref().unwrap_or(&instance_type),
                snapshot,
            )))
        })
    }

    /// Largest ladder entry below `required` vCPUs that is offered in the
    /// region and fits one of its family's quotas
    async fn find_fallback(&self, required: u32) -> Result<Option<String>> {
        for candidate in FALLBACK_INSTANCE_TYPES.iter().rev() {
            let Some(snapshot) = self.snapshot(candidate).await? else {
                continue;
            };
            if snapshot.vcpus_required_for_instance_type >= required {
                continue;
            }
            if !(snapshot.spot_fits() || snapshot.on_demand_fits()) {
                continue;
            }
            if self.ctx.cloud.zones_offering(candidate).await?.is_empty() {
                continue;
            }
            return Ok(Some(candidate.to_string()));
        }
        Ok(None)
    }
}
