//! Zone failover negotiation
//!
//! Only an insufficient-capacity failure opens a negotiation. The
//! negotiator proposes zones and records the operator's pick; the deploy
//! pipeline persists it and runs a fresh plan/apply. Nothing here retries.

use crate::classify::{Classification, FailureCategory};
use crate::context::RunContext;
use crate::error::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneFailoverRequest {
    pub failed_zone: Option<String>,
    /// In discovery order, failed zone excluded
    pub candidate_zones: Vec<String>,
    pub selected_zone: Option<String>,
}

const ZONE_PATTERN: &str = r"\b[a-z]{2}(?:-gov)?-[a-z]+-\d[a-z]\b";
const REQUESTED_ZONE_PATTERN: &str =
    r"Availability Zone you requested \((?P<zone>[a-z]{2}(?:-gov)?-[a-z]+-\d[a-z])\)";

/// Failed zone and candidate zones named in a provider error message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ZoneMentions {
    pub failed: Option<String>,
    pub candidates: Vec<String>,
}

pub fn extract_zones(text: &str) -> Result<ZoneMentions> {
    let zone = Regex::new(ZONE_PATTERN)?;
    let requested = Regex::new(REQUESTED_ZONE_PATTERN)?;

    let failed = requested.captures(text).map(|c| c["zone"].to_string());

    let mut candidates: Vec<String> = Vec::new();
    for m in zone.find_iter(text) {
        let z = m.as_str().to_string();
        if Some(&z) != failed.as_ref() && !candidates.contains(&z) {
            candidates.push(z);
        }
    }

    Ok(ZoneMentions { failed, candidates })
}

pub struct ZoneFailoverNegotiator<'a> {
    ctx: &'a RunContext,
}

impl<'a> ZoneFailoverNegotiator<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx }
    }

    /// `None` unless the failure is insufficient instance capacity
    pub async fn negotiate(
        &self,
        failure: &Classification,
        instance_type: &str,
        current_zone: Option<&str>,
    ) -> Result<Option<ZoneFailoverRequest>> {
        if failure.category != FailureCategory::InsufficientInstanceCapacity {
            return Ok(None);
        }

        let mentions = extract_zones(&failure.raw)?;
        let failed_zone = mentions.failed.or_else(|| current_zone.map(String::from));

        let mut candidates = mentions.candidates;
        if candidates.is_empty() {
            candidates = self.ctx.cloud.zones_offering(instance_type).await?;
            if candidates.is_empty() {
                candidates = self.ctx.cloud.available_zones().await?;
            }
        }
        candidates.retain(|z| Some(z) != failed_zone.as_ref());

        let mut request = ZoneFailoverRequest {
            failed_zone,
            candidate_zones: candidates,
            selected_zone: None,
        };

        if request.candidate_zones.is_empty() {
            tracing::warn!(instance_type, "no alternate zone offers the instance type");
            return Ok(Some(request));
        }

        request.selected_zone = self
            .ctx
            .decider
            .select_zone(&request)
            .filter(|z| request.candidate_zones.contains(z));

        match request.selected_zone {
            Some(ref zone) => tracing::info!(
                failed = ?request.failed_zone,
                selected = %zone,
                "zone failover negotiated"
            ),
            None => tracing::info!("zone failover declined"),
        }
        Ok(Some(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestHarness;

    const CAPACITY_ERROR: &str = "Error: creating EC2 Instance: InsufficientInstanceCapacity: We currently do not have sufficient g5.xlarge capacity in the Availability Zone you requested (us-east-1a). Our system will be working on provisioning additional capacity. You can currently get g5.xlarge capacity by not specifying an Availability Zone in your request or choosing us-east-1b, us-east-1c, us-east-1d.";

    #[test]
    fn test_extract_zones_from_error() {
        let mentions = extract_zones(CAPACITY_ERROR).unwrap();
        assert_eq!(mentions.failed.as_deref(), Some("us-east-1a"));
        assert_eq!(
            mentions.candidates,
            vec!["us-east-1b", "us-east-1c", "us-east-1d"]
        );
    }

    #[tokio::test]
    async fn test_only_capacity_failures_negotiate() {
        let harness = TestHarness::new().assume_yes();
        let ctx = harness.context();
        let negotiator = ZoneFailoverNegotiator::new(&ctx);

        for category in FailureCategory::ALL {
            let failure = Classification::new(category, CAPACITY_ERROR);
            let request = negotiator
                .negotiate(&failure, "g5.xlarge", Some("us-east-1a"))
                .await
                .unwrap();
            assert_eq!(
                request.is_some(),
                category == FailureCategory::InsufficientInstanceCapacity,
                "{category}"
            );
        }
    }

    #[tokio::test]
    async fn test_selects_first_candidate_from_text() {
        let harness = TestHarness::new().assume_yes();
        let ctx = harness.context();
        let failure = Classification::new(FailureCategory::InsufficientInstanceCapacity, CAPACITY_ERROR);

        let request = ZoneFailoverNegotiator::new(&ctx)
            .negotiate(&failure, "g5.xlarge", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.selected_zone.as_deref(), Some("us-east-1b"));
    }

    #[tokio::test]
    async fn test_falls_back_to_provider_zones() {
        let harness = TestHarness::new().assume_yes();
        harness
            .cloud
            .offer("g5.xlarge", &["us-east-1a", "us-east-1c", "us-east-1f"]);
        let ctx = harness.context();
        let failure = Classification::new(
            FailureCategory::InsufficientInstanceCapacity,
            "InsufficientInstanceCapacity: try later",
        );

        let request = ZoneFailoverNegotiator::new(&ctx)
            .negotiate(&failure, "g5.xlarge", Some("us-east-1a"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.failed_zone.as_deref(), Some("us-east-1a"));
        assert_eq!(request.candidate_zones, vec!["us-east-1c", "us-east-1f"]);
        assert_eq!(request.selected_zone.as_deref(), Some("us-east-1c"));
    }

    #[tokio::test]
    async fn test_declined_selection() {
        let harness = TestHarness::new();
        let ctx = harness.context();
        let failure = Classification::new(FailureCategory::InsufficientInstanceCapacity, CAPACITY_ERROR);

        let request = ZoneFailoverNegotiator::new(&ctx)
            .negotiate(&failure, "g5.xlarge", None)
            .await
            .unwrap()
            .unwrap();
        assert!(request.selected_zone.is_none());
        assert_eq!(request.candidate_zones.len(), 3);
    }
}
