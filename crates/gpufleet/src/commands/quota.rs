use super::{Session, print_target};
use crate::decider::StdinDecider;
use crate::utils;
use gpufleet_config::Settings;
use gpufleet_core::{DeployOptions, DeployPipeline, QuotaDecision};
use std::process::ExitCode;

/// Quota advice only; nothing is written to the variable file
pub async fn handle(settings: Settings) -> anyhow::Result<ExitCode> {
    let session = Session::open(settings, StdinDecider::new(false, false));
    print_target(&session.ctx);

    let check = DeployPipeline::new(&session.ctx, DeployOptions::default())
        .check_quota(false)
        .await?;
    utils::print_quota(&check);

    Ok(match check.decision {
        QuotaDecision::Selected { .. } => ExitCode::SUCCESS,
        QuotaDecision::IncreaseRequired(_) => ExitCode::FAILURE,
    })
}
