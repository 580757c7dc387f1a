use super::{Session, print_target};
use crate::decider::StdinDecider;
use crate::utils;
use colored::Colorize;
use gpufleet_config::Settings;
use gpufleet_core::{DeployOptions, DeployPipeline};
use std::process::ExitCode;

/// Quota advice and the conflict battery. Remediation may still change
/// the variable file or delete orphans, so the state lock is held.
pub async fn handle(settings: Settings, yes: bool) -> anyhow::Result<ExitCode> {
    let session = Session::open_locked(settings, StdinDecider::new(yes, false)).await?;
    print_target(&session.ctx);

    let report = DeployPipeline::new(&session.ctx, DeployOptions::default())
        .preflight()
        .await;
    session.close().await?;
    let report = report?;

    utils::print_quota(&report.quota);
    if let Some(ref plan) = report.plan {
        println!();
        println!(
            "{} {} to create, {} to change, {} to replace, {} to destroy",
            "Plan:".bold(),
            plan.to_create,
            plan.to_update,
            plan.to_replace,
            plan.to_destroy
        );
    }
    if let Some(ref scan) = report.scan {
        utils::print_scan(scan);
    }

    println!();
    if report.is_clear() {
        println!("{}", "Pre-flight clear".green().bold());
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{}", "Pre-flight not clear".red().bold());
        Ok(ExitCode::FAILURE)
    }
}
