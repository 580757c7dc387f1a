use super::{Session, print_target};
use crate::decider::StdinDecider;
use crate::utils;
use colored::Colorize;
use gpufleet_config::Settings;
use gpufleet_core::{CleanupOptions, run_cleanup};
use std::process::ExitCode;

pub async fn handle(
    settings: Settings,
    dry_run: bool,
    force: bool,
    prefix: Option<String>,
    network: Option<String>,
) -> anyhow::Result<ExitCode> {
    let session = Session::open_locked(settings, StdinDecider::new(false, false)).await?;
    print_target(&session.ctx);

    let options = CleanupOptions {
        dry_run,
        force,
        prefix,
        network_id: network,
    };
    let report = run_cleanup(&session.ctx, options).await;
    session.close().await?;
    let report = report?;

    utils::print_cleanup(&report);
    println!();

    if report.dry_run {
        println!("{}", "Dry run, nothing deleted".cyan());
        return Ok(ExitCode::SUCCESS);
    }
    if !report.confirmed {
        println!("{}", "Cleanup cancelled".yellow());
        return Ok(ExitCode::SUCCESS);
    }
    if report.is_noop() {
        println!("{}", "Nothing to clean up".green());
        return Ok(ExitCode::SUCCESS);
    }
    if report.is_success() {
        println!("{}", "Cleanup complete".green().bold());
        Ok(ExitCode::SUCCESS)
    } else {
        println!(
            "{} {} deletions failed",
            "Cleanup incomplete:".red().bold(),
            report.log.failed.len()
        );
        Ok(ExitCode::FAILURE)
    }
}
