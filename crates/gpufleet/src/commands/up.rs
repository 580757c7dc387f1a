use super::{Session, print_target};
use crate::decider::StdinDecider;
use crate::progress::ApplyProgressBar;
use crate::utils;
use colored::Colorize;
use gpufleet_config::Settings;
use gpufleet_core::{DeployOptions, DeployOutcome, DeployPipeline};
use std::process::ExitCode;

pub async fn handle(
    settings: Settings,
    yes: bool,
    override_blocked: bool,
    keep_partial: bool,
) -> anyhow::Result<ExitCode> {
    println!("{}", "Starting deployment...".blue().bold());
    let session = Session::open_locked(settings, StdinDecider::new(yes, keep_partial)).await?;
    print_target(&session.ctx);

    let mut view = ApplyProgressBar::new();
    let outcome = DeployPipeline::new(&session.ctx, DeployOptions { override_blocked })
        .run(&mut view)
        .await;
    session.close().await?;
    let outcome = outcome?;

    match outcome {
        DeployOutcome::Deployed {
            ref instance_type,
            pricing,
            zone_failovers,
            ref scan,
        } => {
            utils::print_scan(scan);
            println!();
            println!(
                "{} {} ({})",
                "Deployed:".green().bold(),
                instance_type.cyan(),
                pricing
            );
            if zone_failovers > 0 {
                println!("  after {} zone failover(s)", zone_failovers);
            }
        }
        DeployOutcome::QuotaHalted {
            ref request,
            ref report,
        } => {
            println!();
            println!(
                "{} no candidate type fits the vCPU quota in {}",
                "Halted:".red().bold(),
                request.region
            );
            for command in &request.cli_commands {
                println!("  {}", command.dimmed());
            }
            utils::print_report_path("request details", report);
        }
        DeployOutcome::Blocked { ref scan } => {
            utils::print_scan(scan);
            println!();
            let names: Vec<&str> = scan.blocked().iter().map(|c| c.name.as_str()).collect();
            println!("{} {}", "Blocked by:".red().bold(), names.join(", "));
            println!(
                "  {}",
                "resolve the checks above or rerun with --override-blocked".dimmed()
            );
        }
        DeployOutcome::Failed {
            ref failure,
            ref rollback,
            ref report,
            zone_failovers,
        } => {
            utils::print_failure(failure);
            if let Some(report) = report {
                utils::print_report_path("missing permissions", report);
            }
            if zone_failovers > 0 {
                println!("  after {} zone failover(s)", zone_failovers);
            }
            super::rollback::print_result(rollback);
        }
    }

    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
