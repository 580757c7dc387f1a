use super::{Session, print_target};
use crate::decider::StdinDecider;
use crate::utils;
use colored::Colorize;
use gpufleet_config::Settings;
use gpufleet_core::{RollbackCoordinator, RollbackResult};
use std::process::ExitCode;

pub async fn handle(settings: Settings, yes: bool) -> anyhow::Result<ExitCode> {
    let session = Session::open_locked(settings, StdinDecider::new(yes, false)).await?;
    print_target(&session.ctx);

    let result = RollbackCoordinator::new(&session.ctx).request().await;
    session.close().await?;
    let result = result?;

    print_result(&result);
    Ok(match result {
        RollbackResult::RollbackFailed { .. } => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

pub fn print_result(result: &RollbackResult) {
    println!();
    match result {
        RollbackResult::RolledBack => println!("{}", "Rolled back".green().bold()),
        RollbackResult::Kept(state) => {
            println!("{} {}", "Resources kept, state:".yellow(), utils::colored_state(*state));
            println!("  {}", "roll back later with: gpufleet rollback".dimmed());
        }
        RollbackResult::RollbackFailed { error, report } => {
            println!("{}", "Rollback failed".red().bold());
            for line in error.lines().take(8) {
                println!("  {}", line.dimmed());
            }
            utils::print_report_path("manual steps", report);
        }
    }
}
