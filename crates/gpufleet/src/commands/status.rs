use super::Session;
use crate::decider::StdinDecider;
use crate::utils;
use colored::Colorize;
use gpufleet_config::Settings;
use std::process::ExitCode;

pub async fn handle(settings: Settings, json: bool) -> anyhow::Result<ExitCode> {
    let session = Session::open(settings, StdinDecider::new(false, false));
    let ctx = &session.ctx;
    let record = ctx.current_record().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{:<12} {}", "Project:".bold(), ctx.project());
    println!("{:<12} {}", "Environment:".bold(), ctx.environment());
    match record {
        Some(record) => {
            println!("{:<12} {}", "State:".bold(), utils::colored_state(record.state));
            println!(
                "{:<12} {}",
                "Updated:".bold(),
                record.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            if let Some(detail) = record.detail {
                println!("{:<12} {}", "Detail:".bold(), detail);
            }
        }
        None => {
            println!(
                "{:<12} {}",
                "State:".bold(),
                utils::colored_state(gpufleet_cloud::DeploymentState::NotDeployed)
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}
