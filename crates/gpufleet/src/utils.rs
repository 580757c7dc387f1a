use colored::Colorize;
use gpufleet_cloud::DeploymentState;
use gpufleet_core::{
    CheckStatus, Classification, CleanupReport, QuotaCheck, QuotaDecision, ScanReport,
    StrategyOutcome,
};
use std::path::Path;

/// Check table: one row per check, remediation attempts underneath
pub fn print_scan(scan: &ScanReport) {
    println!();
    println!("{}", "Pre-flight checks:".bold());
    for check in &scan.checks {
        let status = match check.status {
            CheckStatus::Pass => "pass".green(),
            CheckStatus::Remediated => "remediated".cyan(),
            CheckStatus::Blocked if check.blocking => "blocked".red().bold(),
            CheckStatus::Blocked => "unresolved".yellow(),
            CheckStatus::Pending => "pending".dimmed(),
        };
        println!(
            "  {:<12} {:<36} {}",
            status,
            check.name,
            check.kind.to_string().dimmed()
        );

        for record in &check.remediation_log {
            let outcome = match record.outcome {
                StrategyOutcome::Resolved => record.outcome.to_string().green(),
                StrategyOutcome::Partial => record.outcome.to_string().yellow(),
                StrategyOutcome::Failed => record.outcome.to_string().red(),
                StrategyOutcome::NotApplicable => record.outcome.to_string().dimmed(),
            };
            println!("      {} {}: {}", record.strategy, outcome, record.detail);
            if let Some(ref backup) = record.backup {
                println!("        backup: {}", backup.display());
            }
        }
        if let Some(ref report) = check.manual_report {
            print_report_path("manual steps", report);
        }
    }
}

pub fn print_quota(check: &QuotaCheck) {
    println!();
    match check.decision {
        QuotaDecision::Selected {
            ref instance_type,
            pricing,
            ref snapshot,
            ref substituted_for,
        } => {
            println!(
                "{} {} ({})",
                "Instance type:".bold(),
                instance_type.cyan(),
                pricing
            );
            if let Some(requested) = substituted_for {
                println!(
                    "  {}",
                    format!("{} does not fit the current quota", requested).yellow()
                );
            }
            println!(
                "  vCPU quota: on-demand {}, spot {}; needs {}",
                snapshot.on_demand_vcpu_quota,
                snapshot.spot_vcpu_quota,
                snapshot.vcpus_required_for_instance_type
            );
        }
        QuotaDecision::IncreaseRequired(ref request) => {
            println!(
                "{} {} needs {} vCPUs in {}",
                "Quota increase required:".red().bold(),
                request.instance_type,
                request.suggested_value,
                request.region
            );
            for command in &request.cli_commands {
                println!("  {}", command.dimmed());
            }
            if let Some(ref report) = check.report {
                print_report_path("request details", report);
            }
        }
    }
}

pub fn print_failure(failure: &Classification) {
    println!();
    println!("{} {}", "Failure:".red().bold(), failure.category);
    println!("  {}", failure.hint);
    for line in failure.raw.lines().take(12) {
        println!("  {}", line.dimmed());
    }
}

pub fn print_cleanup(report: &CleanupReport) {
    println!();
    let title = if report.dry_run {
        format!("Cleanup dry run ({})", report.scope)
    } else {
        format!("Cleanup ({})", report.scope)
    };
    println!("{}", title.bold());

    for stage in &report.stages {
        if stage.discovered == 0 {
            continue;
        }
        let failed = if stage.failed > 0 {
            format!("{} failed", stage.failed).red()
        } else {
            "0 failed".normal()
        };
        println!(
            "  {:>2}. {:<28} found {:<3} deleted {:<3} {} skipped {}",
            stage.number, stage.name, stage.discovered, stage.deleted, failed, stage.skipped
        );
    }

    for action in &report.log.failed {
        println!(
            "  {} {} {}: {}",
            "✗".red(),
            action.kind,
            action.resource_id,
            action.error.as_deref().unwrap_or("unknown error")
        );
    }
    if report.dry_run {
        for action in &report.log.skipped {
            println!("  {} {}", "•".cyan(), action.message);
        }
    }
}

pub fn colored_state(state: DeploymentState) -> colored::ColoredString {
    let text = state.to_string();
    match state {
        DeploymentState::Deployed => text.green(),
        DeploymentState::NotDeployed | DeploymentState::Destroyed | DeploymentState::RolledBack => {
            text.normal()
        }
        DeploymentState::PartialDeploy => text.yellow(),
        DeploymentState::Failed | DeploymentState::RollbackFailed => text.red(),
    }
}

pub fn print_report_path(label: &str, path: &Path) {
    println!("  {} {}", format!("{}:", label).dimmed(), path.display().to_string().cyan());
}
