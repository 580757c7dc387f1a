//! Interactive answers to the orchestrator's decision points

use colored::Colorize;
use gpufleet_core::failover::ZoneFailoverRequest;
use gpufleet_core::{Classification, Decider, RollbackDecision};
use std::io::Write;

/// Prompts on stdin unless the answer was given on the command line.
/// A closed or empty stdin declines.
pub struct StdinDecider {
    assume_yes: bool,
    keep_partial: bool,
}

impl StdinDecider {
    pub fn new(assume_yes: bool, keep_partial: bool) -> Self {
        Self {
            assume_yes,
            keep_partial,
        }
    }
}

impl Decider for StdinDecider {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        ask(&format!("{} [y/N]: ", prompt)).is_some_and(|answer| is_yes(&answer))
    }

    fn rollback_decision(&self, failure: &Classification, created: usize) -> RollbackDecision {
        if self.keep_partial {
            return RollbackDecision::KeepPartial;
        }
        if self.assume_yes {
            return RollbackDecision::Rollback;
        }

        println!();
        println!("{} {}", "Apply failed:".red().bold(), failure.category);
        println!("  {}", failure.hint.dimmed());
        let prompt = if created > 0 {
            format!("Roll back the {} resources created so far? [y/N]: ", created)
        } else {
            "Run a rollback anyway? [y/N]: ".to_string()
        };

        match ask(&prompt) {
            Some(answer) if is_yes(&answer) => RollbackDecision::Rollback,
            _ => RollbackDecision::KeepPartial,
        }
    }

    fn select_zone(&self, request: &ZoneFailoverRequest) -> Option<String> {
        if request.candidate_zones.is_empty() {
            return None;
        }
        if self.assume_yes {
            return request.candidate_zones.first().cloned();
        }

        println!();
        match request.failed_zone {
            Some(ref zone) => println!("{} {}", "No capacity in".yellow(), zone.cyan()),
            None => println!("{}", "No capacity in the requested zone".yellow()),
        }
        for (i, zone) in request.candidate_zones.iter().enumerate() {
            println!("  {}) {}", i + 1, zone);
        }

        let answer = ask("Retry in zone [number, empty to stop]: ")?;
        let index: usize = answer.parse().ok()?;
        request
            .candidate_zones
            .get(index.checked_sub(1)?)
            .cloned()
    }
}

fn ask(prompt: &str) -> Option<String> {
    print!("{}", prompt);
    std::io::stdout().flush().ok()?;

    let mut input = String::new();
    match std::io::stdin().read_line(&mut input) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(input.trim().to_string()),
    }
}

fn is_yes(answer: &str) -> bool {
    answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpufleet_core::FailureCategory;

    #[test]
    fn test_flags_answer_without_prompting() {
        let failure = Classification::new(FailureCategory::InvalidParameter, "Error: bad");

        let keep = StdinDecider::new(true, true);
        assert_eq!(keep.rollback_decision(&failure, 3), RollbackDecision::KeepPartial);
        assert!(keep.confirm("delete?"));

        let roll = StdinDecider::new(true, false);
        assert_eq!(roll.rollback_decision(&failure, 3), RollbackDecision::Rollback);

        let request = ZoneFailoverRequest {
            failed_zone: Some("us-east-1a".into()),
            candidate_zones: vec!["us-east-1b".into(), "us-east-1c".into()],
            selected_zone: None,
        };
        assert_eq!(roll.select_zone(&request).as_deref(), Some("us-east-1b"));
    }

    #[test]
    fn test_no_candidates_declines() {
        let decider = StdinDecider::new(true, false);
        let request = ZoneFailoverRequest {
            failed_zone: None,
            candidate_zones: vec![],
            selected_zone: None,
        };
        assert_eq!(decider.select_zone(&request), None);
    }

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y"));
        assert!(is_yes("YES"));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
    }
}
