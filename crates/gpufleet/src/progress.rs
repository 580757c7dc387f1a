use gpufleet_core::monitor::Termination;
use gpufleet_core::{ApplyOutcome, ApplyProgress, ProgressView};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Apply progress as a percentage bar with the resource being created
#[derive(Default)]
pub struct ApplyProgressBar {
    progress_bar: Option<ProgressBar>,
}

impl ApplyProgressBar {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressView for ApplyProgressBar {
    fn start(&mut self, total: usize) {
        let pb = ProgressBar::new(100);
        match ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos:>3}% {msg}",
        ) {
            Ok(style) => pb.set_style(style.progress_chars("=>-")),
            Err(e) => tracing::debug!(error = %e, "falling back to the default bar style"),
        }
        pb.set_message(format!("0/{} resources", total));
        pb.enable_steady_tick(Duration::from_millis(120));
        self.progress_bar = Some(pb);
    }

    fn update(&mut self, progress: &ApplyProgress, percent: u8) {
        let Some(ref pb) = self.progress_bar else {
            return;
        };
        pb.set_position(u64::from(percent));
        pb.set_message(message(progress));
    }

    fn finish(&mut self, outcome: &ApplyOutcome) {
        let Some(pb) = self.progress_bar.take() else {
            return;
        };
        pb.set_position(u64::from(outcome.percent));
        match outcome.termination {
            Termination::Completed => pb.finish_with_message(format!(
                "{}/{} resources, apply complete",
                outcome.progress.created_count, outcome.progress.total_resources
            )),
            Termination::ErrorMarker => pb.abandon_with_message("apply failed"),
            Termination::Unexpected => {
                pb.abandon_with_message("apply ended without a completion marker")
            }
        }
    }
}

fn message(progress: &ApplyProgress) -> String {
    let counts = format!(
        "{}/{} resources",
        progress.created_count, progress.total_resources
    );
    match progress.current_resource_name {
        Some(ref name) => format!("{} ({})", counts, name),
        None => counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_names_current_resource() {
        let mut progress = ApplyProgress::new(4);
        assert_eq!(message(&progress), "0/4 resources");

        progress.created_count = 1;
        progress.current_resource_name = Some("aws_instance.gpu".into());
        assert_eq!(message(&progress), "1/4 resources (aws_instance.gpu)");
    }

    #[test]
    fn test_update_before_start_is_ignored() {
        let mut view = ApplyProgressBar::new();
        view.update(&ApplyProgress::new(2), 50);
        assert!(view.progress_bar.is_none());
    }
}
