//! Terminal progress display for polling sessions.
//!
//! Uses `indicatif` for the spinner and `console` for colours. A
//! [`PollProgress`] mirrors what the poller observes; it never affects the
//! outcome of a session.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::poller::{JobStatus, PollOutcome};

/// Spinner that follows one polling session in the terminal.
///
/// Success is printed in green, failure in red and retries in yellow.
pub struct PollProgress {
    // Spinner drawn by indicatif.
    pb: ProgressBar,
    // Completed outcome.
    green: Style,
    // Failed outcome.
    red: Style,
    // Timed-out attempt being retried.
    yellow: Style,
}

impl PollProgress {
    /// Start a visible spinner labelled with `label`.
    pub fn start(label: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed_precise}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(label.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Self::with_bar(pb)
    }

    /// A progress display that draws nothing. Used when output is not a terminal.
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(pb: ProgressBar) -> Self {
        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        self.pb.set_message(msg.into());
    }

    /// Reflect the latest observed remote status.
    pub fn update_status(&self, job_id: &str, status: JobStatus) {
        self.pb.set_message(format!("{job_id}: {status}"));
    }

    /// Report a timed-out attempt against the retry budget.
    pub fn retry(&self, attempt: u32, max: u32, reason: &str) {
        self.pb.println(format!(
            "  {} Retry {attempt}/{max}: {reason}",
            self.yellow.apply_to("↻")
        ));
    }

    /// Clear the spinner and print the terminal outcome.
    pub fn complete(&self, outcome: &PollOutcome) {
        self.pb.finish_and_clear();
        if self.pb.is_hidden() {
            return;
        }
        match outcome {
            PollOutcome::Completed { .. } => {
                println!("  {} Job completed", self.green.apply_to("✓"));
            }
            PollOutcome::Failed { error_detail } => {
                println!("  {} Job failed: {error_detail}", self.red.apply_to("✗"));
            }
        }
    }

    /// Clear the spinner after a session ended without a terminal status.
    pub fn abandon(&self, reason: &str) {
        self.pb.finish_and_clear();
        if !self.pb.is_hidden() {
            println!("  {} {reason}", self.red.apply_to("✗"));
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.pb.is_hidden()
    }
}
