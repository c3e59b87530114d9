//! Terminal output — spinners and colored result lines.
//!
//! The engine itself only returns structured values; everything printed to
//! the terminal goes through here, using `indicatif` for the wall-clock
//! waits and `console` styles for results.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::engine::AcquireOutcome;

pub struct Ui {
    green: Style,
    red: Style,
    yellow: Style,
}

impl Ui {
    pub fn new() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Spinner shown while waiting for a wall-clock instant. The caller
    /// finishes it when the wait ends.
    pub fn waiting(&self, message: String) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("invalid template"),
        );
        pb.set_message(message);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }

    pub fn login_ok(&self, username: &str) {
        println!("  {} {username} logged in", self.green.apply_to("✓"));
    }

    pub fn login_failed(&self, username: &str, reason: &str) {
        println!("  {} {username} login failed: {reason}", self.red.apply_to("✗"));
    }

    pub fn task_skipped(&self, label: &str, weekday: &str) {
        println!(
            "  {} {label}: not scheduled on {weekday}",
            self.yellow.apply_to("·")
        );
    }

    pub fn task_result(&self, label: &str, outcome: &AcquireOutcome) {
        match outcome {
            AcquireOutcome::Acquired { seat, attempts } => {
                println!(
                    "  {} {label}: seat {seat} acquired after {attempts} attempt(s)",
                    self.green.apply_to("✓")
                );
            }
            AcquireOutcome::Exhausted { reports } => {
                println!(
                    "  {} {label}: all {} candidate(s) exhausted",
                    self.red.apply_to("✗"),
                    reports.len()
                );
            }
            AcquireOutcome::ReauthFailed { .. } => {
                println!(
                    "  {} {label}: session could not be re-authenticated",
                    self.red.apply_to("✗")
                );
            }
        }
    }

    /// Full structured outcome, for `--verbose` runs.
    pub fn print_outcome_json(&self, label: &str, outcome: &AcquireOutcome) {
        println!("{}", self.yellow.apply_to(format!("─── {label} ───")));
        println!(
            "{}",
            serde_json::to_string_pretty(outcome).unwrap_or_default()
        );
    }

    pub fn checkin_ok(&self, username: &str, reservation_id: i64) {
        println!(
            "  {} {username}: checked in to reservation {reservation_id}",
            self.green.apply_to("✓")
        );
    }

    pub fn checkin_failed(&self, username: &str, reason: &str) {
        println!(
            "  {} {username}: check-in failed: {reason}",
            self.red.apply_to("✗")
        );
    }

    pub fn note(&self, message: &str) {
        println!("  {} {message}", self.yellow.apply_to("·"));
    }
}
