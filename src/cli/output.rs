//! Output formatting and progress indicators
//!
//! This module provides utilities for displaying progress spinners,
//! status messages and the run summary.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::core::job::JobState;
use crate::core::orchestrator::RunReport;
use crate::core::resolver::ResolutionWarning;

/// Create a spinner for operations with unknown duration
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.blue} {msg}")
            .expect("Invalid spinner template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}

/// Print reproducibility warnings collected during resolution
pub fn print_warnings(warnings: &[ResolutionWarning]) {
    if let Some(line) = warning_summary(warnings) {
        eprintln!("{} {line}", status::WARNING);
    }
}

/// One-line summary naming each affected dependency once
pub fn warning_summary(warnings: &[ResolutionWarning]) -> Option<String> {
    if warnings.is_empty() {
        return None;
    }
    let mut names: Vec<&str> = Vec::new();
    for warning in warnings {
        if !names.contains(&warning.dependency()) {
            names.push(warning.dependency());
        }
    }
    Some(format!(
        "{} dependency warning(s) for {} - this run may not be reproducible",
        warnings.len(),
        names.join(", ")
    ))
}

/// Format a duration as `1h02m03s`, `2m03s` or `3.2s`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m{:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

/// Render the per-job summary table
pub fn run_summary(report: &RunReport) -> String {
    let width = report
        .outcomes
        .iter()
        .map(|o| o.name.len())
        .max()
        .unwrap_or(0)
        .max("JOB".len());

    let mut lines = vec![format!("  {:<width$}  {:>6}  {:>9}  DIRECTORY", "JOB", "STATUS", "TIME")];
    for outcome in &report.outcomes {
        let symbol = match outcome.state {
            JobState::Terminated => status::WARNING,
            _ if outcome.succeeded() => status::SUCCESS,
            _ => status::ERROR,
        };
        let time = outcome.duration.map(format_duration).unwrap_or_else(|| "-".to_string());
        lines.push(format!(
            "{symbol} {:<width$}  {:>6}  {:>9}  {}",
            outcome.name,
            outcome.exit_status,
            time,
            outcome.job_dir.display()
        ));
    }
    lines.join("\n")
}

/// Print the per-job summary and an overall verdict
pub fn print_run_summary(report: &RunReport) {
    if report.outcomes.is_empty() {
        return;
    }
    println!("{}", run_summary(report));

    let failures = report.failures();
    if failures == 0 {
        println!("{} All {} job(s) succeeded", status::SUCCESS, report.outcomes.len());
    } else {
        println!(
            "{} {failures} of {} job(s) failed",
            status::ERROR,
            report.outcomes.len()
        );
    }
}

/// Print an error and its causes to stderr
pub fn display_error(error: &anyhow::Error) {
    eprintln!("{} Error: {error}", status::ERROR);
    for cause in error.chain().skip(1) {
        eprintln!("  caused by: {cause}");
    }
}
