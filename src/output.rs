//! Terminal output for the CLI.
//!
//! All user-facing printing goes through [`OutputFormatter`]. Diagnostics go
//! through `tracing` instead.

use crate::file_mover::MoveStatus;
use crate::file_organizer::RunSummary;
use crate::scheduler::ScheduleTrigger;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;

/// Manages all CLI output with consistent styling and formatting.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// ```no_run
    /// use autotidy::output::OutputFormatter;
    /// OutputFormatter::success("Directory organized");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red to stderr.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Creates a spinner that shows the file being processed.
    pub fn create_spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {pos} files {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    }

    /// Prints a value as pretty JSON on stdout.
    pub fn print_json<T: Serialize>(value: &T) -> serde_json::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// Prints the per-category table, new categories and failures of a run.
    pub fn summary_table(summary: &RunSummary) {
        Self::header(if summary.dry_run {
            "SUMMARY (dry run)"
        } else {
            "SUMMARY"
        });
        for line in format_summary(summary) {
            println!("{}", line);
        }
    }

    /// Prints every outcome, one line per file.
    pub fn outcome_list(summary: &RunSummary) {
        for outcome in &summary.outcomes {
            let name = outcome
                .source
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let destination = outcome
                .destination
                .strip_prefix(&summary.directory)
                .unwrap_or(&outcome.destination)
                .display()
                .to_string();
            match outcome.status {
                MoveStatus::Moved => println!("  {} {} → {}", "✓".green(), name, destination),
                MoveStatus::Skipped => {
                    println!("  {} {} → {}", "→".yellow(), name, destination)
                }
                MoveStatus::Failed => println!(
                    "  {} {}: {}",
                    "✗".red(),
                    name,
                    outcome.reason.as_deref().unwrap_or("unknown error")
                ),
            }
        }
    }

    /// Prints the trigger list with last and next firing times.
    pub fn schedule_listing(triggers: &[ScheduleTrigger]) {
        Self::header("SCHEDULE");
        if triggers.is_empty() {
            println!("  (no triggers, only the startup run)");
            return;
        }
        for trigger in triggers {
            let last = trigger
                .last_fired()
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".to_string());
            println!(
                "  {:<18} next {}  last {}",
                trigger.kind().to_string().bold(),
                trigger
                    .next_due()
                    .format("%Y-%m-%d %H:%M")
                    .to_string()
                    .green(),
                last
            );
        }
    }
}

fn file_word(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}

/// Renders the summary table as lines.
pub fn format_summary(summary: &RunSummary) -> Vec<String> {
    let mut lines = Vec::new();

    let width = summary
        .per_category
        .keys()
        .map(|name| name.len())
        .max()
        .unwrap_or(0)
        .max(8);

    lines.push(format!(
        "{:<width$} | {}",
        "Category".bold(),
        "Files".bold(),
        width = width
    ));
    lines.push("-".repeat(width + 10));
    for (category, count) in &summary.per_category {
        lines.push(format!(
            "{:<width$} | {} {}",
            category,
            count.to_string().green(),
            file_word(*count),
            width = width
        ));
    }
    lines.push("-".repeat(width + 10));

    let handled = if summary.dry_run {
        summary.skipped
    } else {
        summary.moved
    };
    lines.push(format!(
        "{:<width$} | {} {}",
        "Total".bold(),
        handled.to_string().green().bold(),
        file_word(handled),
        width = width
    ));

    if !summary.new_categories.is_empty() {
        lines.push(format!(
            "New categories: {}",
            summary.new_categories.join(", ").cyan()
        ));
    }

    if summary.failed > 0 {
        lines.push(format!(
            "{} {} could not be moved:",
            summary.failed.to_string().red().bold(),
            file_word(summary.failed)
        ));
        for outcome in summary.outcomes.iter().filter(|o| o.is_failed()) {
            lines.push(format!(
                "  - {}: {}",
                outcome.source.display(),
                outcome.reason.as_deref().unwrap_or("unknown error")
            ));
        }
    }

    lines
}
