//! Command-line interface for autotidy.
//!
//! `organize` runs one pass over a directory. `schedule` shows or runs the
//! recurring scheduler until Ctrl+C.

use crate::config::{Config, ScheduleConfig};
use crate::error::ScheduleError;
use crate::file_category::CategoryRegistry;
use crate::file_organizer::{OrganizeOptions, OrganizerEngine, RunSummary};
use crate::logging::{LogOptions, setup_logging};
use crate::output::OutputFormatter;
use crate::scheduler::{Scheduler, StopHandle};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

/// Sort files into category folders by extension.
#[derive(Debug, Parser)]
#[command(name = "autotidy", version, about)]
pub struct Cli {
    /// Configuration file (defaults to ./.autotidy.toml, then ~/.config/autotidy/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write the log file as JSON lines
    #[arg(long, global = true)]
    pub json_log: bool,

    /// Log file path (overrides the configuration)
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Organize a directory once
    Organize {
        /// Directory to organize
        directory: PathBuf,

        /// Show what would be moved without touching anything
        #[arg(long)]
        dry_run: bool,

        /// Print the per-category summary table
        #[arg(long)]
        stats: bool,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Organize a directory on a recurring schedule
    Schedule {
        /// Directory to organize
        directory: PathBuf,

        /// Hours between runs (replaces the configured triggers)
        #[arg(long, value_name = "HOURS")]
        interval: Option<u64>,

        /// Daily run time, repeatable (replaces the configured triggers)
        #[arg(long = "at", value_name = "HH:MM")]
        at: Vec<String>,

        /// List the triggers and their next due times, then exit
        #[arg(long)]
        show: bool,
    },
}

/// Runs the parsed command line.
///
/// Returns a failing exit code when a run could not start.
pub fn run_cli(cli: Cli) -> Result<ExitCode> {
    let mut config = Config::load(cli.config.as_deref()).context("Error loading configuration")?;
    if let Some(log_file) = &cli.log_file {
        config.logging.file = Some(log_file.clone());
    }

    let _guard = setup_logging(&LogOptions {
        verbose: cli.verbose,
        json: cli.json_log || config.logging.json,
        file: config.logging.file.clone(),
    })?;

    tracing::debug!(?config, "Configuration loaded");

    let filters = config
        .compile_filters()
        .context("Error compiling filters")?;
    let engine = OrganizerEngine::new(Arc::new(CategoryRegistry::new()), filters);

    match cli.command {
        Commands::Organize {
            directory,
            dry_run,
            stats,
            json,
        } => organize_command(&engine, &directory, dry_run, stats, json),
        Commands::Schedule {
            directory,
            interval,
            at,
            show,
        } => {
            let schedule = schedule_overrides(&config.schedule, interval, at)
                .context("Invalid schedule")?;
            schedule_command(Arc::new(engine), directory, &schedule, show)
        }
    }
}

fn organize_command(
    engine: &OrganizerEngine,
    directory: &Path,
    dry_run: bool,
    stats: bool,
    json: bool,
) -> Result<ExitCode> {
    let summary = if json {
        engine.organize_with(directory, OrganizeOptions { dry_run }, |_| {})
    } else {
        if dry_run {
            OutputFormatter::dry_run_notice(&format!("Analyzing {}", directory.display()));
        } else {
            OutputFormatter::info(&format!("Organizing contents of: {}", directory.display()));
        }
        let spinner = OutputFormatter::create_spinner("");
        let summary = engine.organize_with(directory, OrganizeOptions { dry_run }, |outcome| {
            spinner.inc(1);
            if let Some(name) = outcome.source.file_name() {
                spinner.set_message(name.to_string_lossy().to_string());
            }
        });
        spinner.finish_and_clear();
        summary
    };

    if json {
        OutputFormatter::print_json(&summary).context("Failed to serialize run summary")?;
    } else {
        report_summary(&summary, stats);
    }

    Ok(if summary.is_fatal() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn report_summary(summary: &RunSummary, stats: bool) {
    if let Some(error) = &summary.fatal_error {
        OutputFormatter::error(error);
        return;
    }

    if summary.total_seen == 0 {
        OutputFormatter::info("No files found to organize.");
        return;
    }

    OutputFormatter::outcome_list(summary);
    if stats {
        OutputFormatter::summary_table(summary);
    }

    if summary.dry_run {
        OutputFormatter::dry_run_notice(&format!(
            "{} files would be moved. Nothing was modified.",
            summary.skipped
        ));
    } else if summary.failed > 0 {
        OutputFormatter::warning(&format!(
            "Moved {} of {} files, {} could not be moved.",
            summary.moved, summary.total_seen, summary.failed
        ));
    } else {
        OutputFormatter::success(&format!("Moved {} files.", summary.moved));
    }
}

/// Command-line triggers replace the configured ones when any is given.
fn schedule_overrides(
    configured: &ScheduleConfig,
    interval: Option<u64>,
    at: Vec<String>,
) -> Result<ScheduleConfig, ScheduleError> {
    if interval == Some(0) {
        return Err(ScheduleError::ZeroInterval);
    }
    if interval.is_none() && at.is_empty() {
        return Ok(configured.clone());
    }
    Ok(ScheduleConfig {
        interval_hours: interval.unwrap_or(0),
        daily_at: at,
        ..configured.clone()
    })
}

fn schedule_command(
    engine: Arc<OrganizerEngine>,
    directory: PathBuf,
    schedule: &ScheduleConfig,
    show: bool,
) -> Result<ExitCode> {
    let mut scheduler =
        Scheduler::from_config(engine, directory, schedule).context("Invalid schedule")?;

    if show {
        OutputFormatter::info(&format!(
            "Schedule for {}",
            scheduler.directory().display()
        ));
        OutputFormatter::schedule_listing(scheduler.triggers());
        return Ok(ExitCode::SUCCESS);
    }

    if scheduler.triggers().is_empty() {
        tracing::warn!(
            directory = %scheduler.directory().display(),
            "No schedule triggers configured, only the startup run will happen"
        );
        OutputFormatter::warning(
            "No triggers configured: the directory is organized once at startup only.",
        );
    }

    watch_ctrl_c(scheduler.stop_handle())?;
    OutputFormatter::info(&format!(
        "Scheduling {} (press Ctrl+C to stop)",
        scheduler.directory().display()
    ));
    OutputFormatter::schedule_listing(scheduler.triggers());

    let stats = scheduler.run();

    OutputFormatter::header("SCHEDULER STOPPED");
    println!(
        "  runs: {}  failed to start: {}  crashed: {}  files moved: {}  files failed: {}",
        stats.runs, stats.fatal_runs, stats.panicked_runs, stats.files_moved, stats.files_failed
    );
    Ok(ExitCode::SUCCESS)
}

/// Stops the scheduler on Ctrl+C. The signal is awaited on a helper thread
/// with its own single-threaded runtime.
fn watch_ctrl_c(handle: StopHandle) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build signal runtime")?;

    thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        tracing::info!("Interrupt received, stopping after the current run");
                        handle.stop();
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
                }
            });
        })
        .context("Failed to spawn signal thread")?;

    Ok(())
}
