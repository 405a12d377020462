//! autotidy - sort files into category folders by extension
//!
//! A directory is organized by moving each direct child file into a
//! subdirectory named after its category: a built-in table for common
//! extensions, and a category derived from the extension itself for anything
//! else. Moves never overwrite; colliding names get a numeric suffix. Runs can
//! be started by hand or by a scheduler with interval and daily triggers.

pub mod cli;
pub mod config;
pub mod conflict;
pub mod error;
pub mod file_category;
pub mod file_mover;
pub mod file_organizer;
pub mod logging;
pub mod output;
pub mod scheduler;

pub use config::{CompiledFilters, Config, ConfigError, FilterRules, ScheduleConfig};
pub use conflict::ConflictResolver;
pub use error::{OrganizeError, OrganizeResult, ScheduleError};
pub use file_category::{CategoryRegistry, Classification, NO_EXTENSION_CATEGORY};
pub use file_mover::{FileMover, MoveOutcome, MoveStatus};
pub use file_organizer::{FileEntry, OrganizeOptions, OrganizerEngine, RunSummary};
pub use scheduler::{
    ScheduleTrigger, Scheduler, SchedulerState, SchedulerStats, StopHandle, TriggerKind,
};

pub use cli::{Cli, run_cli};
