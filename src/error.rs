//! Error types shared by the organizer and the scheduler.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while organizing a directory.
///
/// Only [`OrganizeError::InvalidDirectory`] is fatal for a run. The other
/// variants describe a single file and end up as the reason of a failed
/// [`MoveOutcome`](crate::file_mover::MoveOutcome).
#[derive(Error, Debug)]
pub enum OrganizeError {
    /// The target directory does not exist or is not a directory.
    #[error("Invalid directory {path}: {reason}")]
    InvalidDirectory { path: PathBuf, reason: String },

    /// Failed to create a category directory.
    #[error("Failed to create directory {path}: {source}")]
    DirectoryCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to read the entries of the target directory.
    #[error("Failed to read directory {path}: {source}")]
    ReadDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to move a file to its category directory.
    #[error("Failed to move {source_path} to {destination}: {source}")]
    Move {
        source_path: PathBuf,
        destination: PathBuf,
        source: std::io::Error,
    },

    /// The copy step of a cross-device move failed. The source is untouched.
    #[error("Failed to copy {source_path} to {destination} across devices: {source}")]
    CopyFallback {
        source_path: PathBuf,
        destination: PathBuf,
        source: std::io::Error,
    },

    /// The copy succeeded but the source could not be removed afterwards.
    #[error("Copied {source_path} to {destination} but could not remove the source: {source}")]
    SourceCleanup {
        source_path: PathBuf,
        destination: PathBuf,
        source: std::io::Error,
    },
}

/// Errors raised while building schedule triggers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Interval must be greater than zero")]
    ZeroInterval,

    #[error("Interval of {0:?} is too large to schedule")]
    IntervalOutOfRange(std::time::Duration),

    #[error("Invalid time of day '{0}': expected HH:MM")]
    InvalidTime(String),
}

/// Result type for file organization operations.
pub type OrganizeResult<T> = Result<T, OrganizeError>;
