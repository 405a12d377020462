//! Single-file relocation.
//!
//! This module moves one file at a time and turns every failure into a
//! [`MoveOutcome`] instead of an error, so one bad file never aborts a run.

use crate::error::{OrganizeError, OrganizeResult};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

/// What happened to a file during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveStatus {
    /// The file now lives at the destination.
    Moved,
    /// The file was left in place (dry run).
    Skipped,
    /// The move failed; the file is still at its source.
    Failed,
}

/// The result of processing one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveOutcome {
    /// Where the file was.
    pub source: PathBuf,
    /// The final destination, after conflict resolution.
    pub destination: PathBuf,
    /// Outcome of the attempt.
    pub status: MoveStatus,
    /// Why the move failed or was skipped.
    pub reason: Option<String>,
}

impl MoveOutcome {
    pub fn moved(source: &Path, destination: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            status: MoveStatus::Moved,
            reason: None,
        }
    }

    pub fn skipped(source: &Path, destination: &Path, reason: impl Into<String>) -> Self {
        Self {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            status: MoveStatus::Skipped,
            reason: Some(reason.into()),
        }
    }

    pub fn failed(source: &Path, destination: &Path, reason: impl Into<String>) -> Self {
        Self {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            status: MoveStatus::Failed,
            reason: Some(reason.into()),
        }
    }

    pub fn is_moved(&self) -> bool {
        self.status == MoveStatus::Moved
    }

    pub fn is_failed(&self) -> bool {
        self.status == MoveStatus::Failed
    }
}

/// Moves files, falling back to copy-and-delete across devices.
pub struct FileMover;

impl FileMover {
    /// Moves `source` to `destination` and reports the outcome.
    ///
    /// The destination must already be collision-free (see
    /// [`ConflictResolver`](crate::conflict::ConflictResolver)); an existing
    /// destination is reported as a failure rather than overwritten.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use autotidy::file_mover::FileMover;
    /// use std::path::Path;
    ///
    /// let outcome = FileMover::move_file(
    ///     Path::new("/downloads/photo.jpg"),
    ///     Path::new("/downloads/Imagenes/photo.jpg"),
    /// );
    /// if outcome.is_failed() {
    ///     eprintln!("{}", outcome.reason.unwrap_or_default());
    /// }
    /// ```
    pub fn move_file(source: &Path, destination: &Path) -> MoveOutcome {
        match Self::try_move(source, destination) {
            Ok(()) => {
                tracing::info!(
                    source = %source.display(),
                    destination = %destination.display(),
                    "Moved file"
                );
                MoveOutcome::moved(source, destination)
            }
            Err(e) => {
                tracing::warn!(
                    source = %source.display(),
                    destination = %destination.display(),
                    reason = %e,
                    "Failed to move file"
                );
                MoveOutcome::failed(source, destination, e.to_string())
            }
        }
    }

    fn try_move(source: &Path, destination: &Path) -> OrganizeResult<()> {
        let move_error = |e: std::io::Error| OrganizeError::Move {
            source_path: source.to_path_buf(),
            destination: destination.to_path_buf(),
            source: e,
        };

        // The source may have vanished since the directory was listed.
        fs::symlink_metadata(source).map_err(move_error)?;

        if fs::symlink_metadata(destination).is_ok() {
            return Err(move_error(std::io::Error::new(
                ErrorKind::AlreadyExists,
                "destination already exists",
            )));
        }

        match fs::rename(source, destination) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::CrossesDevices => {
                tracing::debug!(
                    source = %source.display(),
                    destination = %destination.display(),
                    "Rename crosses devices, falling back to copy"
                );
                Self::copy_then_remove(source, destination)
            }
            Err(e) => Err(move_error(e)),
        }
    }

    /// Copies `source` to `destination`, then removes `source`.
    ///
    /// The destination is created exclusively, so a file that appeared there
    /// after the existence check is never overwritten. A failed copy removes
    /// the partial destination and leaves the source untouched.
    fn copy_then_remove(source: &Path, destination: &Path) -> OrganizeResult<()> {
        let copy_error = |e: io::Error| OrganizeError::CopyFallback {
            source_path: source.to_path_buf(),
            destination: destination.to_path_buf(),
            source: e,
        };

        let mut target = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(destination)
            .map_err(copy_error)?;

        let copied = File::open(source)
            .and_then(|mut input| io::copy(&mut input, &mut target))
            .and_then(|_| target.sync_all())
            .and_then(|_| fs::metadata(source))
            .and_then(|metadata| fs::set_permissions(destination, metadata.permissions()));
        drop(target);

        if let Err(e) = copied {
            let _ = fs::remove_file(destination);
            return Err(copy_error(e));
        }

        fs::remove_file(source).map_err(|e| OrganizeError::SourceCleanup {
            source_path: source.to_path_buf(),
            destination: destination.to_path_buf(),
            source: e,
        })
    }
}
