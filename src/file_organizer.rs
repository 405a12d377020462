//! Directory organization runs.
//!
//! This module performs one pass over a directory: it lists the files directly
//! inside it, classifies each one by extension, moves it into its category
//! subdirectory under a collision-free name, and records what happened in a
//! [`RunSummary`].

use crate::config::CompiledFilters;
use crate::conflict::ConflictResolver;
use crate::error::{OrganizeError, OrganizeResult};
use crate::file_category::{CategoryRegistry, derived_name, extension_of};
use crate::file_mover::{FileMover, MoveOutcome, MoveStatus};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// A file that is a candidate for organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Full path to the file.
    pub path: PathBuf,
    /// The file name.
    pub name: String,
    /// Lower-cased extension with its leading dot, or empty.
    pub extension: String,
}

impl FileEntry {
    /// Builds an entry from a path. Returns `None` if the path has no file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_string();
        let extension = extension_of(&name);
        Some(Self {
            path: path.to_path_buf(),
            name,
            extension,
        })
    }
}

/// Aggregated results of one organization run.
///
/// A summary is built fresh for every run and never modified once the run
/// returns.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// The organized directory.
    pub directory: PathBuf,
    /// When the run started.
    pub started_at: DateTime<Local>,
    /// When the run finished.
    pub finished_at: DateTime<Local>,
    /// True if no file was actually moved.
    pub dry_run: bool,
    /// Number of candidate files seen.
    pub total_seen: usize,
    /// Number of files moved.
    pub moved: usize,
    /// Number of files that could not be moved.
    pub failed: usize,
    /// Number of files left in place (dry run).
    pub skipped: usize,
    /// Files moved (or planned, for a dry run) per category.
    pub per_category: BTreeMap<String, usize>,
    /// Categories created during this run, in creation order.
    pub new_categories: Vec<String>,
    /// One outcome per file, in processing order.
    pub outcomes: Vec<MoveOutcome>,
    /// Set when the run could not start at all.
    pub fatal_error: Option<String>,
}

impl RunSummary {
    pub(crate) fn new(directory: &Path, dry_run: bool) -> Self {
        let now = Local::now();
        Self {
            directory: directory.to_path_buf(),
            started_at: now,
            finished_at: now,
            dry_run,
            total_seen: 0,
            moved: 0,
            failed: 0,
            skipped: 0,
            per_category: BTreeMap::new(),
            new_categories: Vec::new(),
            outcomes: Vec::new(),
            fatal_error: None,
        }
    }

    fn record(&mut self, category: &str, outcome: MoveOutcome) {
        match outcome.status {
            MoveStatus::Moved => {
                self.moved += 1;
                *self.per_category.entry(category.to_string()).or_insert(0) += 1;
            }
            MoveStatus::Skipped => {
                self.skipped += 1;
                *self.per_category.entry(category.to_string()).or_insert(0) += 1;
            }
            MoveStatus::Failed => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    fn note_new_category(&mut self, category: &str) {
        if !self.new_categories.iter().any(|c| c == category) {
            self.new_categories.push(category.to_string());
        }
    }

    /// Returns true if the run could not start.
    pub fn is_fatal(&self) -> bool {
        self.fatal_error.is_some()
    }

    /// Returns true if the run started and every file was handled.
    pub fn is_success(&self) -> bool {
        !self.is_fatal() && self.failed == 0
    }
}

/// Options for a single run.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrganizeOptions {
    /// Plan the run without touching the filesystem.
    pub dry_run: bool,
}

/// Runs organization passes over directories.
///
/// The engine is shared between manual runs and the scheduler. Only one run
/// per directory executes at a time; a second run on the same directory
/// blocks until the first one returns.
pub struct OrganizerEngine {
    registry: Arc<CategoryRegistry>,
    filters: CompiledFilters,
    active: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

/// Holds a directory for the duration of a run.
struct DirectoryGuard<'a> {
    engine: &'a OrganizerEngine,
    key: PathBuf,
}

impl Drop for DirectoryGuard<'_> {
    fn drop(&mut self) {
        self.engine.active_dirs().remove(&self.key);
        self.engine.released.notify_all();
    }
}

impl OrganizerEngine {
    /// Creates an engine classifying through `registry` and skipping whatever
    /// `filters` rejects.
    pub fn new(registry: Arc<CategoryRegistry>, filters: CompiledFilters) -> Self {
        Self {
            registry,
            filters,
            active: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }

    /// The category registry used by this engine.
    pub fn registry(&self) -> &Arc<CategoryRegistry> {
        &self.registry
    }

    fn active_dirs(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Blocks until no other run holds `directory`, then claims it.
    fn lock_directory(&self, directory: &Path) -> DirectoryGuard<'_> {
        let key = fs::canonicalize(directory).unwrap_or_else(|_| directory.to_path_buf());
        let mut active = self.active_dirs();
        if active.contains(&key) {
            tracing::info!(
                directory = %directory.display(),
                "Another run is in progress for this directory, waiting"
            );
        }
        while active.contains(&key) {
            active = self
                .released
                .wait(active)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        active.insert(key.clone());
        DirectoryGuard { engine: self, key }
    }

    /// Organizes the files directly inside `directory`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use autotidy::config::CompiledFilters;
    /// use autotidy::file_category::CategoryRegistry;
    /// use autotidy::file_organizer::OrganizerEngine;
    /// use std::path::Path;
    /// use std::sync::Arc;
    ///
    /// let engine = OrganizerEngine::new(Arc::new(CategoryRegistry::new()), CompiledFilters::default());
    /// let summary = engine.organize(Path::new("/home/user/Downloads"));
    /// println!("moved {} files, {} failed", summary.moved, summary.failed);
    /// ```
    pub fn organize(&self, directory: &Path) -> RunSummary {
        self.organize_with(directory, OrganizeOptions::default(), |_| {})
    }

    /// Organizes `directory`, calling `on_outcome` after each file.
    pub fn organize_with<F>(
        &self,
        directory: &Path,
        options: OrganizeOptions,
        mut on_outcome: F,
    ) -> RunSummary
    where
        F: FnMut(&MoveOutcome),
    {
        let mut summary = RunSummary::new(directory, options.dry_run);

        if let Err(e) = validate_directory(directory) {
            tracing::error!(directory = %directory.display(), error = %e, "Cannot organize directory");
            summary.fatal_error = Some(e.to_string());
            summary.finished_at = Local::now();
            return summary;
        }

        let _guard = self.lock_directory(directory);

        let entries = match self.list_entries(directory) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(directory = %directory.display(), error = %e, "Cannot organize directory");
                summary.fatal_error = Some(e.to_string());
                summary.finished_at = Local::now();
                return summary;
            }
        };

        if entries.is_empty() {
            tracing::info!(directory = %directory.display(), "No files found to organize");
        } else {
            tracing::info!(
                directory = %directory.display(),
                files = entries.len(),
                dry_run = options.dry_run,
                "Starting organization"
            );
        }

        let mut planned: HashSet<PathBuf> = HashSet::new();
        for entry in &entries {
            summary.total_seen += 1;
            let (category, outcome) = if options.dry_run {
                self.plan_entry(directory, entry, &mut planned, &mut summary)
            } else {
                self.process_entry(directory, entry, &mut summary)
            };
            on_outcome(&outcome);
            summary.record(&category, outcome);
        }

        summary.finished_at = Local::now();
        tracing::info!(
            directory = %directory.display(),
            moved = summary.moved,
            failed = summary.failed,
            skipped = summary.skipped,
            new_categories = ?summary.new_categories,
            "Organization completed"
        );
        summary
    }

    /// Lists the files that a run on `directory` would process, sorted by name.
    ///
    /// Subdirectories are never entered and excluded names are left out.
    pub fn list_entries(&self, directory: &Path) -> OrganizeResult<Vec<FileEntry>> {
        let read_error = |e| OrganizeError::ReadDirectory {
            path: directory.to_path_buf(),
            source: e,
        };

        let mut entries: Vec<FileEntry> = fs::read_dir(directory)
            .map_err(read_error)?
            .flatten()
            .map(|entry| entry.path())
            // Follows symlinks; directories and dangling links are skipped.
            .filter(|path| fs::metadata(path).map(|m| m.is_file()).unwrap_or(false))
            .filter(|path| self.filters.should_include(path))
            .filter_map(|path| FileEntry::from_path(&path))
            .collect();

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Classifies and moves one file.
    fn process_entry(
        &self,
        directory: &Path,
        entry: &FileEntry,
        summary: &mut RunSummary,
    ) -> (String, MoveOutcome) {
        let classification = self.registry.classify(&entry.extension);
        let category = classification.category;
        if classification.newly_created {
            summary.note_new_category(&category);
        }

        let category_dir = directory.join(&category);
        let naive_destination = category_dir.join(&entry.name);

        if let Err(e) = ensure_category_dir(&category_dir) {
            tracing::warn!(
                source = %entry.path.display(),
                destination = %naive_destination.display(),
                reason = %e,
                "Failed to prepare category directory"
            );
            let outcome = MoveOutcome::failed(&entry.path, &naive_destination, e.to_string());
            return (category, outcome);
        }

        let destination = ConflictResolver::resolve(&naive_destination);
        if destination != naive_destination {
            tracing::info!(
                file = %entry.name,
                renamed_to = %destination.display(),
                "Renamed to avoid a name conflict"
            );
        }

        (category, FileMover::move_file(&entry.path, &destination))
    }

    /// Works out where a file would go, without touching the filesystem.
    fn plan_entry(
        &self,
        directory: &Path,
        entry: &FileEntry,
        planned: &mut HashSet<PathBuf>,
        summary: &mut RunSummary,
    ) -> (String, MoveOutcome) {
        let category = match self.registry.lookup(&entry.extension) {
            Some(category) => category,
            None => {
                let category = derived_name(&entry.extension);
                summary.note_new_category(&category);
                category
            }
        };

        let naive_destination = directory.join(&category).join(&entry.name);
        let destination = ConflictResolver::resolve_with(&naive_destination, |candidate| {
            planned.contains(candidate) || candidate.exists()
        });
        planned.insert(destination.clone());

        tracing::debug!(
            source = %entry.path.display(),
            destination = %destination.display(),
            "Would move file"
        );
        (
            category,
            MoveOutcome::skipped(&entry.path, &destination, "dry run"),
        )
    }
}

fn validate_directory(directory: &Path) -> OrganizeResult<()> {
    match fs::metadata(directory) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(OrganizeError::InvalidDirectory {
            path: directory.to_path_buf(),
            reason: "not a directory".to_string(),
        }),
        Err(e) => Err(OrganizeError::InvalidDirectory {
            path: directory.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

fn ensure_category_dir(category_dir: &Path) -> OrganizeResult<()> {
    if category_dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(category_dir).map_err(|e| OrganizeError::DirectoryCreation {
        path: category_dir.to_path_buf(),
        source: e,
    })?;
    tracing::info!(directory = %category_dir.display(), "Created category directory");
    Ok(())
}
