//! Collision-free destination paths.

use std::path::{Path, PathBuf};

/// Turns a proposed destination into a path that is not taken yet.
///
/// A free destination is returned unchanged. Otherwise `{stem}_1{ext}`,
/// `{stem}_2{ext}`, ... are probed in order and the first free candidate
/// wins. The counter is unbounded.
///
/// Resolution only sees the filesystem as it is at call time, so callers must
/// perform each move before resolving the next destination.
pub struct ConflictResolver;

impl ConflictResolver {
    /// Resolves `destination` against the filesystem.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use autotidy::conflict::ConflictResolver;
    /// use std::path::Path;
    ///
    /// // With "Imagenes/foto.png" already present:
    /// let unique = ConflictResolver::resolve(Path::new("Imagenes/foto.png"));
    /// assert_eq!(unique, Path::new("Imagenes/foto_1.png"));
    /// ```
    pub fn resolve(destination: &Path) -> PathBuf {
        Self::resolve_with(destination, |candidate| candidate.exists())
    }

    /// Resolves `destination` with a custom "is this path taken" check.
    ///
    /// Dry runs use this to treat destinations planned earlier in the same
    /// pass as taken, even though nothing was moved.
    pub fn resolve_with<F>(destination: &Path, is_taken: F) -> PathBuf
    where
        F: Fn(&Path) -> bool,
    {
        if !is_taken(destination) {
            return destination.to_path_buf();
        }

        let stem = destination
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = destination
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let parent = destination.parent().unwrap_or_else(|| Path::new(""));

        let mut counter: u64 = 1;
        loop {
            let candidate = parent.join(format!("{}_{}{}", stem, counter, extension));
            if !is_taken(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_free_destination_unchanged() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dest = temp_dir.path().join("foto.png");
        assert_eq!(ConflictResolver::resolve(&dest), dest);
    }

    #[test]
    fn test_existing_destination_gets_suffix() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dest = temp_dir.path().join("foto.png");
        fs::write(&dest, "existing").expect("Failed to write file");

        assert_eq!(
            ConflictResolver::resolve(&dest),
            temp_dir.path().join("foto_1.png")
        );
    }

    #[test]
    fn test_first_free_suffix_is_chosen() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        fs::write(base.join("report.pdf"), "0").expect("Failed to write file");
        fs::write(base.join("report_1.pdf"), "1").expect("Failed to write file");
        fs::write(base.join("report_3.pdf"), "3").expect("Failed to write file");

        assert_eq!(
            ConflictResolver::resolve(&base.join("report.pdf")),
            base.join("report_2.pdf")
        );
    }

    #[test]
    fn test_name_without_extension() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dest = temp_dir.path().join("README");
        fs::write(&dest, "existing").expect("Failed to write file");

        assert_eq!(
            ConflictResolver::resolve(&dest),
            temp_dir.path().join("README_1")
        );
    }

    #[test]
    fn test_only_last_extension_is_kept_apart() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dest = temp_dir.path().join("backup.tar.gz");
        fs::write(&dest, "existing").expect("Failed to write file");

        assert_eq!(
            ConflictResolver::resolve(&dest),
            temp_dir.path().join("backup.tar_1.gz")
        );
    }

    #[test]
    fn test_resolve_with_claimed_set() {
        let claimed: HashSet<PathBuf> = [
            PathBuf::from("out/a.txt"),
            PathBuf::from("out/a_1.txt"),
        ]
        .into_iter()
        .collect();

        let resolved =
            ConflictResolver::resolve_with(Path::new("out/a.txt"), |p| claimed.contains(p));
        assert_eq!(resolved, PathBuf::from("out/a_2.txt"));
    }
}
