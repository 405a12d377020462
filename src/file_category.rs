//! File categorization by extension.
//!
//! This module owns the mapping from file extensions to category names. The
//! mapping starts from a fixed built-in table and grows on the fly: the first
//! time an unknown extension is seen, a new category named after it is
//! registered and reused from then on.
//!
//! # Examples
//!
//! ```
//! use autotidy::file_category::CategoryRegistry;
//!
//! let registry = CategoryRegistry::new();
//! assert_eq!(registry.category_for(".png"), "Imagenes");
//! assert_eq!(registry.category_for(".PDF"), "Documentos");
//! assert_eq!(registry.category_for(""), "Sin_Extension");
//! assert_eq!(registry.category_for(".xyz"), "XYZ");
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Category used for files without an extension.
pub const NO_EXTENSION_CATEGORY: &str = "Sin_Extension";

/// The built-in categories and the extensions they claim.
const BUILTIN_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "Imagenes",
        &[".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff", ".svg", ".webp"],
    ),
    (
        "Documentos",
        &[
            ".pdf", ".doc", ".docx", ".txt", ".rtf", ".odt", ".xls", ".xlsx", ".ppt", ".pptx",
        ],
    ),
    (
        "Videos",
        &[".mp4", ".avi", ".mov", ".wmv", ".flv", ".mkv", ".webm", ".m4v"],
    ),
    (
        "Audio",
        &[".mp3", ".wav", ".flac", ".aac", ".ogg", ".wma", ".m4a"],
    ),
    (
        "Comprimidos",
        &[".zip", ".rar", ".7z", ".tar", ".gz", ".bz2"],
    ),
    (
        "Programas",
        &[".exe", ".msi", ".dmg", ".pkg", ".deb", ".rpm"],
    ),
];

/// The result of classifying one extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Name of the category (and of its subdirectory).
    pub category: String,
    /// True if this call registered the category.
    pub newly_created: bool,
}

#[derive(Debug, Default)]
struct Mappings {
    builtin: HashMap<String, &'static str>,
    dynamic: HashMap<String, String>,
    /// Dynamic categories in registration order.
    created: Vec<String>,
}

/// Maps file extensions to category names.
///
/// The registry is the single owner of the extension table. It is meant to be
/// shared (for instance behind an `Arc`) between a manual run and the
/// scheduler; every lookup and registration goes through one lock, so two
/// callers can never create different categories for the same extension.
#[derive(Debug)]
pub struct CategoryRegistry {
    mappings: Mutex<Mappings>,
}

impl CategoryRegistry {
    /// Creates a registry holding only the built-in table.
    pub fn new() -> Self {
        let mut mappings = Mappings::default();
        for (category, extensions) in BUILTIN_CATEGORIES {
            for ext in *extensions {
                mappings.builtin.insert((*ext).to_string(), *category);
            }
        }
        Self {
            mappings: Mutex::new(mappings),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Mappings> {
        // The table is never left half-written, so a poisoned lock is still usable.
        self.mappings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the category for an extension, registering a new one if needed.
    ///
    /// The extension includes its leading dot (`".jpg"`) and is compared
    /// case-insensitively. An empty string means the file has no extension.
    pub fn category_for(&self, extension: &str) -> String {
        self.classify(extension).category
    }

    /// Classifies an extension and reports whether a category was created.
    ///
    /// The lookup and the registration happen under the same lock.
    pub fn classify(&self, extension: &str) -> Classification {
        let ext = normalize(extension);
        if ext.is_empty() {
            return Classification {
                category: NO_EXTENSION_CATEGORY.to_string(),
                newly_created: false,
            };
        }

        let mut mappings = self.lock();
        if let Some(category) = mappings.builtin.get(&ext) {
            return Classification {
                category: (*category).to_string(),
                newly_created: false,
            };
        }
        if let Some(category) = mappings.dynamic.get(&ext) {
            return Classification {
                category: category.clone(),
                newly_created: false,
            };
        }

        let category = derived_name(&ext);
        // Distinct extensions can upper-case to the same name (".ß" and ".ss").
        let newly_created = !mappings.created.contains(&category);
        if newly_created {
            mappings.created.push(category.clone());
        }
        mappings.dynamic.insert(ext.clone(), category.clone());
        drop(mappings);

        if newly_created {
            tracing::info!(
                category = %category,
                extension = %ext,
                "Created new category for unclassified extension"
            );
        }

        Classification {
            category,
            newly_created,
        }
    }

    /// Looks up an extension without registering anything.
    ///
    /// Returns `None` for extensions that would create a new category.
    pub fn lookup(&self, extension: &str) -> Option<String> {
        let ext = normalize(extension);
        if ext.is_empty() {
            return Some(NO_EXTENSION_CATEGORY.to_string());
        }
        let mappings = self.lock();
        mappings
            .builtin
            .get(&ext)
            .map(|category| (*category).to_string())
            .or_else(|| mappings.dynamic.get(&ext).cloned())
    }

    /// Returns the names of the built-in categories, in table order.
    pub fn builtin_categories() -> Vec<&'static str> {
        BUILTIN_CATEGORIES.iter().map(|(name, _)| *name).collect()
    }

    /// Returns the categories created dynamically so far, in creation order.
    pub fn dynamic_categories(&self) -> Vec<String> {
        self.lock().created.clone()
    }
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives the category name for an unmapped extension: `".xyz"` becomes `"XYZ"`.
pub fn derived_name(extension: &str) -> String {
    extension.trim_start_matches('.').to_uppercase()
}

/// Lower-cases an extension and makes sure it carries a single leading dot.
///
/// A bare dot (from a name like `notes.`) normalizes to the empty extension.
fn normalize(extension: &str) -> String {
    let ext = extension.trim().trim_start_matches('.').to_lowercase();
    if ext.is_empty() {
        ext
    } else {
        format!(".{}", ext)
    }
}

/// Returns the lower-cased extension of a file name, including the dot.
///
/// Names without a dot, dot-files such as `.bashrc` and names ending in a
/// dot such as `notes.` have no extension.
pub fn extension_of(file_name: &str) -> String {
    std::path::Path::new(file_name)
        .extension()
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}
