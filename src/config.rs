//! Configuration: exclusion filters, schedule and logging.
//!
//! Configuration is optional. When present it is stored in TOML format:
//!
//! ```toml
//! [filters]
//! enable_hidden_files = true
//!
//! [filters.exclude]
//! filenames = ["notes.txt"]
//! patterns = ["*.part"]
//! extensions = ["tmp", "crdownload"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//!
//! [schedule]
//! interval_hours = 24
//! daily_at = ["02:00"]
//! tick_seconds = 60
//! backoff_seconds = 300
//!
//! [logging]
//! file = "autotidy.log"
//! json = false
//! ```
//!
//! The tool's own artifacts and common OS clutter are always excluded, no
//! matter what the configuration says.

use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Name of the per-directory configuration file.
pub const LOCAL_CONFIG_FILE: &str = ".autotidy.toml";

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "autotidy.log";

/// File names that are never organized.
pub const BUILTIN_EXCLUDED_FILES: &[&str] = &[
    "autotidy",
    "autotidy.exe",
    LOCAL_CONFIG_FILE,
    DEFAULT_LOG_FILE,
    "Thumbs.db",
    ".DS_Store",
    "desktop.ini",
];

/// Errors that can occur during configuration loading and filtering.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    /// Invalid glob pattern provided.
    #[error("Invalid glob pattern '{0}': expected *.ext or dir/**")]
    InvalidGlobPattern(String),
    /// Invalid regex pattern provided with the actual error reason.
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern {
        /// The regex pattern that failed to compile.
        pattern: String,
        /// The reason why the pattern is invalid.
        reason: String,
    },
    /// IO error while reading configuration.
    #[error("IO error reading configuration: {0}")]
    IoError(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub filters: FilterRules,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Root-level filter rules configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether to organize hidden files (starting with "."). Defaults to true.
    #[serde(default = "default_enable_hidden_files")]
    pub enable_hidden_files: bool,

    /// Rules for excluding files.
    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Rules for including files (whitelist, overrides configured exclude rules).
    #[serde(default)]
    pub include: IncludeRules,
}

fn default_enable_hidden_files() -> bool {
    true
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            enable_hidden_files: default_enable_hidden_files(),
            exclude: ExcludeRules::default(),
            include: IncludeRules::default(),
        }
    }
}

/// Rules for excluding files from organization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact filenames to exclude, on top of the built-in list.
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns to exclude (e.g., "*.tmp").
    #[serde(default)]
    pub patterns: Vec<String>,

    /// File extensions to exclude, without the dot (e.g., "part", "tmp").
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regex patterns matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

/// Rules for including files, overriding configured exclude rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncludeRules {
    /// Glob patterns that override exclude rules.
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Hours between interval runs. Zero disables the interval trigger.
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,

    /// Wall-clock times (HH:MM) of the daily runs.
    #[serde(default = "default_daily_at")]
    pub daily_at: Vec<String>,

    /// Seconds between two checks of the trigger list.
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,

    /// Seconds to wait after a run that crashed.
    #[serde(default = "default_backoff_seconds")]
    pub backoff_seconds: u64,
}

fn default_interval_hours() -> u64 {
    24
}

fn default_daily_at() -> Vec<String> {
    vec!["02:00".to_string()]
}

fn default_tick_seconds() -> u64 {
    60
}

fn default_backoff_seconds() -> u64 {
    300
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_interval_hours(),
            daily_at: default_daily_at(),
            tick_seconds: default_tick_seconds(),
            backoff_seconds: default_backoff_seconds(),
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_hours > 0)
            .then(|| Duration::from_secs(self.interval_hours.saturating_mul(3600)))
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_seconds.max(1))
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_seconds)
    }
}

/// Log sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log file path. Relative paths are resolved from the working directory.
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,

    /// Write the log file as JSON lines.
    #[serde(default)]
    pub json: bool,
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from(DEFAULT_LOG_FILE))
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.autotidy.toml` in the current directory
    /// 3. Look for `~/.config/autotidy/config.toml` in home directory
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is explicitly provided but cannot be read,
    /// or if any configuration file found is invalid.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("autotidy")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// Compile the filter rules into matchers.
    ///
    /// The log file's own name is added to the exclusion list.
    pub fn compile_filters(&self) -> Result<CompiledFilters, ConfigError> {
        let mut rules = self.filters.clone();
        if let Some(name) = self
            .logging
            .file
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().to_string())
        {
            rules.exclude.filenames.push(name);
        }
        CompiledFilters::new(rules)
    }
}

/// Compiled filter structures for file matching.
#[derive(Debug, Clone)]
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

impl CompiledFilters {
    /// Create compiled filters from filter rules.
    ///
    /// # Errors
    ///
    /// Returns an error if any glob or regex patterns are invalid.
    pub fn new(rules: FilterRules) -> Result<Self, ConfigError> {
        let compile_globs = |patterns: &[String]| {
            patterns
                .iter()
                .map(|pattern| {
                    Pattern::new(pattern)
                        .map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
                })
                .collect::<Result<Vec<_>, _>>()
        };

        let exclude_patterns = compile_globs(&rules.exclude.patterns)?;
        let include_patterns = compile_globs(&rules.include.patterns)?;

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            exclude_filenames: rules.exclude.filenames.into_iter().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_patterns,
            exclude_regexes,
            include_patterns,
        })
    }

    /// Check if a file should be organized.
    ///
    /// Checks are performed in this order, with early termination:
    /// 1. Built-in exclusion list - always excluded
    /// 2. Include patterns (whitelist) - if matched, include
    /// 3. Hidden file filter - if hidden and disabled, exclude
    /// 4. Exact filename, extension, glob and regex matches - exclude
    /// 5. Default: include
    pub fn should_include(&self, file_path: &Path) -> bool {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if BUILTIN_EXCLUDED_FILES.contains(&file_name.as_str()) {
            return false;
        }

        if self.include_patterns.iter().any(|p| p.matches(&file_name)) {
            return true;
        }

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(&file_name) {
            return false;
        }

        if let Some(ext) = file_path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if self.exclude_extensions.contains(&ext_lower) {
                return false;
            }
        }

        if self.exclude_patterns.iter().any(|p| p.matches(&file_name)) {
            return false;
        }

        !self
            .exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
    }
}

impl Default for CompiledFilters {
    fn default() -> Self {
        Self {
            enable_hidden_files: default_enable_hidden_files(),
            exclude_filenames: HashSet::new(),
            exclude_extensions: HashSet::new(),
            exclude_patterns: Vec::new(),
            exclude_regexes: Vec::new(),
            include_patterns: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(rules: FilterRules) -> CompiledFilters {
        CompiledFilters::new(rules).expect("Failed to compile filters")
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.filters.enable_hidden_files);
        assert_eq!(config.schedule.interval_hours, 24);
        assert_eq!(config.schedule.daily_at, vec!["02:00".to_string()]);
        assert_eq!(config.logging.file, Some(PathBuf::from(DEFAULT_LOG_FILE)));
    }

    #[test]
    fn test_builtin_exclusions_always_apply() {
        let compiled = compile(FilterRules {
            include: IncludeRules {
                patterns: vec!["*".to_string()],
            },
            ..Default::default()
        });

        assert!(!compiled.should_include(Path::new("Thumbs.db")));
        assert!(!compiled.should_include(Path::new(".DS_Store")));
        assert!(!compiled.should_include(Path::new("autotidy.log")));
        assert!(compiled.should_include(Path::new("photo.jpg")));
    }

    #[test]
    fn test_hidden_files_included_by_default() {
        let compiled = CompiledFilters::default();
        assert!(compiled.should_include(Path::new(".hidden.txt")));
    }

    #[test]
    fn test_hidden_files_excluded_when_disabled() {
        let compiled = compile(FilterRules {
            enable_hidden_files: false,
            ..Default::default()
        });
        assert!(!compiled.should_include(Path::new(".gitignore")));
        assert!(compiled.should_include(Path::new("visible.txt")));
    }

    #[test]
    fn test_exclude_extensions() {
        let compiled = compile(FilterRules {
            exclude: ExcludeRules {
                extensions: vec!["part".to_string(), ".tmp".to_string()],
                ..Default::default()
            },
            ..Default::default()
        });

        assert!(!compiled.should_include(Path::new("video.part")));
        assert!(!compiled.should_include(Path::new("file.TMP")));
        assert!(compiled.should_include(Path::new("file.txt")));
    }

    #[test]
    fn test_exclude_glob_and_regex() {
        let compiled = compile(FilterRules {
            exclude: ExcludeRules {
                patterns: vec!["*.crdownload".to_string()],
                regex: vec![r"^~\$".to_string()],
                ..Default::default()
            },
            ..Default::default()
        });

        assert!(!compiled.should_include(Path::new("/tmp/setup.crdownload")));
        assert!(!compiled.should_include(Path::new("~$report.docx")));
        assert!(compiled.should_include(Path::new("report.docx")));
    }

    #[test]
    fn test_include_overrides_configured_exclude() {
        let compiled = compile(FilterRules {
            exclude: ExcludeRules {
                extensions: vec!["log".to_string()],
                ..Default::default()
            },
            include: IncludeRules {
                patterns: vec!["keep-*.log".to_string()],
            },
            ..Default::default()
        });

        assert!(compiled.should_include(Path::new("keep-me.log")));
        assert!(!compiled.should_include(Path::new("other.log")));
    }

    #[test]
    fn test_invalid_patterns_return_error() {
        let bad_regex = CompiledFilters::new(FilterRules {
            exclude: ExcludeRules {
                regex: vec!["[invalid(".to_string()],
                ..Default::default()
            },
            ..Default::default()
        });
        assert!(matches!(
            bad_regex,
            Err(ConfigError::InvalidRegexPattern { .. })
        ));

        let bad_glob = CompiledFilters::new(FilterRules {
            exclude: ExcludeRules {
                patterns: vec!["[invalid".to_string()],
                ..Default::default()
            },
            ..Default::default()
        });
        assert!(matches!(bad_glob, Err(ConfigError::InvalidGlobPattern(_))));
    }

    #[test]
    fn test_log_file_name_is_excluded() {
        let config = Config::from_toml(
            r#"
            [logging]
            file = "/var/log/tidy-run.log"
            "#,
        )
        .expect("Failed to parse config");

        let compiled = config.compile_filters().expect("Failed to compile filters");
        assert!(!compiled.should_include(Path::new("tidy-run.log")));
    }

    #[test]
    fn test_parse_schedule_section() {
        let config = Config::from_toml(
            r#"
            [schedule]
            interval_hours = 0
            daily_at = ["02:00", "14:30"]
            tick_seconds = 5
            "#,
        )
        .expect("Failed to parse config");

        assert_eq!(config.schedule.interval(), None);
        assert_eq!(config.schedule.daily_at.len(), 2);
        assert_eq!(config.schedule.tick(), Duration::from_secs(5));
        assert_eq!(config.schedule.backoff(), Duration::from_secs(300));
        assert!(config.filters.enable_hidden_files);
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::from_toml("[schedule\ninterval_hours = ");
        assert!(matches!(result, Err(ConfigError::ConfigInvalid(_))));
    }

    #[test]
    fn test_explicit_missing_file() {
        let result = Config::load(Some(Path::new("/non/existent/autotidy.toml")));
        assert!(matches!(result, Err(ConfigError::ConfigNotFound(_))));
    }
}
