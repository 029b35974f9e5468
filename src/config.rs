//! Configuration for the analyzer.
//!
//! Layered configuration:
//! - Built-in defaults
//! - JSON configuration file (first hit in the search order wins)
//! - Environment variable overrides
//!
//! # Search order
//!
//! `./vhdl_lint.json`, `./.vhdl_lint.json`, `<root>/vhdl_lint.json`,
//! `<root>/.vhdl_lint.json`, `<user_config>/vhdl_lint/config.json`.
//!
//! # Environment Variables
//!
//! Variables are prefixed with `VHDL_LINT_` and use double underscores to
//! separate nested levels:
//! - `VHDL_LINT_ANALYSIS__MAXPARALLELFILES=4` sets `analysis.maxParallelFiles`
//! - `VHDL_LINT_STANDARD=2019` sets `standard`
//!
//! A missing file means defaults; an unreadable or invalid file is a
//! warning, never a fatal error.

use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// VHDL standard revision, surfaced to the policy input unchanged
    pub standard: Standard,

    /// Explicit file entries with per-file overrides
    pub files: Vec<FileEntry>,

    /// Library name -> glob patterns
    pub libraries: IndexMap<String, LibraryConfig>,

    /// Lint-layer settings (rule severities, ignores)
    pub lint: LintConfig,

    /// Analysis-core settings
    pub analysis: AnalysisConfig,
}

/// Supported VHDL standard revisions.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum Standard {
    #[serde(rename = "1993")]
    V1993,
    #[serde(rename = "2002")]
    V2002,
    #[default]
    #[serde(rename = "2008")]
    V2008,
    #[serde(rename = "2019")]
    V2019,
}

impl Standard {
    pub fn as_str(&self) -> &'static str {
        match self {
            Standard::V1993 => "1993",
            Standard::V2002 => "2002",
            Standard::V2008 => "2008",
            Standard::V2019 => "2019",
        }
    }
}

/// An explicit file entry. Takes precedence over glob matches.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FileEntry {
    pub file: String,

    /// Library the file belongs to; defaults to `work`
    pub library: Option<String>,

    /// Source language; anything other than `vhdl` (case-insensitive)
    /// skips the file
    pub language: Option<String>,

    #[serde(alias = "isthirdparty")]
    pub is_third_party: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LibraryConfig {
    /// Glob patterns (`**` means any depth of directories)
    pub files: Vec<String>,

    /// Exclusion patterns, applied to glob matches only
    pub exclude: Vec<String>,

    #[serde(alias = "isthirdparty")]
    pub is_third_party: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LintConfig {
    /// Per-rule severity overrides
    pub rules: IndexMap<String, Severity>,

    /// Files matching any pattern are skipped entirely
    #[serde(alias = "ignorepatterns")]
    pub ignore_patterns: Vec<String>,

    /// Honor `-- vhdl_lint off` / `-- vhdl_lint on` regions (policy layer)
    #[serde(alias = "ignoreregions")]
    pub ignore_regions: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Off,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Off => "off",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisConfig {
    /// Worker pool size for fact extraction; `0` = number of CPUs
    #[serde(alias = "maxparallelfiles")]
    pub max_parallel_files: usize,

    /// Resolve `use` clauses across libraries (informational)
    #[serde(alias = "followlibraryuse")]
    pub follow_library_use: bool,

    /// Compute component -> entity default binding
    #[serde(alias = "resolvedefaultbinding")]
    pub resolve_default_binding: bool,

    pub cache: CacheConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_parallel_files: 0,
            follow_library_use: true,
            resolve_default_binding: false,
            cache: CacheConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Cache directory, relative to the project root
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(".vhdl_lint_cache"),
        }
    }
}

impl Config {
    /// Find the first configuration file in the documented search order.
    pub fn discover(root: &Path) -> Option<PathBuf> {
        let mut candidates = vec![
            PathBuf::from("vhdl_lint.json"),
            PathBuf::from(".vhdl_lint.json"),
            root.join("vhdl_lint.json"),
            root.join(".vhdl_lint.json"),
        ];
        if let Some(user) = dirs::config_dir() {
            candidates.push(user.join("vhdl_lint").join("config.json"));
        }
        candidates.into_iter().find(|p| p.is_file())
    }

    /// Load configuration for a project root, layering defaults, the
    /// discovered JSON file, and `VHDL_LINT_` environment overrides.
    pub fn load(root: &Path) -> Result<Self, figment::Error> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(path) = Self::discover(root) {
            figment = figment.merge(Json::file(path));
        }
        figment
            .merge(Env::prefixed("VHDL_LINT_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".") // double underscore becomes nesting dot
                    .into()
            }))
            .extract()
    }

    /// Load configuration, falling back to defaults with a warning on any
    /// failure. Configuration errors are never fatal.
    pub fn load_or_default(root: &Path) -> Self {
        match Self::load(root) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(target: "config", "invalid configuration, using defaults: {e}");
                Config::default()
            }
        }
    }

    /// Load configuration from a specific file (tests and `--config`).
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Json::file(path))
            .extract()
    }

    /// Worker pool size: `min(maxParallelFiles, numCPU)`, `0` = auto.
    pub fn effective_parallelism(&self) -> usize {
        let cpus = num_cpus::get().max(1);
        match self.analysis.max_parallel_files {
            0 => cpus,
            n => n.min(cpus),
        }
    }

    /// Write a default configuration file.
    pub fn init_config_file(root: &Path, force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let path = root.join("vhdl_lint.json");
        if !force && path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }
        let json = serde_json::to_string_pretty(&Config::default())?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}
