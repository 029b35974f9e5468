//! Expansion of library patterns and explicit file entries into resolved
//! libraries.
//!
//! Glob semantics: `**` means any depth of directories. A pattern with a
//! `**` is split at its first occurrence; the prefix becomes the walk root
//! and the suffix is matched against paths relative to it (basename match
//! when the suffix has no separator, full relative path otherwise, with a
//! right-anchored fallback). Invalid patterns are skipped, never fatal.

use crate::config::Config;
use crate::project::is_vhdl_file;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A library with its resolved file set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLibrary {
    /// Canonical lowercase name
    pub name: String,
    /// Absolute paths, sorted, deduplicated
    pub files: Vec<PathBuf>,
    pub is_third_party: bool,
}

/// Per-file assignment after ambiguity resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAssignment {
    pub library: String,
    pub is_third_party: bool,
    /// Came from an explicit `files[]` entry rather than a glob match
    pub explicit: bool,
}

/// Output of project resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolvedProject {
    /// Sorted by library name; a file may appear in several libraries
    pub libraries: Vec<ResolvedLibrary>,
    /// File -> owning library. Explicit entries win; otherwise the first
    /// matching library in sorted order.
    pub assignments: BTreeMap<PathBuf, FileAssignment>,
}

impl ResolvedProject {
    /// All files to analyze, sorted by path.
    pub fn files(&self) -> Vec<PathBuf> {
        self.assignments.keys().cloned().collect()
    }

    pub fn library_of(&self, file: &Path) -> &str {
        self.assignments
            .get(file)
            .map(|a| a.library.as_str())
            .unwrap_or("work")
    }

    pub fn is_third_party(&self, file: &Path) -> bool {
        self.assignments
            .get(file)
            .map(|a| a.is_third_party)
            .unwrap_or(false)
    }
}

/// Resolve the configured libraries and explicit file entries against a
/// project root.
pub fn resolve(config: &Config, root: &Path) -> ResolvedProject {
    let mut sets: BTreeMap<String, (BTreeSet<PathBuf>, bool)> = BTreeMap::new();
    let mut explicit: BTreeMap<PathBuf, FileAssignment> = BTreeMap::new();

    // Glob-driven libraries first
    for (name, lib) in &config.libraries {
        let name = name.to_ascii_lowercase();
        let mut matched: BTreeSet<PathBuf> = BTreeSet::new();
        for pattern in &lib.files {
            for path in expand_pattern(pattern, root) {
                if is_vhdl_file(&path) {
                    matched.insert(path);
                }
            }
        }
        // Exclusions apply to glob matches only, not explicit entries
        if !lib.exclude.is_empty() {
            matched.retain(|path| {
                !lib.exclude
                    .iter()
                    .any(|pattern| pattern_matches(pattern, path, root))
            });
        }
        let entry = sets.entry(name).or_insert_with(|| (BTreeSet::new(), false));
        entry.0.extend(matched);
        entry.1 |= lib.is_third_party;
    }

    // Explicit file entries; non-vhdl language skips the file
    for file in &config.files {
        if let Some(language) = &file.language {
            if !language.eq_ignore_ascii_case("vhdl") {
                continue;
            }
        }
        let path = absolutize(Path::new(&file.file), root);
        if !is_vhdl_file(&path) {
            continue;
        }
        let library = file
            .library
            .as_deref()
            .unwrap_or("work")
            .to_ascii_lowercase();
        let entry = sets
            .entry(library.clone())
            .or_insert_with(|| (BTreeSet::new(), false));
        entry.0.insert(path.clone());
        entry.1 |= file.is_third_party;
        explicit.insert(
            path,
            FileAssignment {
                library,
                is_third_party: file.is_third_party,
                explicit: true,
            },
        );
    }

    // Drop files matched by lint.ignorePatterns entirely
    if !config.lint.ignore_patterns.is_empty() {
        for (_, (files, _)) in sets.iter_mut() {
            files.retain(|path| {
                !config
                    .lint
                    .ignore_patterns
                    .iter()
                    .any(|pattern| pattern_matches(pattern, path, root))
            });
        }
        explicit.retain(|path, _| {
            !config
                .lint
                .ignore_patterns
                .iter()
                .any(|pattern| pattern_matches(pattern, path, root))
        });
    }

    let libraries: Vec<ResolvedLibrary> = sets
        .into_iter()
        .map(|(name, (files, is_third_party))| ResolvedLibrary {
            name,
            files: files.into_iter().collect(),
            is_third_party,
        })
        .collect();

    // First matching library in sorted order wins for files reachable
    // through several libraries; explicit entries override.
    let mut assignments = BTreeMap::new();
    for library in &libraries {
        for file in &library.files {
            assignments
                .entry(file.clone())
                .or_insert_with(|| FileAssignment {
                    library: library.name.clone(),
                    is_third_party: library.is_third_party,
                    explicit: false,
                });
        }
    }
    for (path, assignment) in explicit {
        assignments.insert(path, assignment);
    }

    ResolvedProject {
        libraries,
        assignments,
    }
}

/// Make a path absolute by joining with the root when relative.
fn absolutize(path: &Path, root: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Expand one pattern into matching files. Invalid patterns yield nothing.
fn expand_pattern(pattern: &str, root: &Path) -> Vec<PathBuf> {
    if let Some(split) = pattern.find("**") {
        expand_deep_pattern(pattern, split, root)
    } else {
        let absolute = absolutize(Path::new(pattern), root);
        let Some(text) = absolute.to_str() else {
            return Vec::new();
        };
        match glob::glob(text) {
            Ok(paths) => paths.filter_map(Result::ok).filter(|p| p.is_file()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Expand a pattern containing `**`, split at its first occurrence.
fn expand_deep_pattern(pattern: &str, split: usize, root: &Path) -> Vec<PathBuf> {
    let prefix = pattern[..split].trim_end_matches(['/', '\\']);
    let suffix = pattern[split + 2..].trim_start_matches(['/', '\\']);

    let walk_root = if prefix.is_empty() {
        root.to_path_buf()
    } else {
        absolutize(Path::new(prefix), root)
    };
    let Ok(matcher) = glob::Pattern::new(suffix) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for entry in WalkDir::new(&walk_root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(&walk_root) else {
            continue;
        };
        if suffix_matches(&matcher, suffix, relative) {
            out.push(entry.path().to_path_buf());
        }
    }
    out
}

/// Match the post-`**` suffix against a path relative to the walk root.
///
/// A suffix with no directory separator matches against the basename;
/// otherwise the full relative path, falling back to a right-anchored
/// match over trailing components.
fn suffix_matches(matcher: &glob::Pattern, suffix: &str, relative: &Path) -> bool {
    if suffix.is_empty() {
        return true;
    }
    if !suffix.contains('/') && !suffix.contains('\\') {
        return relative
            .file_name()
            .map(|name| matcher.matches_path(Path::new(name)))
            .unwrap_or(false);
    }
    if matcher.matches_path(relative) {
        return true;
    }
    // Right-anchored fallback: try every trailing sub-path
    let components: Vec<_> = relative.components().collect();
    for start in 1..components.len() {
        let tail: PathBuf = components[start..].iter().collect();
        if matcher.matches_path(&tail) {
            return true;
        }
    }
    false
}

/// Whether a pattern matches a resolved file path. Shares the `**`
/// machinery with inclusion so exclusion and third-party classification
/// behave identically.
fn pattern_matches(pattern: &str, path: &Path, root: &Path) -> bool {
    if let Some(split) = pattern.find("**") {
        let prefix = pattern[..split].trim_end_matches(['/', '\\']);
        let suffix = pattern[split + 2..].trim_start_matches(['/', '\\']);
        let walk_root = if prefix.is_empty() {
            root.to_path_buf()
        } else {
            absolutize(Path::new(prefix), root)
        };
        let Ok(relative) = path.strip_prefix(&walk_root) else {
            return false;
        };
        let Ok(matcher) = glob::Pattern::new(suffix) else {
            return false;
        };
        suffix_matches(&matcher, suffix, relative)
    } else {
        let absolute = absolutize(Path::new(pattern), root);
        let Some(text) = absolute.to_str() else {
            return false;
        };
        match glob::Pattern::new(text) {
            Ok(matcher) => {
                matcher.matches_path(path)
                    || path
                        .file_name()
                        .map(|name| {
                            glob::Pattern::new(pattern)
                                .map(|p| p.matches_path(Path::new(name)))
                                .unwrap_or(false)
                        })
                        .unwrap_or(false)
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileEntry, LibraryConfig};
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "-- vhdl\n").unwrap();
        path
    }

    fn config_with_library(name: &str, lib: LibraryConfig) -> Config {
        let mut config = Config::default();
        config.libraries.insert(name.to_string(), lib);
        config
    }

    #[test]
    fn deep_glob_matches_any_depth() {
        let temp = TempDir::new().unwrap();
        let a = touch(temp.path(), "rtl/top.vhd");
        let b = touch(temp.path(), "rtl/sub/inner/alu.vhd");
        touch(temp.path(), "rtl/readme.md");

        let config = config_with_library(
            "core",
            LibraryConfig {
                files: vec!["rtl/**/*.vhd".into()],
                ..Default::default()
            },
        );
        let project = resolve(&config, temp.path());
        assert_eq!(project.libraries.len(), 1);
        assert_eq!(project.libraries[0].files, vec![a, b]);
    }

    #[test]
    fn non_vhdl_matches_are_filtered() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "src/top.sv");
        let keep = touch(temp.path(), "src/top.VHD");

        let config = config_with_library(
            "work",
            LibraryConfig {
                files: vec!["src/*".into()],
                ..Default::default()
            },
        );
        let project = resolve(&config, temp.path());
        assert_eq!(project.libraries[0].files, vec![keep]);
    }

    #[test]
    fn exclude_applies_to_glob_matches_only() {
        let temp = TempDir::new().unwrap();
        let keep = touch(temp.path(), "rtl/top.vhd");
        let skipped = touch(temp.path(), "rtl/top_tb.vhd");

        let mut config = config_with_library(
            "work",
            LibraryConfig {
                files: vec!["rtl/**/*.vhd".into()],
                exclude: vec!["rtl/**/*_tb.vhd".into()],
                ..Default::default()
            },
        );
        // Explicitly listed files survive exclusion
        config.files.push(FileEntry {
            file: skipped.to_string_lossy().into_owned(),
            library: Some("work".into()),
            ..Default::default()
        });

        let project = resolve(&config, temp.path());
        let work = &project.libraries[0];
        assert!(work.files.contains(&keep));
        assert!(work.files.contains(&skipped));
        assert!(project.assignments[&skipped].explicit);
    }

    #[test]
    fn explicit_non_vhdl_language_is_skipped() {
        let temp = TempDir::new().unwrap();
        let verilog = touch(temp.path(), "mixed/top.vhd");

        let mut config = Config::default();
        config.files.push(FileEntry {
            file: verilog.to_string_lossy().into_owned(),
            language: Some("verilog".into()),
            ..Default::default()
        });
        let project = resolve(&config, temp.path());
        assert!(project.libraries.is_empty());
    }

    #[test]
    fn multi_library_file_gets_first_sorted_library() {
        let temp = TempDir::new().unwrap();
        let shared = touch(temp.path(), "shared/util.vhd");

        let mut config = Config::default();
        for name in ["zeta", "alpha"] {
            config.libraries.insert(
                name.to_string(),
                LibraryConfig {
                    files: vec!["shared/*.vhd".into()],
                    ..Default::default()
                },
            );
        }
        let project = resolve(&config, temp.path());
        // Member of both libraries, assigned to the first in sorted order
        assert_eq!(project.libraries.len(), 2);
        assert!(project.libraries.iter().all(|l| l.files.contains(&shared)));
        assert_eq!(project.library_of(&shared), "alpha");
    }

    #[test]
    fn third_party_flag_propagates() {
        let temp = TempDir::new().unwrap();
        let vendor = touch(temp.path(), "vendor/fifo.vhd");

        let config = config_with_library(
            "vendor_lib",
            LibraryConfig {
                files: vec!["vendor/**".into()],
                is_third_party: true,
                ..Default::default()
            },
        );
        let project = resolve(&config, temp.path());
        assert!(project.is_third_party(&vendor));
    }

    #[test]
    fn ignore_patterns_drop_files_entirely() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "gen/auto.vhd");
        let kept = touch(temp.path(), "rtl/top.vhd");

        let mut config = config_with_library(
            "work",
            LibraryConfig {
                files: vec!["**/*.vhd".into()],
                ..Default::default()
            },
        );
        config.lint.ignore_patterns = vec!["gen/**".into()];
        let project = resolve(&config, temp.path());
        assert_eq!(project.files(), vec![kept]);
    }

    #[test]
    fn invalid_pattern_is_silently_skipped() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "rtl/top.vhd");
        let config = config_with_library(
            "work",
            LibraryConfig {
                files: vec!["rtl/[".into()],
                ..Default::default()
            },
        );
        let project = resolve(&config, temp.path());
        assert!(project.libraries[0].files.is_empty());
    }

    #[test]
    fn bare_deep_suffix_matches_basename() {
        let temp = TempDir::new().unwrap();
        let a = touch(temp.path(), "x/y/z/mod_a.vhd");
        let config = config_with_library(
            "work",
            LibraryConfig {
                files: vec!["**/mod_a.vhd".into()],
                ..Default::default()
            },
        );
        let project = resolve(&config, temp.path());
        assert_eq!(project.libraries[0].files, vec![a]);
    }
}
