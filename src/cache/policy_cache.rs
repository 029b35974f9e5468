//! Project-level cache of the last policy-evaluator result.
//!
//! One JSON document keyed by
//! `sha256(canonical_json({standard, lint_config, sorted third_party_files,
//! policy_rules_hash}))`. An entry is valid only when its format version,
//! key, and ordered file list all match the current run; anything else
//! discards it.

use crate::cache::{read_json, sha256_hex, write_json_atomic};
use crate::config::LintConfig;
use crate::error::{AnalyzeError, AnalyzeResult, CacheResult};
use crate::policy::EvaluatorReport;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Format version of the cached document.
pub const POLICY_CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyCacheEntry {
    pub version: u32,
    pub key: String,
    /// Digest over the per-file content hashes; any source edit changes it
    pub facts_hash: String,
    /// Sorted file list the result was computed over
    pub files: Vec<String>,
    pub result: EvaluatorReport,
}

/// Single-document cache of the last evaluator run.
#[derive(Debug)]
pub struct PolicyCache {
    path: PathBuf,
}

impl PolicyCache {
    pub fn at(dir: &Path) -> Self {
        Self {
            path: dir.join("policy_cache.json"),
        }
    }

    /// Load the cached entry, if any. Malformed documents read as absent.
    pub fn load(&self) -> Option<PolicyCacheEntry> {
        match read_json::<PolicyCacheEntry>(&self.path) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!(target: "cache", "no usable policy cache: {e}");
                None
            }
        }
    }

    pub fn save(&self, entry: &PolicyCacheEntry) -> CacheResult<()> {
        write_json_atomic(&self.path, entry)
    }

    /// Whether a loaded entry can stand in for a fresh evaluator run.
    pub fn is_valid(
        entry: &PolicyCacheEntry,
        key: &str,
        facts_hash: &str,
        files: &[String],
    ) -> bool {
        entry.version == POLICY_CACHE_VERSION
            && entry.key == key
            && entry.facts_hash == facts_hash
            && entry.files == files
    }

    /// Remove the cached result.
    pub fn clear(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Hash of the policy rule sources: sha256 over
/// `(relative_path \0 contents \0)` for every rule file, walked in sorted
/// order. Missing rule sources are fatal; a result computed against no
/// rules would cache-hit forever.
pub fn policy_rules_hash(rules_dir: &Path) -> AnalyzeResult<String> {
    if !rules_dir.is_dir() {
        return Err(AnalyzeError::Resolve {
            reason: format!("policy rules directory '{}' not found", rules_dir.display()),
        });
    }

    let mut hasher_input: Vec<u8> = Vec::new();
    let mut seen_any = false;
    for entry in WalkDir::new(rules_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(rules_dir)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .into_owned();
        let contents = std::fs::read(entry.path()).map_err(|e| AnalyzeError::Io {
            path: entry.path().to_path_buf(),
            source: e,
        })?;
        hasher_input.extend_from_slice(relative.as_bytes());
        hasher_input.push(0);
        hasher_input.extend_from_slice(&contents);
        hasher_input.push(0);
        seen_any = true;
    }
    if !seen_any {
        return Err(AnalyzeError::Resolve {
            reason: format!("no policy rule sources under '{}'", rules_dir.display()),
        });
    }
    Ok(sha256_hex(&hasher_input))
}

#[derive(Serialize)]
struct KeyMaterial<'a> {
    standard: &'a str,
    lint_config: &'a LintConfig,
    third_party_files: Vec<&'a str>,
    policy_rules_hash: &'a str,
}

/// Digest of the per-file content hashes, walked in path order.
pub fn facts_set_hash(content_hashes: &std::collections::BTreeMap<String, String>) -> String {
    let mut input: Vec<u8> = Vec::new();
    for (path, hash) in content_hashes {
        input.extend_from_slice(path.as_bytes());
        input.push(0);
        input.extend_from_slice(hash.as_bytes());
        input.push(0);
    }
    sha256_hex(&input)
}

/// Cache key over everything that changes the evaluator's verdict besides
/// the facts themselves.
pub fn policy_cache_key(
    standard: &str,
    lint_config: &LintConfig,
    third_party_files: &[String],
    rules_hash: &str,
) -> String {
    let mut third_party: Vec<&str> = third_party_files.iter().map(String::as_str).collect();
    third_party.sort_unstable();
    let material = KeyMaterial {
        standard,
        lint_config,
        third_party_files: third_party,
        policy_rules_hash: rules_hash,
    };
    let canonical = serde_json::to_string(&material).expect("key material serializes to JSON");
    sha256_hex(canonical.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{EvaluatorReport, Summary};
    use tempfile::TempDir;

    fn sample_entry(key: &str, files: Vec<String>) -> PolicyCacheEntry {
        PolicyCacheEntry {
            version: POLICY_CACHE_VERSION,
            key: key.to_string(),
            facts_hash: "fh".to_string(),
            files,
            result: EvaluatorReport {
                violations: Vec::new(),
                summary: Summary::default(),
            },
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let temp = TempDir::new().unwrap();
        let cache = PolicyCache::at(temp.path());
        let entry = sample_entry("k1", vec!["a.vhd".into()]);
        cache.save(&entry).unwrap();
        assert_eq!(cache.load().unwrap(), entry);
    }

    #[test]
    fn validity_needs_version_key_facts_and_files() {
        let entry = sample_entry("k1", vec!["a.vhd".into(), "b.vhd".into()]);
        let files = vec!["a.vhd".to_string(), "b.vhd".to_string()];
        assert!(PolicyCache::is_valid(&entry, "k1", "fh", &files));
        assert!(!PolicyCache::is_valid(&entry, "k2", "fh", &files));
        assert!(!PolicyCache::is_valid(&entry, "k1", "other", &files));
        assert!(!PolicyCache::is_valid(&entry, "k1", "fh", &files[..1].to_vec()));

        let mut stale = entry;
        stale.version = POLICY_CACHE_VERSION + 1;
        assert!(!PolicyCache::is_valid(&stale, "k1", "fh", &files));
    }

    #[test]
    fn facts_set_hash_tracks_every_file() {
        let mut hashes = std::collections::BTreeMap::new();
        hashes.insert("a.vhd".to_string(), "h1".to_string());
        hashes.insert("b.vhd".to_string(), "h2".to_string());
        let first = facts_set_hash(&hashes);
        hashes.insert("b.vhd".to_string(), "h3".to_string());
        assert_ne!(first, facts_set_hash(&hashes));
    }

    #[test]
    fn clear_removes_the_document() {
        let temp = TempDir::new().unwrap();
        let cache = PolicyCache::at(temp.path());
        cache.save(&sample_entry("k", Vec::new())).unwrap();
        cache.clear().unwrap();
        assert!(cache.load().is_none());
        // Clearing twice is fine
        cache.clear().unwrap();
    }

    #[test]
    fn rules_hash_tracks_contents_and_paths() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("rules")).unwrap();
        let dir = temp.path().join("rules");
        std::fs::write(dir.join("core.rules"), "rule a\n").unwrap();
        std::fs::write(dir.join("style.rules"), "rule b\n").unwrap();

        let first = policy_rules_hash(&dir).unwrap();
        assert_eq!(first, policy_rules_hash(&dir).unwrap());

        std::fs::write(dir.join("style.rules"), "rule b changed\n").unwrap();
        assert_ne!(first, policy_rules_hash(&dir).unwrap());
    }

    #[test]
    fn missing_rules_are_fatal() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");
        assert!(matches!(
            policy_rules_hash(&missing),
            Err(AnalyzeError::Resolve { .. })
        ));

        let empty = temp.path().join("empty");
        std::fs::create_dir_all(&empty).unwrap();
        assert!(matches!(
            policy_rules_hash(&empty),
            Err(AnalyzeError::Resolve { .. })
        ));
    }

    #[test]
    fn key_is_stable_under_third_party_order() {
        let lint = LintConfig::default();
        let key1 = policy_cache_key("2008", &lint, &["b.vhd".into(), "a.vhd".into()], "rh");
        let key2 = policy_cache_key("2008", &lint, &["a.vhd".into(), "b.vhd".into()], "rh");
        assert_eq!(key1, key2);

        let key3 = policy_cache_key("2019", &lint, &["a.vhd".into(), "b.vhd".into()], "rh");
        assert_ne!(key1, key3);
    }
}
