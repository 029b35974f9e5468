//! Per-file facts cache.
//!
//! Layout under the cache directory:
//! - `index.json` - map of file path to entry (content hash, facts file,
//!   tool versions)
//! - `facts/<sha256(path)>.json` - the serialized [`FileFacts`]
//!
//! A hit requires the content hash and both tool versions to match; any
//! mismatch is a silent miss and the entry is replaced on the next `put`.
//! `get` is lock-free after the index load, `put` serializes the facts
//! write and the index mutation behind one mutex.

use crate::cache::{read_json, sha256_hex, write_json_atomic};
use crate::error::CacheResult;
use crate::extract::{EXTRACTOR_VERSION, PARSER_VERSION};
use crate::facts::FileFacts;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Schema version of `index.json`. A mismatch silently invalidates the
/// whole index.
const INDEX_VERSION: u32 = 1;

/// Versions of the parser and extractor a cache entry was produced with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolVersions {
    pub parser: String,
    pub extractor: String,
}

impl Default for ToolVersions {
    fn default() -> Self {
        Self {
            parser: PARSER_VERSION.to_string(),
            extractor: EXTRACTOR_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct IndexDoc {
    version: u32,
    entries: BTreeMap<String, IndexEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct IndexEntry {
    content_hash: String,
    facts_path: String,
    parser_version: String,
    extractor_version: String,
}

/// Content-addressed cache of extracted facts.
#[derive(Debug)]
pub struct FactsCache {
    dir: PathBuf,
    index: Mutex<IndexDoc>,
}

impl FactsCache {
    /// Open (or start) a cache at the given directory. A missing or
    /// malformed index is an empty cache, never an error.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let index = match read_json::<IndexDoc>(&dir.join("index.json")) {
            Ok(doc) if doc.version == INDEX_VERSION => doc,
            Ok(doc) => {
                tracing::debug!(
                    target: "cache",
                    "facts index version {} != {INDEX_VERSION}, starting fresh",
                    doc.version
                );
                IndexDoc::default()
            }
            Err(e) => {
                tracing::debug!(target: "cache", "no usable facts index: {e}");
                IndexDoc::default()
            }
        };
        Self {
            dir,
            index: Mutex::new(IndexDoc {
                version: INDEX_VERSION,
                entries: index.entries,
            }),
        }
    }

    /// Look up cached facts for a file at a given content hash.
    pub fn get(&self, path: &str, content_hash: &str, versions: &ToolVersions) -> Option<FileFacts> {
        let facts_path = {
            let index = self.index.lock();
            let entry = index.entries.get(path)?;
            if entry.content_hash != content_hash
                || entry.parser_version != versions.parser
                || entry.extractor_version != versions.extractor
            {
                return None;
            }
            self.dir.join("facts").join(&entry.facts_path)
        };
        match read_json::<FileFacts>(&facts_path) {
            Ok(facts) => Some(facts),
            Err(e) => {
                tracing::debug!(target: "cache", "cached facts unreadable, treating as miss: {e}");
                None
            }
        }
    }

    /// Store facts for a file, replacing any previous entry.
    pub fn put(
        &self,
        path: &str,
        content_hash: &str,
        versions: &ToolVersions,
        facts: &FileFacts,
    ) -> CacheResult<()> {
        let facts_name = format!("{}.json", sha256_hex(path.as_bytes()));
        let mut index = self.index.lock();
        write_json_atomic(&self.dir.join("facts").join(&facts_name), facts)?;
        index.entries.insert(
            path.to_string(),
            IndexEntry {
                content_hash: content_hash.to_string(),
                facts_path: facts_name,
                parser_version: versions.parser.clone(),
                extractor_version: versions.extractor.clone(),
            },
        );
        Ok(())
    }

    /// Drop index entries for files no longer part of the project.
    pub fn retain_files(&self, keep: &std::collections::HashSet<String>) {
        self.index.lock().entries.retain(|path, _| keep.contains(path));
    }

    /// Rewrite `index.json` atomically. Called once at end-of-run.
    pub fn flush(&self) -> CacheResult<()> {
        let index = self.index.lock();
        write_json_atomic(&self.dir.join("index.json"), &*index)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::EntityRow;
    use tempfile::TempDir;

    fn sample_facts(path: &str) -> FileFacts {
        let mut facts = FileFacts::new(path);
        facts.entities.push(EntityRow {
            name: "dut".into(),
            file: path.into(),
            line: 1,
        });
        facts
    }

    #[test]
    fn put_then_get_hits() {
        let temp = TempDir::new().unwrap();
        let cache = FactsCache::open(temp.path());
        let versions = ToolVersions::default();
        let facts = sample_facts("a.vhd");

        cache.put("a.vhd", "hash-1", &versions, &facts).unwrap();
        let hit = cache.get("a.vhd", "hash-1", &versions).unwrap();
        assert_eq!(hit, facts);
    }

    #[test]
    fn content_change_turns_hit_into_miss() {
        let temp = TempDir::new().unwrap();
        let cache = FactsCache::open(temp.path());
        let versions = ToolVersions::default();
        cache
            .put("a.vhd", "hash-1", &versions, &sample_facts("a.vhd"))
            .unwrap();
        assert!(cache.get("a.vhd", "hash-2", &versions).is_none());
    }

    #[test]
    fn version_bump_turns_hit_into_miss() {
        let temp = TempDir::new().unwrap();
        let cache = FactsCache::open(temp.path());
        let versions = ToolVersions::default();
        cache
            .put("a.vhd", "hash-1", &versions, &sample_facts("a.vhd"))
            .unwrap();

        let bumped_parser = ToolVersions {
            parser: "next-grammar".into(),
            ..versions.clone()
        };
        assert!(cache.get("a.vhd", "hash-1", &bumped_parser).is_none());

        let bumped_extractor = ToolVersions {
            extractor: "next-extractor".into(),
            ..versions
        };
        assert!(cache.get("a.vhd", "hash-1", &bumped_extractor).is_none());
    }

    #[test]
    fn index_survives_flush_and_reopen() {
        let temp = TempDir::new().unwrap();
        let versions = ToolVersions::default();
        {
            let cache = FactsCache::open(temp.path());
            cache
                .put("a.vhd", "hash-1", &versions, &sample_facts("a.vhd"))
                .unwrap();
            cache.flush().unwrap();
        }
        let reopened = FactsCache::open(temp.path());
        assert!(reopened.get("a.vhd", "hash-1", &versions).is_some());
    }

    #[test]
    fn malformed_index_is_empty_cache() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("index.json"), "{broken").unwrap();
        let cache = FactsCache::open(temp.path());
        assert!(cache.get("a.vhd", "hash-1", &ToolVersions::default()).is_none());
    }

    #[test]
    fn retain_drops_stale_entries() {
        let temp = TempDir::new().unwrap();
        let cache = FactsCache::open(temp.path());
        let versions = ToolVersions::default();
        cache
            .put("a.vhd", "h", &versions, &sample_facts("a.vhd"))
            .unwrap();
        cache
            .put("b.vhd", "h", &versions, &sample_facts("b.vhd"))
            .unwrap();
        let keep: std::collections::HashSet<String> = ["a.vhd".to_string()].into();
        cache.retain_files(&keep);
        assert!(cache.get("a.vhd", "h", &versions).is_some());
        assert!(cache.get("b.vhd", "h", &versions).is_none());
    }
}
