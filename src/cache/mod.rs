//! Two-level incremental cache.
//!
//! A per-file facts cache keyed by content + tool-version hashes, and a
//! project-level policy-result cache keyed by the policy input. Every JSON
//! document is written atomically (temp file in the same directory, then
//! rename) so a crash never leaves a torn file behind. Cache read/write
//! failures are logged and degrade to misses; they never abort a run.

mod facts_cache;
mod policy_cache;

pub use facts_cache::{FactsCache, ToolVersions};
pub use policy_cache::{
    POLICY_CACHE_VERSION, PolicyCache, PolicyCacheEntry, facts_set_hash, policy_cache_key,
    policy_rules_hash,
};

use crate::error::{CacheError, CacheResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::path::Path;

/// SHA-256 hex digest of raw bytes. File identity throughout the pipeline.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Write a JSON document atomically: temp file in the target directory,
/// then rename. The temp file is removed on any failure.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> CacheResult<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    let parent = parent.unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| CacheError::WriteFailed {
        path: parent.to_path_buf(),
        source: e,
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| {
        CacheError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        }
    })?;
    serde_json::to_writer_pretty(&mut temp, value).map_err(|e| CacheError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    temp.persist(path).map_err(|e| CacheError::WriteFailed {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

/// Read and parse a JSON document.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> CacheResult<T> {
    let bytes = std::fs::read(path).map_err(|e| CacheError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_slice(&bytes).map_err(|e| CacheError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
