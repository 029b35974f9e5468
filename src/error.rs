//! Error types for the analysis pipeline.
//!
//! Per-file failures (unreadable source, grammar errors) are data that ride
//! alongside successes in the run result; only contract failures at the
//! evaluator boundary abort the run. This module defines both families.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors that abort an analysis run.
#[derive(Error, Debug)]
pub enum AnalyzeError {
    /// Filesystem failure outside the per-file extraction loop
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The assembled policy input failed schema validation. Aborts before
    /// the evaluator is invoked.
    #[error("policy input failed schema validation: {0}")]
    Schema(#[from] SchemaError),

    /// The policy evaluator subprocess failed or returned malformed output
    #[error("policy evaluator failed: {reason}")]
    Evaluator { reason: String },

    /// Policy rule sources could not be located when computing the policy
    /// hash
    #[error("cannot resolve policy rules: {reason}")]
    Resolve { reason: String },
}

/// A schema violation in the assembled policy input.
///
/// Carries enough context to point at the offending row and field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{table}[{row}].{field}: {message}")]
pub struct SchemaError {
    pub table: &'static str,
    pub row: usize,
    pub field: &'static str,
    pub message: String,
}

/// Errors from extracting facts out of a single file.
///
/// These never abort the run; the indexer converts them into [`FileError`]
/// rows and continues with the remaining files.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to initialize VHDL parser: {reason}")]
    ParserInit { reason: String },
}

/// Errors from cache reads/writes. Logged and treated as cache misses.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to read cache file '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write cache file '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed cache document '{path}': {reason}")]
    Malformed { path: PathBuf, reason: String },
}

/// A per-file failure surfaced in the run result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    pub file: String,
    pub kind: FileErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileErrorKind {
    /// The file could not be read
    Read,
    /// The grammar reported syntax errors (facts may still be partial)
    Parse,
}

/// Result type alias for whole-run operations
pub type AnalyzeResult<T> = Result<T, AnalyzeError>;

/// Result type alias for per-file extraction
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Result type alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
