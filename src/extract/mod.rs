//! Fact extraction from VHDL source.
//!
//! The indexer consumes the [`FactsExtractor`] capability so tests can
//! substitute doubles; the real implementation walks a tree-sitter concrete
//! syntax tree by node kind. Extraction is pure and thread-safe: one call
//! reads one file and produces one [`FileFacts`], with grammar errors
//! surfaced as parse-error rows rather than failures.

mod decl;
mod extractor;
mod process;
mod tags;
mod tree;

pub use extractor::TreeSitterExtractor;
pub use tags::{KNOWN_CHECKS, parse_verification_tag};

use crate::error::ExtractResult;
use crate::facts::FileFacts;
use std::path::Path;

/// Version of the grammar consumed by the extractor. Part of every facts
/// cache key: bumping it invalidates cached facts.
pub const PARSER_VERSION: &str = "tree-sitter-vhdl-0.6";

/// Version of the extraction logic itself. Bump on any change to what or
/// how facts are extracted.
pub const EXTRACTOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Single-method capability the indexer uses to turn a file into facts.
pub trait FactsExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> ExtractResult<FileFacts>;
}
