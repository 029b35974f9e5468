//! Pipeline orchestration.

mod indexer;

pub use indexer::{AnalysisResult, IndexStats, Indexer, POLICY_RULES_ENV, clear_caches};
