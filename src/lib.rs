//! Static analysis core for VHDL.
//!
//! Turns a project of VHDL sources into a normalized fact database and
//! hands it, schema-validated, to an external policy evaluator. See the
//! module docs for the individual pipeline stages.

pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod facts;
pub mod graph;
pub mod index;
pub mod logging;
pub mod policy;
pub mod project;
pub mod symbol;
pub mod tables;
pub mod timing;

pub use config::Config;
pub use error::{AnalyzeError, FileError, FileErrorKind};
pub use extract::{FactsExtractor, TreeSitterExtractor};
pub use facts::FileFacts;
pub use graph::DependentsGraph;
pub use index::{AnalysisResult, Indexer};
pub use policy::{EvaluatorReport, PolicyInput, Violation};
pub use symbol::{Symbol, SymbolTable};
pub use tables::FactTables;
