//! Policy-layer handoff.
//!
//! The analysis core ends at a single schema-validated input document fed
//! to an external rule evaluator. This module assembles that document,
//! validates it, and drives the evaluator subprocess.

mod evaluator;
mod input;
mod schema;

pub use evaluator::{
    EvaluatorReport, POLICY_BIN_ENV, PolicyEvaluator, SubprocessEvaluator, Summary, Violation,
};
pub use input::{PolicyComponent, PolicyEntity, PolicyInput, PolicyLintConfig, build_policy_input};
pub use schema::validate;
