//! The policy input document.
//!
//! One JSON document with `snake_case` fields, assembled from the fact
//! tables after dependency resolution. Entities and components carry their
//! interface lists embedded; everything else stays flat.

use crate::config::Config;
use crate::facts::{
    ArchitectureRow, CaseRow, ConfigurationRow, ContextClauseRow, DependencyRow, GenericRow,
    InstanceRow, LibraryClauseRow, PackageRow, PortRow, ProcessRow, SignalRow, UseClauseRow,
    VerificationBlockRow, VerificationTagErrorRow, VerificationTagRow,
};
use crate::symbol::Symbol;
use crate::tables::{FactTables, FileRow};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// An entity with its interface embedded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyEntity {
    pub name: String,
    pub file: String,
    pub line: usize,
    pub ports: Vec<PortRow>,
    pub generics: Vec<GenericRow>,
}

/// A component declaration with its interface embedded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyComponent {
    pub name: String,
    pub file: String,
    pub line: usize,
    pub in_arch: String,
    pub in_package: String,
    pub ports: Vec<PortRow>,
    pub generics: Vec<GenericRow>,
}

/// Lint configuration as surfaced to the evaluator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyLintConfig {
    pub rules: IndexMap<String, String>,
    pub ignore_patterns: Vec<String>,
    pub ignore_regions: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyInput {
    pub standard: String,
    pub lint: PolicyLintConfig,
    pub files: Vec<FileRow>,
    pub entities: Vec<PolicyEntity>,
    pub architectures: Vec<ArchitectureRow>,
    pub packages: Vec<PackageRow>,
    pub configurations: Vec<ConfigurationRow>,
    pub components: Vec<PolicyComponent>,
    pub signals: Vec<SignalRow>,
    pub ports: Vec<PortRow>,
    pub use_clauses: Vec<UseClauseRow>,
    pub library_clauses: Vec<LibraryClauseRow>,
    pub context_clauses: Vec<ContextClauseRow>,
    pub dependencies: Vec<DependencyRow>,
    pub symbols: Vec<Symbol>,
    pub instances: Vec<InstanceRow>,
    pub case_statements: Vec<CaseRow>,
    pub processes: Vec<ProcessRow>,
    pub verification_blocks: Vec<VerificationBlockRow>,
    pub verification_tags: Vec<VerificationTagRow>,
    pub verification_tag_errors: Vec<VerificationTagErrorRow>,
}

/// Assemble the policy input from sorted fact tables and the symbol
/// snapshot.
pub fn build_policy_input(
    tables: &FactTables,
    symbols: Vec<Symbol>,
    config: &Config,
) -> PolicyInput {
    let entities = tables
        .entities
        .iter()
        .map(|entity| PolicyEntity {
            name: entity.name.clone(),
            file: entity.file.clone(),
            line: entity.line,
            ports: tables
                .ports
                .iter()
                .filter(|p| p.file == entity.file && p.in_entity.eq_ignore_ascii_case(&entity.name))
                .cloned()
                .collect(),
            generics: tables
                .generics
                .iter()
                .filter(|g| g.file == entity.file && g.in_entity.eq_ignore_ascii_case(&entity.name))
                .cloned()
                .collect(),
        })
        .collect();

    let components = tables
        .components
        .iter()
        .map(|component| PolicyComponent {
            name: component.name.clone(),
            file: component.file.clone(),
            line: component.line,
            in_arch: component.in_arch.clone(),
            in_package: component.in_package.clone(),
            ports: tables
                .ports
                .iter()
                .filter(|p| {
                    p.file == component.file && p.in_component.eq_ignore_ascii_case(&component.name)
                })
                .cloned()
                .collect(),
            generics: tables
                .generics
                .iter()
                .filter(|g| {
                    g.file == component.file && g.in_component.eq_ignore_ascii_case(&component.name)
                })
                .cloned()
                .collect(),
        })
        .collect();

    let lint = PolicyLintConfig {
        rules: config
            .lint
            .rules
            .iter()
            .map(|(name, severity)| (name.clone(), severity.as_str().to_string()))
            .collect(),
        ignore_patterns: config.lint.ignore_patterns.clone(),
        ignore_regions: config.lint.ignore_regions,
    };

    PolicyInput {
        standard: config.standard.as_str().to_string(),
        lint,
        files: tables.files.clone(),
        entities,
        architectures: tables.architectures.clone(),
        packages: tables.packages.clone(),
        configurations: tables.configurations.clone(),
        components,
        signals: tables.signals.clone(),
        ports: tables.ports.clone(),
        use_clauses: tables.use_clauses.clone(),
        library_clauses: tables.library_clauses.clone(),
        context_clauses: tables.context_clauses.clone(),
        dependencies: tables.dependencies.clone(),
        symbols,
        instances: tables.instances.clone(),
        case_statements: tables.case_statements.clone(),
        processes: tables.processes.clone(),
        verification_blocks: tables.verification_blocks.clone(),
        verification_tags: tables.verification_tags.clone(),
        verification_tag_errors: tables.verification_tag_errors.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::{Direction, EntityRow, FileFacts};
    use std::collections::{BTreeMap, BTreeSet};

    #[test]
    fn entities_embed_their_interface() {
        let mut facts = FileFacts::new("a.vhd");
        facts.entities.push(EntityRow {
            name: "dut".into(),
            file: "a.vhd".into(),
            line: 1,
        });
        facts.ports.push(PortRow {
            name: "clk".into(),
            direction: Direction::In,
            file: "a.vhd".into(),
            line: 2,
            in_entity: "DUT".into(),
            ..Default::default()
        });
        facts.generics.push(GenericRow {
            name: "WIDTH".into(),
            file: "a.vhd".into(),
            line: 2,
            in_entity: "dut".into(),
            ..Default::default()
        });

        let tables = FactTables::build(
            &[facts],
            &BTreeMap::from([("a.vhd".to_string(), "work".to_string())]),
            &BTreeSet::new(),
        );
        let input = build_policy_input(&tables, Vec::new(), &Config::default());

        assert_eq!(input.entities.len(), 1);
        // in_entity matching is case-insensitive (VHDL semantics)
        assert_eq!(input.entities[0].ports.len(), 1);
        assert_eq!(input.entities[0].generics.len(), 1);
        assert_eq!(input.standard, "2008");
        // flat ports table also present
        assert_eq!(input.ports.len(), 1);
    }

    #[test]
    fn wire_form_is_snake_case() {
        let input = PolicyInput::default();
        let json = serde_json::to_value(&input).unwrap();
        let object = json.as_object().unwrap();
        assert!(object.contains_key("use_clauses"));
        assert!(object.contains_key("verification_tag_errors"));
        assert!(object.contains_key("case_statements"));
    }
}
