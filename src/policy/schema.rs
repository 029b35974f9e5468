//! Declarative schema over the policy input.
//!
//! Every row that reaches the evaluator is checked here first; any failure
//! is fatal and aborts the run before the subprocess starts. A malformed
//! input document is an extractor bug, not a data point.

use crate::error::SchemaError;
use crate::policy::PolicyInput;
use regex::Regex;
use std::sync::OnceLock;

/// Standard or extended (backslash-delimited) identifier.
fn identifier_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*|\\.+\\)$").expect("identifier pattern")
    })
}

/// Dot-separated chain of identifiers.
fn qualified_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*|\\.+\\)(\.([A-Za-z_][A-Za-z0-9_]*|\\.+\\))*$")
            .expect("qualified identifier pattern")
    })
}

fn tag_scope_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(entity|arch):.+$").expect("tag scope pattern"))
}

fn error(table: &'static str, row: usize, field: &'static str, message: String) -> SchemaError {
    SchemaError {
        table,
        row,
        field,
        message,
    }
}

fn check_identifier(
    table: &'static str,
    row: usize,
    field: &'static str,
    value: &str,
) -> Result<(), SchemaError> {
    if identifier_pattern().is_match(value) {
        Ok(())
    } else {
        Err(error(
            table,
            row,
            field,
            format!("'{value}' is not a VHDL identifier"),
        ))
    }
}

fn check_qualified(
    table: &'static str,
    row: usize,
    field: &'static str,
    value: &str,
) -> Result<(), SchemaError> {
    if qualified_pattern().is_match(value) {
        Ok(())
    } else {
        Err(error(
            table,
            row,
            field,
            format!("'{value}' is not a qualified identifier"),
        ))
    }
}

fn check_file(table: &'static str, row: usize, value: &str) -> Result<(), SchemaError> {
    let lower = value.to_ascii_lowercase();
    if lower.ends_with(".vhd") || lower.ends_with(".vhdl") {
        Ok(())
    } else {
        Err(error(
            table,
            row,
            "file",
            format!("'{value}' does not end with .vhd or .vhdl"),
        ))
    }
}

fn check_line(table: &'static str, row: usize, line: usize) -> Result<(), SchemaError> {
    if line >= 1 {
        Ok(())
    } else {
        Err(error(table, row, "line", "line numbers are 1-based".into()))
    }
}

/// Validate the assembled policy input. Returns the first violation.
pub fn validate(input: &PolicyInput) -> Result<(), SchemaError> {
    for (i, file) in input.files.iter().enumerate() {
        check_file("files", i, &file.path)?;
        check_identifier("files", i, "library", &file.library)?;
    }
    for (i, entity) in input.entities.iter().enumerate() {
        check_identifier("entities", i, "name", &entity.name)?;
        check_file("entities", i, &entity.file)?;
        check_line("entities", i, entity.line)?;
        for port in &entity.ports {
            check_identifier("entities", i, "ports.name", &port.name)?;
        }
        for generic in &entity.generics {
            check_identifier("entities", i, "generics.name", &generic.name)?;
        }
    }
    for (i, arch) in input.architectures.iter().enumerate() {
        check_identifier("architectures", i, "name", &arch.name)?;
        check_identifier("architectures", i, "entity_name", &arch.entity_name)?;
        check_file("architectures", i, &arch.file)?;
        check_line("architectures", i, arch.line)?;
    }
    for (i, package) in input.packages.iter().enumerate() {
        check_identifier("packages", i, "name", &package.name)?;
        check_file("packages", i, &package.file)?;
        check_line("packages", i, package.line)?;
    }
    for (i, configuration) in input.configurations.iter().enumerate() {
        check_identifier("configurations", i, "name", &configuration.name)?;
        check_file("configurations", i, &configuration.file)?;
        check_line("configurations", i, configuration.line)?;
    }
    for (i, component) in input.components.iter().enumerate() {
        check_identifier("components", i, "name", &component.name)?;
        check_file("components", i, &component.file)?;
        check_line("components", i, component.line)?;
    }
    for (i, signal) in input.signals.iter().enumerate() {
        check_identifier("signals", i, "name", &signal.name)?;
        check_file("signals", i, &signal.file)?;
        check_line("signals", i, signal.line)?;
    }
    for (i, port) in input.ports.iter().enumerate() {
        check_identifier("ports", i, "name", &port.name)?;
        check_file("ports", i, &port.file)?;
        check_line("ports", i, port.line)?;
    }
    for (i, dependency) in input.dependencies.iter().enumerate() {
        check_qualified("dependencies", i, "target", &dependency.target)?;
        check_file("dependencies", i, &dependency.file)?;
        check_line("dependencies", i, dependency.line)?;
    }
    for (i, symbol) in input.symbols.iter().enumerate() {
        check_qualified("symbols", i, "qualified_name", &symbol.qualified_name)?;
        if symbol.qualified_name != symbol.qualified_name.to_ascii_lowercase() {
            return Err(error(
                "symbols",
                i,
                "qualified_name",
                format!("'{}' is not lowercase", symbol.qualified_name),
            ));
        }
        if symbol.qualified_name.matches('.').count() != 1 {
            return Err(error(
                "symbols",
                i,
                "qualified_name",
                format!(
                    "'{}' must contain exactly one '.'",
                    symbol.qualified_name
                ),
            ));
        }
        check_file("symbols", i, &symbol.file)?;
        check_line("symbols", i, symbol.line)?;
    }
    for (i, instance) in input.instances.iter().enumerate() {
        check_qualified("instances", i, "target", &instance.target)?;
        check_file("instances", i, &instance.file)?;
        check_line("instances", i, instance.line)?;
    }
    for (i, case) in input.case_statements.iter().enumerate() {
        check_file("case_statements", i, &case.file)?;
        check_line("case_statements", i, case.line)?;
    }
    for (i, process) in input.processes.iter().enumerate() {
        check_file("processes", i, &process.file)?;
        check_line("processes", i, process.line)?;
    }
    for (i, tag) in input.verification_tags.iter().enumerate() {
        if !tag_scope_pattern().is_match(&tag.scope) {
            return Err(error(
                "verification_tags",
                i,
                "scope",
                format!("'{}' does not match (entity|arch):<name>", tag.scope),
            ));
        }
        check_file("verification_tags", i, &tag.file)?;
        check_line("verification_tags", i, tag.line)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::{ArchitectureRow, DependencyRow, VerificationTagRow};
    use crate::tables::FileRow;

    fn minimal_input() -> PolicyInput {
        PolicyInput {
            standard: "2008".into(),
            files: vec![FileRow {
                path: "a.vhd".into(),
                library: "work".into(),
                is_third_party: false,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn minimal_input_passes() {
        assert!(validate(&minimal_input()).is_ok());
    }

    #[test]
    fn bad_file_extension_fails() {
        let mut input = minimal_input();
        input.files[0].path = "a.sv".into();
        let err = validate(&input).unwrap_err();
        assert_eq!(err.table, "files");
        assert_eq!(err.field, "file");
    }

    #[test]
    fn bad_identifier_fails() {
        let mut input = minimal_input();
        input.architectures.push(ArchitectureRow {
            name: "rtl".into(),
            entity_name: "1bad".into(),
            file: "a.vhd".into(),
            line: 1,
        });
        let err = validate(&input).unwrap_err();
        assert_eq!(err.table, "architectures");
        assert_eq!(err.field, "entity_name");
    }

    #[test]
    fn extended_identifier_passes() {
        let mut input = minimal_input();
        input.architectures.push(ArchitectureRow {
            name: "rtl".into(),
            entity_name: r"\weird name\".into(),
            file: "a.vhd".into(),
            line: 1,
        });
        assert!(validate(&input).is_ok());
    }

    #[test]
    fn zero_line_fails() {
        let mut input = minimal_input();
        input.architectures.push(ArchitectureRow {
            name: "rtl".into(),
            entity_name: "top".into(),
            file: "a.vhd".into(),
            line: 0,
        });
        let err = validate(&input).unwrap_err();
        assert_eq!(err.field, "line");
    }

    #[test]
    fn dependency_target_must_be_qualified_chain() {
        let mut input = minimal_input();
        input.dependencies.push(DependencyRow {
            file: "a.vhd".into(),
            target: "ieee.std_logic_1164.all".into(),
            line: 1,
            ..Default::default()
        });
        assert!(validate(&input).is_ok());

        input.dependencies[0].target = "ieee..broken".into();
        let err = validate(&input).unwrap_err();
        assert_eq!(err.table, "dependencies");
    }

    #[test]
    fn tag_scope_shape_is_enforced() {
        let mut input = minimal_input();
        input.verification_tags.push(VerificationTagRow {
            id: "fsm.legal_state".into(),
            scope: "arch:rtl".into(),
            file: "a.vhd".into(),
            line: 3,
            ..Default::default()
        });
        assert!(validate(&input).is_ok());

        input.verification_tags[0].scope = "region:rtl".into();
        let err = validate(&input).unwrap_err();
        assert_eq!(err.table, "verification_tags");
    }
}
