//! Semantic facts extracted from VHDL source files.
//!
//! One [`FileFacts`] record per parsed file, holding ordered row vectors for
//! every construct the extractor recognizes. Rows are flat, serde-friendly,
//! and carry `file` + 1-based `line` at minimum; structural rows carry the
//! names of their enclosing scopes. Identifiers are case-preserved here and
//! compared case-insensitively downstream (VHDL semantics).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// All facts extracted from a single file.
///
/// Immutable after extraction; serialized as-is into the per-file facts
/// cache. Row order follows source order, so identical inputs produce
/// bit-identical facts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileFacts {
    pub path: String,
    pub entities: Vec<EntityRow>,
    pub architectures: Vec<ArchitectureRow>,
    pub packages: Vec<PackageRow>,
    pub configurations: Vec<ConfigurationRow>,
    pub components: Vec<ComponentRow>,
    pub signals: Vec<SignalRow>,
    pub ports: Vec<PortRow>,
    pub generics: Vec<GenericRow>,
    pub instances: Vec<InstanceRow>,
    pub use_clauses: Vec<UseClauseRow>,
    pub library_clauses: Vec<LibraryClauseRow>,
    pub context_clauses: Vec<ContextClauseRow>,
    pub processes: Vec<ProcessRow>,
    pub generates: Vec<GenerateRow>,
    pub types: Vec<TypeRow>,
    pub subtypes: Vec<SubtypeRow>,
    pub functions: Vec<FunctionRow>,
    pub procedures: Vec<ProcedureRow>,
    pub constants: Vec<ConstantRow>,
    pub case_statements: Vec<CaseRow>,
    pub verification_blocks: Vec<VerificationBlockRow>,
    pub verification_tags: Vec<VerificationTagRow>,
    pub verification_tag_errors: Vec<VerificationTagErrorRow>,
    pub scopes: Vec<ScopeRow>,
    pub symbol_defs: Vec<SymbolDefRow>,
    pub name_uses: Vec<NameUseRow>,
    pub dependencies: Vec<DependencyRow>,
    pub clock_domains: Vec<ClockDomainRow>,
    pub parse_errors: Vec<ParseErrorRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRow {
    pub name: String,
    pub file: String,
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureRow {
    pub name: String,
    /// Name of the entity this architecture implements. Existence of the
    /// entity is not enforced here; that is a policy rule.
    pub entity_name: String,
    pub file: String,
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageRow {
    pub name: String,
    pub file: String,
    pub line: usize,
    pub is_body: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationRow {
    pub name: String,
    pub entity_name: String,
    pub file: String,
    pub line: usize,
}

/// A component declaration (not an instantiation; see [`InstanceRow`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentRow {
    pub name: String,
    pub file: String,
    pub line: usize,
    pub in_arch: String,
    pub in_package: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalRow {
    pub name: String,
    pub signal_type: String,
    pub default: String,
    pub file: String,
    pub line: usize,
    pub in_entity: String,
    pub in_arch: String,
    pub in_package: String,
}

/// Port direction. The empty form covers interface declarations with no
/// explicit mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "in")]
    In,
    #[serde(rename = "out")]
    Out,
    #[serde(rename = "inout")]
    Inout,
    #[serde(rename = "buffer")]
    Buffer,
    #[serde(rename = "linkage")]
    Linkage,
    #[default]
    #[serde(rename = "")]
    Unspecified,
}

impl Direction {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "in" => Some(Direction::In),
            "out" => Some(Direction::Out),
            "inout" => Some(Direction::Inout),
            "buffer" => Some(Direction::Buffer),
            "linkage" => Some(Direction::Linkage),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
            Direction::Inout => "inout",
            Direction::Buffer => "buffer",
            Direction::Linkage => "linkage",
            Direction::Unspecified => "",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortRow {
    pub name: String,
    pub direction: Direction,
    pub port_type: String,
    pub default: String,
    pub file: String,
    pub line: usize,
    pub in_entity: String,
    pub in_component: String,
}

/// Generic interface class per VHDL-2008 (plain value generics are
/// `constant`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenericClass {
    #[default]
    Constant,
    Type,
    Function,
    Procedure,
    Package,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenericRow {
    pub name: String,
    pub class: GenericClass,
    pub generic_type: String,
    pub default: String,
    pub file: String,
    pub line: usize,
    pub in_entity: String,
    pub in_component: String,
    pub in_package: String,
}

/// What a concurrent instantiation names directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceKind {
    Entity,
    #[default]
    Component,
    Configuration,
}

/// One formal->actual association from a port or generic map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssociationRow {
    /// Formal name; empty for positional association
    pub formal: String,
    pub actual: String,
    pub positional: bool,
    /// Which map this entry came from: `port` or `generic`
    pub list: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceRow {
    pub label: String,
    /// Raw instantiated name: `lib.ent` for direct entity instantiation
    /// (architecture suffix stripped), bare name for component form
    pub target: String,
    pub kind: InstanceKind,
    pub file: String,
    pub line: usize,
    pub in_arch: String,
    pub associations: Vec<AssociationRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UseClauseRow {
    /// Raw selected name; multi-item clauses are expanded one row per item
    pub target: String,
    pub file: String,
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryClauseRow {
    pub name: String,
    pub file: String,
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextClauseRow {
    pub target: String,
    pub file: String,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockEdge {
    Rising,
    Falling,
    #[serde(rename = "")]
    #[default]
    None,
}

impl ClockEdge {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClockEdge::Rising => "rising",
            ClockEdge::Falling => "falling",
            ClockEdge::None => "",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetKind {
    /// Reset tested before the clock-edge branch
    Async,
    /// Reset tested inside the clocked branch
    Sync,
    #[serde(rename = "")]
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitKind {
    On,
    Until,
    For,
    #[default]
    Plain,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitRow {
    pub kind: WaitKind,
    pub line: usize,
}

/// A process statement with its classification.
///
/// Sequential iff the body contains a clock-edge test; then `clock_signal`
/// and `clock_edge` are set. Combinational processes have an empty
/// `clock_signal`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessRow {
    pub label: String,
    pub file: String,
    pub line: usize,
    pub in_arch: String,
    pub is_sequential: bool,
    pub is_combinational: bool,
    pub clock_signal: String,
    pub clock_edge: ClockEdge,
    pub reset_signal: String,
    pub reset_kind: ResetKind,
    pub sensitivity: Vec<String>,
    /// `process (all)` form
    pub sensitivity_all: bool,
    pub variables: Vec<String>,
    pub calls: Vec<String>,
    pub waits: Vec<WaitRow>,
    pub reads: Vec<String>,
    pub writes: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerateKind {
    #[default]
    For,
    If,
    Case,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateRow {
    pub label: String,
    pub kind: GenerateKind,
    pub file: String,
    pub line: usize,
    pub in_arch: String,
    /// Whether the generate form is statically analyzable (literal ranges,
    /// literal-only conditions)
    pub can_elaborate: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Enumeration,
    Array,
    Record,
    Access,
    File,
    Protected,
    Physical,
    Integer,
    #[default]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeRow {
    pub name: String,
    pub kind: TypeKind,
    pub file: String,
    pub line: usize,
    pub in_entity: String,
    pub in_arch: String,
    pub in_package: String,
    /// Enumeration literals, in declaration order
    pub literals: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubtypeRow {
    pub name: String,
    pub base_type: String,
    pub file: String,
    pub line: usize,
    pub in_arch: String,
    pub in_package: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionRow {
    pub name: String,
    /// `pure`, `impure`, or empty when unstated
    pub purity: String,
    pub return_type: String,
    pub has_body: bool,
    pub file: String,
    pub line: usize,
    pub in_arch: String,
    pub in_package: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcedureRow {
    pub name: String,
    pub has_body: bool,
    pub file: String,
    pub line: usize,
    pub in_arch: String,
    pub in_package: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstantRow {
    pub name: String,
    pub const_type: String,
    pub value: String,
    pub file: String,
    pub line: usize,
    pub in_entity: String,
    pub in_arch: String,
    pub in_package: String,
    pub in_process: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseRow {
    pub expression: String,
    /// Explicit choice texts, one per `when` alternative (without `others`)
    pub choices: Vec<String>,
    pub has_others: bool,
    /// True when the choice list provably covers the expression's value
    /// set (always true with `others`; computed against same-file
    /// enumeration types otherwise)
    pub is_complete: bool,
    pub file: String,
    pub line: usize,
    pub in_process: String,
    pub in_arch: String,
}

/// A block statement labeled `verification`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationBlockRow {
    pub label: String,
    pub file: String,
    pub line: usize,
    pub in_arch: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationTagRow {
    pub id: String,
    /// `entity:<name>` or `arch:<name>`
    pub scope: String,
    pub bindings: BTreeMap<String, String>,
    pub file: String,
    pub line: usize,
    pub in_arch: String,
    pub in_block: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationTagErrorRow {
    pub file: String,
    pub line: usize,
    pub message: String,
    pub raw: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeRow {
    /// entity | architecture | package | package_body | configuration |
    /// context | process | function | procedure | block | generate
    pub kind: String,
    pub name: String,
    pub parent: String,
    pub file: String,
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolDefRow {
    pub name: String,
    /// signal | constant | variable | type | subtype | function |
    /// procedure | component | alias | attribute | port | generic
    pub kind: String,
    pub scope: String,
    pub file: String,
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NameUseRow {
    pub name: String,
    /// read | write | call
    pub access: String,
    pub file: String,
    pub line: usize,
    pub in_process: String,
    pub in_arch: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    #[default]
    Use,
    Library,
    Instantiation,
    Component,
    Context,
    PackageInstantiation,
    ConfigurationSpecification,
    SubprogramInstantiation,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Use => "use",
            DependencyKind::Library => "library",
            DependencyKind::Instantiation => "instantiation",
            DependencyKind::Component => "component",
            DependencyKind::Context => "context",
            DependencyKind::PackageInstantiation => "package_instantiation",
            DependencyKind::ConfigurationSpecification => "configuration_specification",
            DependencyKind::SubprogramInstantiation => "subprogram_instantiation",
        }
    }
}

/// A name-based dependency of this file on some design unit.
///
/// `target` is the raw selected name from the source; `resolved` is
/// computed after indexing by symbol-table lookup plus the
/// standard-library rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyRow {
    pub file: String,
    pub target: String,
    pub kind: DependencyKind,
    pub line: usize,
    pub resolved: bool,
}

/// Per-architecture summary of sequential processes grouped by clock.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClockDomainRow {
    pub file: String,
    pub in_arch: String,
    pub clock_signal: String,
    pub clock_edge: ClockEdge,
    pub process_count: usize,
    pub reset_signals: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseErrorRow {
    pub file: String,
    pub line: usize,
    pub message: String,
}

impl FileFacts {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_round_trip() {
        for (text, dir) in [
            ("in", Direction::In),
            ("OUT", Direction::Out),
            ("InOut", Direction::Inout),
            ("buffer", Direction::Buffer),
            ("linkage", Direction::Linkage),
        ] {
            assert_eq!(Direction::parse(text), Some(dir));
        }
        assert_eq!(Direction::parse("sideways"), None);
        assert_eq!(
            serde_json::to_string(&Direction::Unspecified).unwrap(),
            "\"\""
        );
    }

    #[test]
    fn dependency_kind_wire_form() {
        assert_eq!(
            serde_json::to_string(&DependencyKind::PackageInstantiation).unwrap(),
            "\"package_instantiation\""
        );
        assert_eq!(
            serde_json::to_string(&DependencyKind::ConfigurationSpecification).unwrap(),
            "\"configuration_specification\""
        );
    }

    #[test]
    fn facts_serialize_round_trip() {
        let mut facts = FileFacts::new("a.vhd");
        facts.entities.push(EntityRow {
            name: "Top".into(),
            file: "a.vhd".into(),
            line: 3,
        });
        facts.dependencies.push(DependencyRow {
            file: "a.vhd".into(),
            target: "work.my_pkg.all".into(),
            kind: DependencyKind::Use,
            line: 1,
            resolved: false,
        });
        let json = serde_json::to_string(&facts).unwrap();
        let back: FileFacts = serde_json::from_str(&json).unwrap();
        assert_eq!(facts, back);
    }
}
