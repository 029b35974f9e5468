//! Library-qualified symbol table.
//!
//! Concurrent map from lowercased `<library>.<identifier>` to the symbols
//! declared under that name. Collisions are preserved, not overwritten:
//! two entities named `dup_ent` in library `work` both stay in the table,
//! which is what the duplicate-unit policy rules key on.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Kind of a design unit registered in the symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Entity,
    Package,
    Component,
    Architecture,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Entity => "entity",
            SymbolKind::Package => "package",
            SymbolKind::Component => "component",
            SymbolKind::Architecture => "architecture",
        }
    }
}

/// A design unit and where it was declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    /// Lowercased `<library>.<identifier>`
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub file: String,
    pub line: usize,
}

/// Concurrent symbol table, safe for parallel `add` during extraction and
/// concurrent reads afterwards.
#[derive(Debug, Default)]
pub struct SymbolTable {
    map: DashMap<String, Vec<Symbol>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a design unit under its library-qualified name.
    pub fn add(&self, library: &str, name: &str, kind: SymbolKind, file: &str, line: usize) {
        let qualified_name = qualify(library, name);
        let symbol = Symbol {
            qualified_name: qualified_name.clone(),
            kind,
            file: file.to_string(),
            line,
        };
        self.map.entry(qualified_name).or_default().push(symbol);
    }

    pub fn has(&self, qualified_name: &str) -> bool {
        self.map.contains_key(&qualified_name.to_ascii_lowercase())
    }

    /// All symbols registered under a qualified name (collisions included).
    pub fn get(&self, qualified_name: &str) -> Option<Vec<Symbol>> {
        self.map
            .get(&qualified_name.to_ascii_lowercase())
            .map(|entry| entry.value().clone())
    }

    /// Number of distinct qualified names.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Consistent copy of every symbol, sorted by (name, file, line) so the
    /// post-extraction phases see a deterministic view.
    pub fn snapshot(&self) -> Vec<Symbol> {
        let mut all: Vec<Symbol> = self
            .map
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| {
            (&a.qualified_name, &a.file, a.line).cmp(&(&b.qualified_name, &b.file, b.line))
        });
        all
    }
}

/// Build the lowercased qualified name for a unit.
pub fn qualify(library: &str, name: &str) -> String {
    format!(
        "{}.{}",
        library.to_ascii_lowercase(),
        name.to_ascii_lowercase()
    )
}

/// Well-known package name fragments that mark a reference as standard
/// library even without a leading `ieee.`/`std.` segment. Substring match,
/// so user symbols containing these fragments are also treated as resolved.
const STD_PACKAGE_FRAGMENTS: &[&str] = &[
    "std_logic_1164",
    "numeric_std",
    "textio",
    "math_real",
    "math_complex",
];

/// Whether a qualified reference points into the standard libraries.
/// Such references count as resolved without a symbol-table entry.
pub fn is_standard_library(target: &str) -> bool {
    let lower = target.to_ascii_lowercase();
    let first = lower.split('.').next().unwrap_or("");
    if first == "ieee" || first == "std" {
        return true;
    }
    STD_PACKAGE_FRAGMENTS
        .iter()
        .any(|fragment| lower.contains(fragment))
}

/// Rewrite a raw dependency target into a symbol-table key: lowercase,
/// `work` replaced by the file's library, trailing `.all` stripped, and
/// truncated to `<library>.<unit>`.
pub fn rewrite_target(target: &str, library: &str) -> String {
    let lower = target.to_ascii_lowercase();
    let mut segments: Vec<&str> = lower.split('.').filter(|s| !s.is_empty()).collect();
    if segments.last() == Some(&"all") {
        segments.pop();
    }
    match segments.as_slice() {
        [] => String::new(),
        [single] => qualify(library, single),
        [lib, unit, ..] => {
            if *lib == "work" {
                qualify(library, unit)
            } else {
                qualify(lib, unit)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_lowercase_with_one_dot() {
        let table = SymbolTable::new();
        table.add("Work", "Dut", SymbolKind::Entity, "dut.vhd", 1);
        assert!(table.has("work.dut"));
        assert!(table.has("WORK.DUT"));
        for symbol in table.snapshot() {
            assert_eq!(symbol.qualified_name, symbol.qualified_name.to_lowercase());
            assert_eq!(symbol.qualified_name.matches('.').count(), 1);
        }
    }

    #[test]
    fn collisions_are_preserved() {
        let table = SymbolTable::new();
        table.add("work", "dup_ent", SymbolKind::Entity, "a.vhd", 1);
        table.add("work", "dup_ent", SymbolKind::Entity, "b.vhd", 7);
        let symbols = table.get("work.dup_ent").unwrap();
        assert_eq!(symbols.len(), 2);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn different_libraries_do_not_collide() {
        let table = SymbolTable::new();
        table.add("lib_a", "dup_ent", SymbolKind::Entity, "a.vhd", 1);
        table.add("lib_b", "dup_ent", SymbolKind::Entity, "b.vhd", 1);
        assert_eq!(table.get("lib_a.dup_ent").unwrap().len(), 1);
        assert_eq!(table.get("lib_b.dup_ent").unwrap().len(), 1);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn standard_library_detection() {
        assert!(is_standard_library("ieee.std_logic_1164.all"));
        assert!(is_standard_library("std.textio.all"));
        assert!(is_standard_library("IEEE.Numeric_Std"));
        // substring rule also fires without a std prefix
        assert!(is_standard_library("mylib.textio_helpers"));
        assert!(!is_standard_library("work.my_pkg"));
    }

    #[test]
    fn rewrite_strips_all_and_rewrites_work() {
        assert_eq!(rewrite_target("work.my_pkg.all", "core"), "core.my_pkg");
        assert_eq!(rewrite_target("Other.Pkg", "core"), "other.pkg");
        assert_eq!(rewrite_target("my_comp", "core"), "core.my_comp");
        assert_eq!(rewrite_target("work.p.item", "core"), "core.p");
    }

    #[test]
    fn snapshot_is_sorted() {
        let table = SymbolTable::new();
        table.add("work", "zeta", SymbolKind::Entity, "z.vhd", 1);
        table.add("work", "alpha", SymbolKind::Package, "a.vhd", 1);
        let snapshot = table.snapshot();
        assert_eq!(snapshot[0].qualified_name, "work.alpha");
        assert_eq!(snapshot[1].qualified_name, "work.zeta");
    }
}
