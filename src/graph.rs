//! File-level dependents graph.
//!
//! Reverse edges of the dependency graph: an edge `g -> f` means a change
//! in `g` impacts `f`. Built after extraction by rewriting each dependency
//! target to the depending file's library and looking it up in the symbol
//! table.

use crate::facts::FileFacts;
use crate::symbol::{SymbolTable, rewrite_target};
use std::collections::{BTreeMap, BTreeSet};

/// Reverse-dependency DAG over files.
#[derive(Debug, Clone, Default)]
pub struct DependentsGraph {
    /// defining file -> files that depend on it
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependentsGraph {
    /// Build the graph from extracted facts. `library_of` maps each file
    /// to its resolved library for the `work.X` rewrite.
    pub fn build(
        facts: &[FileFacts],
        library_of: &BTreeMap<String, String>,
        symbols: &SymbolTable,
    ) -> Self {
        let mut edges: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for file_facts in facts {
            let library = library_of
                .get(&file_facts.path)
                .map(String::as_str)
                .unwrap_or("work");
            for dependency in &file_facts.dependencies {
                let key = rewrite_target(&dependency.target, library);
                let Some(found) = symbols.get(&key) else {
                    continue;
                };
                for symbol in found {
                    if symbol.file != file_facts.path {
                        edges
                            .entry(symbol.file.clone())
                            .or_default()
                            .insert(file_facts.path.clone());
                    }
                }
            }
        }
        Self { edges }
    }

    /// Direct dependents of a file, sorted.
    pub fn dependents_of(&self, file: &str) -> Vec<String> {
        self.edges
            .get(file)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Transitive dependent closure as level-by-level BFS from `root`.
    /// Each level is sorted; a file appears in at most one level and the
    /// root itself is excluded.
    pub fn compute_impact(&self, root: &str) -> Vec<Vec<String>> {
        let mut visited: BTreeSet<String> = BTreeSet::new();
        visited.insert(root.to_string());
        let mut levels = Vec::new();
        let mut frontier = vec![root.to_string()];

        while !frontier.is_empty() {
            let mut next: BTreeSet<String> = BTreeSet::new();
            for file in &frontier {
                if let Some(dependents) = self.edges.get(file) {
                    for dependent in dependents {
                        if !visited.contains(dependent) {
                            next.insert(dependent.clone());
                        }
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            visited.extend(next.iter().cloned());
            let level: Vec<String> = next.into_iter().collect();
            frontier = level.clone();
            levels.push(level);
        }
        levels
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Number of files with at least one dependent.
    pub fn len(&self) -> usize {
        self.edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::{DependencyKind, DependencyRow};
    use crate::symbol::SymbolKind;

    fn facts_with_dep(path: &str, target: &str) -> FileFacts {
        let mut facts = FileFacts::new(path);
        facts.dependencies.push(DependencyRow {
            file: path.into(),
            target: target.into(),
            kind: DependencyKind::Use,
            line: 1,
            resolved: false,
        });
        facts
    }

    fn work_libraries(paths: &[&str]) -> BTreeMap<String, String> {
        paths
            .iter()
            .map(|p| (p.to_string(), "work".to_string()))
            .collect()
    }

    #[test]
    fn fan_out_lands_in_one_level() {
        let symbols = SymbolTable::new();
        symbols.add("work", "my_pkg", SymbolKind::Package, "pkg.vhd", 1);
        let facts = vec![
            FileFacts::new("pkg.vhd"),
            facts_with_dep("b.vhd", "work.my_pkg"),
            facts_with_dep("c.vhd", "work.my_pkg.all"),
        ];
        let graph = DependentsGraph::build(
            &facts,
            &work_libraries(&["pkg.vhd", "b.vhd", "c.vhd"]),
            &symbols,
        );
        let levels = graph.compute_impact("pkg.vhd");
        assert_eq!(levels, vec![vec!["b.vhd".to_string(), "c.vhd".to_string()]]);
    }

    #[test]
    fn chain_yields_two_levels() {
        let symbols = SymbolTable::new();
        symbols.add("work", "a_pkg", SymbolKind::Package, "a.vhd", 1);
        symbols.add("work", "b_pkg", SymbolKind::Package, "b.vhd", 1);
        let facts = vec![
            FileFacts::new("a.vhd"),
            facts_with_dep("b.vhd", "work.a_pkg"),
            facts_with_dep("c.vhd", "work.b_pkg"),
        ];
        let graph =
            DependentsGraph::build(&facts, &work_libraries(&["a.vhd", "b.vhd", "c.vhd"]), &symbols);
        let levels = graph.compute_impact("a.vhd");
        assert_eq!(
            levels,
            vec![vec!["b.vhd".to_string()], vec!["c.vhd".to_string()]]
        );
    }

    #[test]
    fn self_dependency_adds_no_edge() {
        let symbols = SymbolTable::new();
        symbols.add("work", "p", SymbolKind::Package, "a.vhd", 1);
        let facts = vec![facts_with_dep("a.vhd", "work.p")];
        let graph = DependentsGraph::build(&facts, &work_libraries(&["a.vhd"]), &symbols);
        assert!(graph.is_empty());
        assert!(graph.compute_impact("a.vhd").is_empty());
    }

    #[test]
    fn diamond_visits_each_file_once() {
        let symbols = SymbolTable::new();
        symbols.add("work", "a_pkg", SymbolKind::Package, "a.vhd", 1);
        symbols.add("work", "b_pkg", SymbolKind::Package, "b.vhd", 1);
        symbols.add("work", "c_pkg", SymbolKind::Package, "c.vhd", 1);
        let mut d = facts_with_dep("d.vhd", "work.b_pkg");
        d.dependencies.push(DependencyRow {
            file: "d.vhd".into(),
            target: "work.c_pkg".into(),
            kind: DependencyKind::Use,
            line: 2,
            resolved: false,
        });
        let facts = vec![
            FileFacts::new("a.vhd"),
            facts_with_dep("b.vhd", "work.a_pkg"),
            facts_with_dep("c.vhd", "work.a_pkg"),
            d,
        ];
        let graph = DependentsGraph::build(
            &facts,
            &work_libraries(&["a.vhd", "b.vhd", "c.vhd", "d.vhd"]),
            &symbols,
        );
        let levels = graph.compute_impact("a.vhd");
        assert_eq!(
            levels,
            vec![
                vec!["b.vhd".to_string(), "c.vhd".to_string()],
                vec!["d.vhd".to_string()]
            ]
        );
    }

    #[test]
    fn cross_library_rewrite_respects_file_library() {
        let symbols = SymbolTable::new();
        symbols.add("lib_a", "p", SymbolKind::Package, "a.vhd", 1);
        // b.vhd lives in lib_a, so its `work.p` resolves into lib_a
        let facts = vec![FileFacts::new("a.vhd"), facts_with_dep("b.vhd", "work.p")];
        let libraries: BTreeMap<String, String> = [
            ("a.vhd".to_string(), "lib_a".to_string()),
            ("b.vhd".to_string(), "lib_a".to_string()),
        ]
        .into();
        let graph = DependentsGraph::build(&facts, &libraries, &symbols);
        assert_eq!(graph.dependents_of("a.vhd"), vec!["b.vhd".to_string()]);
    }
}
