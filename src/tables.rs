//! Relational projection of per-file facts.
//!
//! All `FileFacts` flatten into one set of typed row tables. The tables
//! are a lossless rearrangement: filtering by the full file set is the
//! identity (up to row order), and deltas diff whole rows by tuple
//! equality.

use crate::facts::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// One row per analyzed file, carrying its resolved library and
/// third-party flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileRow {
    pub path: String,
    pub library: String,
    pub is_third_party: bool,
}

/// Passes the full `field: RowType` table list to a callback macro. The
/// `files` table is kept out of the list: its rows key on `path`, not
/// `file`, and stay sorted by path.
macro_rules! fact_table_list {
    ($cb:ident) => {
        $cb! {
            entities: EntityRow,
            architectures: ArchitectureRow,
            packages: PackageRow,
            configurations: ConfigurationRow,
            components: ComponentRow,
            signals: SignalRow,
            ports: PortRow,
            generics: GenericRow,
            instances: InstanceRow,
            use_clauses: UseClauseRow,
            library_clauses: LibraryClauseRow,
            context_clauses: ContextClauseRow,
            processes: ProcessRow,
            generates: GenerateRow,
            types: TypeRow,
            subtypes: SubtypeRow,
            functions: FunctionRow,
            procedures: ProcedureRow,
            constants: ConstantRow,
            case_statements: CaseRow,
            verification_blocks: VerificationBlockRow,
            verification_tags: VerificationTagRow,
            verification_tag_errors: VerificationTagErrorRow,
            scopes: ScopeRow,
            symbol_defs: SymbolDefRow,
            name_uses: NameUseRow,
            dependencies: DependencyRow,
            clock_domains: ClockDomainRow,
            parse_errors: ParseErrorRow,
        }
    };
}

macro_rules! declare_tables {
    ($($field:ident : $row:ty),+ $(,)?) => {
        /// The flat relational view over every analyzed file.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct FactTables {
            /// Sorted by path
            pub files: Vec<FileRow>,
            $(pub $field: Vec<$row>,)+
        }
    };
}
fact_table_list!(declare_tables);

/// Row sets added and removed between two table snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TablesDelta {
    pub added: FactTables,
    pub removed: FactTables,
}

impl FactTables {
    /// Project a set of `FileFacts` plus the per-file library/third-party
    /// assignment into flat tables. `files` comes out sorted by path.
    pub fn build(
        facts: &[FileFacts],
        libraries: &BTreeMap<String, String>,
        third_party: &BTreeSet<String>,
    ) -> Self {
        let mut tables = FactTables::default();
        for file_facts in facts {
            macro_rules! extend_all {
                ($($field:ident : $row:ty),+ $(,)?) => {
                    $(tables.$field.extend(file_facts.$field.iter().cloned());)+
                };
            }
            fact_table_list!(extend_all);
            tables.files.push(FileRow {
                path: file_facts.path.clone(),
                library: libraries
                    .get(&file_facts.path)
                    .cloned()
                    .unwrap_or_else(|| "work".to_string()),
                is_third_party: third_party.contains(&file_facts.path),
            });
        }
        tables.files.sort_by(|a, b| a.path.cmp(&b.path));
        tables
    }

    /// Retain only rows belonging to the given files.
    pub fn filter_by_files(&self, keep: &BTreeSet<String>) -> Self {
        let mut out = FactTables::default();
        macro_rules! filter_all {
            ($($field:ident : $row:ty),+ $(,)?) => {
                $(out.$field = self
                    .$field
                    .iter()
                    .filter(|row| keep.contains(&row.file))
                    .cloned()
                    .collect();)+
            };
        }
        fact_table_list!(filter_all);
        out.files = self
            .files
            .iter()
            .filter(|row| keep.contains(&row.path))
            .cloned()
            .collect();
        out
    }

    /// Sort every table by its whole-row tuple so downstream hashes are
    /// stable. `files` stays sorted by path.
    pub fn sort(&mut self) {
        macro_rules! sort_all {
            ($($field:ident : $row:ty),+ $(,)?) => {
                $(self.$field.sort_by_cached_key(row_key);)+
            };
        }
        fact_table_list!(sort_all);
        self.files.sort_by(|a, b| a.path.cmp(&b.path));
    }

    /// Table-wise delta by whole-row tuple equality.
    pub fn delta(prev: &Self, next: &Self) -> TablesDelta {
        let mut added = FactTables::default();
        let mut removed = FactTables::default();
        macro_rules! diff_all {
            ($($field:ident : $row:ty),+ $(,)?) => {
                $({
                    let (a, r) = diff_rows(&prev.$field, &next.$field);
                    added.$field = a;
                    removed.$field = r;
                })+
            };
        }
        fact_table_list!(diff_all);
        let (files_added, files_removed) = diff_rows(&prev.files, &next.files);
        added.files = files_added;
        removed.files = files_removed;
        TablesDelta { added, removed }
    }

    /// All file paths present in the `files` table.
    pub fn file_set(&self) -> BTreeSet<String> {
        self.files.iter().map(|row| row.path.clone()).collect()
    }
}

/// A row's identity: the tuple of all its columns, via its canonical JSON
/// form.
fn row_key<T: Serialize>(row: &T) -> String {
    serde_json::to_string(row).expect("fact rows serialize to JSON")
}

fn diff_rows<T: Serialize + Clone>(prev: &[T], next: &[T]) -> (Vec<T>, Vec<T>) {
    let prev_keys: HashSet<String> = prev.iter().map(row_key).collect();
    let next_keys: HashSet<String> = next.iter().map(row_key).collect();
    let added = next
        .iter()
        .filter(|row| !prev_keys.contains(&row_key(*row)))
        .cloned()
        .collect();
    let removed = prev
        .iter()
        .filter(|row| !next_keys.contains(&row_key(*row)))
        .cloned()
        .collect();
    (added, removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts_for(path: &str, entity: &str) -> FileFacts {
        let mut facts = FileFacts::new(path);
        facts.entities.push(EntityRow {
            name: entity.into(),
            file: path.into(),
            line: 1,
        });
        facts.signals.push(SignalRow {
            name: format!("{entity}_sig"),
            file: path.into(),
            line: 5,
            ..Default::default()
        });
        facts
    }

    fn build_sample() -> FactTables {
        let facts = vec![facts_for("b.vhd", "beta"), facts_for("a.vhd", "alpha")];
        let libraries: BTreeMap<String, String> = [
            ("a.vhd".to_string(), "work".to_string()),
            ("b.vhd".to_string(), "lib_b".to_string()),
        ]
        .into();
        let third_party: BTreeSet<String> = ["b.vhd".to_string()].into();
        FactTables::build(&facts, &libraries, &third_party)
    }

    #[test]
    fn files_are_sorted_and_carry_library_info() {
        let tables = build_sample();
        assert_eq!(tables.files.len(), 2);
        assert_eq!(tables.files[0].path, "a.vhd");
        assert_eq!(tables.files[0].library, "work");
        assert!(!tables.files[0].is_third_party);
        assert_eq!(tables.files[1].library, "lib_b");
        assert!(tables.files[1].is_third_party);
    }

    #[test]
    fn filter_by_all_files_is_identity() {
        let mut tables = build_sample();
        tables.sort();
        let mut filtered = tables.filter_by_files(&tables.file_set());
        filtered.sort();
        assert_eq!(filtered, tables);
    }

    #[test]
    fn filter_drops_other_files_rows() {
        let tables = build_sample();
        let keep: BTreeSet<String> = ["a.vhd".to_string()].into();
        let filtered = tables.filter_by_files(&keep);
        assert_eq!(filtered.files.len(), 1);
        assert_eq!(filtered.entities.len(), 1);
        assert_eq!(filtered.entities[0].name, "alpha");
        assert_eq!(filtered.signals.len(), 1);
    }

    #[test]
    fn delta_of_identical_tables_is_empty() {
        let tables = build_sample();
        let delta = FactTables::delta(&tables, &tables);
        assert_eq!(delta.added, FactTables::default());
        assert_eq!(delta.removed, FactTables::default());
    }

    #[test]
    fn delta_sees_added_and_removed_rows() {
        let prev = build_sample();
        let mut next = prev.clone();
        next.entities.push(EntityRow {
            name: "gamma".into(),
            file: "a.vhd".into(),
            line: 9,
        });
        next.signals.retain(|s| s.name != "beta_sig");

        let delta = FactTables::delta(&prev, &next);
        assert_eq!(delta.added.entities.len(), 1);
        assert_eq!(delta.added.entities[0].name, "gamma");
        assert_eq!(delta.removed.signals.len(), 1);
        assert_eq!(delta.removed.signals[0].name, "beta_sig");

        // Added rows are disjoint from the previous snapshot
        for row in &delta.added.entities {
            assert!(!prev.entities.contains(row));
        }
    }
}
