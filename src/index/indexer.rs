//! The analysis drive loop.
//!
//! Resolve libraries, hash contents, extract facts on a bounded worker
//! pool (cache-aware), register symbols, resolve dependencies, build the
//! tables and dependents graph, validate the policy input, and hand off to
//! the evaluator unless the policy cache already has the answer.
//!
//! Ordering: all extraction completes before dependency resolution; all
//! resolution completes before tables are materialized; tables are built
//! before schema validation; validation succeeds before the evaluator
//! runs.

use crate::cache::{
    FactsCache, PolicyCache, PolicyCacheEntry, POLICY_CACHE_VERSION, ToolVersions,
    facts_set_hash, policy_cache_key, policy_rules_hash, sha256_hex,
};
use crate::config::Config;
use crate::error::{AnalyzeResult, FileError, FileErrorKind};
use crate::extract::{FactsExtractor, TreeSitterExtractor};
use crate::facts::{DependencyKind, FileFacts};
use crate::graph::DependentsGraph;
use crate::policy::{
    EvaluatorReport, PolicyEvaluator, SubprocessEvaluator, build_policy_input, validate,
};
use crate::project::{self, ResolvedProject};
use crate::symbol::{SymbolKind, SymbolTable, is_standard_library, rewrite_target};
use crate::tables::FactTables;
use crate::timing::TimingRecorder;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable pointing at the policy rule sources.
pub const POLICY_RULES_ENV: &str = "VHDL_POLICY_RULES";

/// Outcome of one analysis run.
#[derive(Debug)]
pub struct AnalysisResult {
    pub report: EvaluatorReport,
    pub file_errors: Vec<FileError>,
    pub stats: IndexStats,
    /// The evaluator result came from the policy cache
    pub from_cache: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexStats {
    pub files: usize,
    pub extracted: usize,
    pub cache_hits: usize,
    pub symbols: usize,
    pub resolved_dependencies: usize,
    pub unresolved_dependencies: usize,
}

/// Everything the extraction phase produces, before the policy stages.
struct Gathered {
    facts: Vec<FileFacts>,
    symbols: SymbolTable,
    file_errors: Vec<FileError>,
    libraries: BTreeMap<String, String>,
    third_party: BTreeSet<String>,
    library_names: BTreeSet<String>,
    content_hashes: BTreeMap<String, String>,
    stats: IndexStats,
}

pub struct Indexer {
    config: Config,
    root: PathBuf,
    extractor: Arc<dyn FactsExtractor>,
    evaluator: Arc<dyn PolicyEvaluator>,
    versions: ToolVersions,
    timing: TimingRecorder,
}

impl Indexer {
    pub fn new(config: Config, root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            root: root.into(),
            extractor: Arc::new(TreeSitterExtractor::new()),
            evaluator: Arc::new(SubprocessEvaluator::from_env()),
            versions: ToolVersions::default(),
            timing: TimingRecorder::disabled(),
        }
    }

    /// Substitute the extraction capability (tests use counting doubles).
    pub fn with_extractor(mut self, extractor: Arc<dyn FactsExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_versions(mut self, versions: ToolVersions) -> Self {
        self.versions = versions;
        self
    }

    pub fn with_timing(mut self, timing: TimingRecorder) -> Self {
        self.timing = timing;
        self
    }

    fn cache_dir(&self) -> PathBuf {
        let dir = &self.config.analysis.cache.dir;
        if dir.is_absolute() {
            dir.clone()
        } else {
            self.root.join(dir)
        }
    }

    fn facts_cache(&self) -> Option<FactsCache> {
        self.config
            .analysis
            .cache
            .enabled
            .then(|| FactsCache::open(self.cache_dir()))
    }

    /// Run the whole pipeline and return the combined result.
    pub fn run(&self) -> AnalyzeResult<AnalysisResult> {
        let total = self.timing.start_stage("total");

        let scan = self.timing.start_stage("scan");
        let project = project::resolve(&self.config, &self.root);
        self.timing.finish(scan, "ok");

        let facts_cache = self.facts_cache();
        let mut gathered = self.gather(&project, facts_cache.as_ref());

        let resolve_span = self.timing.start_stage("resolve");
        self.resolve_dependencies(&mut gathered);
        self.timing.finish(resolve_span, "ok");

        let tables_span = self.timing.start_stage("tables");
        let mut tables = FactTables::build(
            &gathered.facts,
            &gathered.libraries,
            &gathered.third_party,
        );
        tables.sort();
        let graph = DependentsGraph::build(&gathered.facts, &gathered.libraries, &gathered.symbols);
        tracing::debug!(
            target: "indexer",
            "dependents graph: {} files with dependents",
            graph.len()
        );
        self.timing.finish(tables_span, "ok");

        let input = build_policy_input(&tables, gathered.symbols.snapshot(), &self.config);

        let schema_span = self.timing.start_stage("schema");
        if let Err(e) = validate(&input) {
            self.timing.finish(schema_span, "error");
            self.timing.finish(total, "error");
            return Err(e.into());
        }
        self.timing.finish(schema_span, "ok");

        let policy_span = self.timing.start_stage("policy");
        let facts_hash = facts_set_hash(&gathered.content_hashes);
        let policy_outcome = self.run_policy(&input, &tables, &facts_hash);
        let (report, from_cache) = match policy_outcome {
            Ok(result) => result,
            Err(e) => {
                self.timing.finish(policy_span, "error");
                self.timing.finish(total, "error");
                return Err(e);
            }
        };
        self.timing.finish(policy_span, if from_cache { "cached" } else { "ok" });

        // End-of-run persistence; cache failures degrade, never abort
        if let Some(cache) = &facts_cache {
            let keep: HashSet<String> = tables.file_set().into_iter().collect();
            cache.retain_files(&keep);
            if let Err(e) = cache.flush() {
                tracing::warn!(target: "cache", "cannot write facts index: {e}");
            }
            if let Err(e) =
                crate::cache::write_json_atomic(&self.cache_dir().join("fact_tables.json"), &tables)
            {
                tracing::debug!(target: "cache", "cannot write fact tables snapshot: {e}");
            }
        }

        self.timing.finish(total, "ok");
        Ok(AnalysisResult {
            report,
            file_errors: gathered.file_errors,
            stats: gathered.stats,
            from_cache,
        })
    }

    /// Extraction-only entry point: the dependents graph for impact
    /// queries.
    pub fn dependents_graph(&self) -> (DependentsGraph, Vec<FileError>) {
        let project = project::resolve(&self.config, &self.root);
        let facts_cache = self.facts_cache();
        let gathered = self.gather(&project, facts_cache.as_ref());
        let graph = DependentsGraph::build(&gathered.facts, &gathered.libraries, &gathered.symbols);
        (graph, gathered.file_errors)
    }

    /// Hash, cache-consult, extract, and register symbols for every file.
    fn gather(&self, project: &ResolvedProject, facts_cache: Option<&FactsCache>) -> Gathered {
        let mut libraries: BTreeMap<String, String> = BTreeMap::new();
        let mut third_party: BTreeSet<String> = BTreeSet::new();
        for (path, assignment) in &project.assignments {
            let key = path.to_string_lossy().into_owned();
            libraries.insert(key.clone(), assignment.library.clone());
            if assignment.is_third_party {
                third_party.insert(key);
            }
        }
        let library_names: BTreeSet<String> =
            project.libraries.iter().map(|l| l.name.clone()).collect();

        let files = project.files();
        let mut stats = IndexStats {
            files: files.len(),
            ..Default::default()
        };
        let mut file_errors: Vec<FileError> = Vec::new();

        // Content hashes, in parallel
        let hash_span = self.timing.start_stage("hash");
        let hashed: Vec<Result<(PathBuf, String), FileError>> = self.in_pool(|| {
            files
                .par_iter()
                .map(|path| match std::fs::read(path) {
                    Ok(bytes) => Ok((path.clone(), sha256_hex(&bytes))),
                    Err(e) => Err(FileError {
                        file: path.to_string_lossy().into_owned(),
                        kind: FileErrorKind::Read,
                        message: e.to_string(),
                    }),
                })
                .collect()
        });
        self.timing.finish(hash_span, "ok");

        let mut work: Vec<(PathBuf, String, String)> = Vec::new();
        let mut content_hashes: BTreeMap<String, String> = BTreeMap::new();
        for item in hashed {
            match item {
                Ok((path, hash)) => {
                    let key = path.to_string_lossy().into_owned();
                    let library = libraries.get(&key).cloned().unwrap_or_else(|| "work".into());
                    content_hashes.insert(key, hash.clone());
                    work.push((path, hash, library));
                }
                Err(e) => file_errors.push(e),
            }
        }

        // Cache-aware extraction on the bounded pool; symbol registration
        // happens inside the worker as each file completes
        let symbols = SymbolTable::new();
        let extract_span = self.timing.start_stage("extract");
        let outcomes: Vec<Result<(FileFacts, bool), FileError>> = self.in_pool(|| {
            work.par_iter()
                .map(|(path, hash, library)| {
                    let key = path.to_string_lossy().into_owned();
                    let span = self.timing.start_file("extract", &key);
                    if let Some(cache) = facts_cache {
                        if let Some(facts) = cache.get(&key, hash, &self.versions) {
                            register_symbols(&facts, library, &symbols);
                            self.timing.finish(span, "cached");
                            return Ok((facts, true));
                        }
                    }
                    match self.extractor.extract(path) {
                        Ok(facts) => {
                            if let Some(cache) = facts_cache {
                                if let Err(e) = cache.put(&key, hash, &self.versions, &facts) {
                                    tracing::warn!(target: "cache", "cannot cache facts: {e}");
                                }
                            }
                            register_symbols(&facts, library, &symbols);
                            self.timing.finish(span, "ok");
                            Ok((facts, false))
                        }
                        Err(e) => {
                            self.timing.finish(span, "error");
                            Err(FileError {
                                file: key,
                                kind: FileErrorKind::Read,
                                message: e.to_string(),
                            })
                        }
                    }
                })
                .collect()
        });
        self.timing.finish(extract_span, "ok");

        let mut facts: Vec<FileFacts> = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok((file_facts, cached)) => {
                    if cached {
                        stats.cache_hits += 1;
                    } else {
                        stats.extracted += 1;
                    }
                    for parse_error in &file_facts.parse_errors {
                        file_errors.push(FileError {
                            file: parse_error.file.clone(),
                            kind: FileErrorKind::Parse,
                            message: parse_error.message.clone(),
                        });
                    }
                    facts.push(file_facts);
                }
                Err(e) => file_errors.push(e),
            }
        }
        facts.sort_by(|a, b| a.path.cmp(&b.path));
        stats.symbols = symbols.len();

        Gathered {
            facts,
            symbols,
            file_errors,
            libraries,
            third_party,
            library_names,
            content_hashes,
            stats,
        }
    }

    /// Compute `resolved` on every dependency row. Runs strictly after all
    /// extraction has completed.
    fn resolve_dependencies(&self, gathered: &mut Gathered) {
        let mut resolved = 0usize;
        let mut unresolved = 0usize;
        for facts in &mut gathered.facts {
            let library = gathered
                .libraries
                .get(&facts.path)
                .map(String::as_str)
                .unwrap_or("work");
            for dependency in &mut facts.dependencies {
                dependency.resolved = match dependency.kind {
                    DependencyKind::Library => {
                        let name = dependency.target.to_ascii_lowercase();
                        name == "work"
                            || gathered.library_names.contains(&name)
                            || is_standard_library(&dependency.target)
                    }
                    _ => {
                        is_standard_library(&dependency.target)
                            || gathered
                                .symbols
                                .has(&rewrite_target(&dependency.target, library))
                    }
                };
                if dependency.resolved {
                    resolved += 1;
                } else {
                    unresolved += 1;
                }
            }
        }
        gathered.stats.resolved_dependencies = resolved;
        gathered.stats.unresolved_dependencies = unresolved;
    }

    /// Policy cache consult and, on miss, the evaluator subprocess.
    fn run_policy(
        &self,
        input: &crate::policy::PolicyInput,
        tables: &FactTables,
        facts_hash: &str,
    ) -> AnalyzeResult<(EvaluatorReport, bool)> {
        let rules_dir = std::env::var_os(POLICY_RULES_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| self.root.join("policy").join("rules"));
        let rules_hash = policy_rules_hash(&rules_dir)?;

        let third_party_files: Vec<String> = tables
            .files
            .iter()
            .filter(|f| f.is_third_party)
            .map(|f| f.path.clone())
            .collect();
        let key = policy_cache_key(
            self.config.standard.as_str(),
            &self.config.lint,
            &third_party_files,
            &rules_hash,
        );
        let files: Vec<String> = tables.files.iter().map(|f| f.path.clone()).collect();

        let cache_enabled = self.config.analysis.cache.enabled;
        let policy_cache = PolicyCache::at(&self.cache_dir());
        if cache_enabled {
            if let Some(entry) = policy_cache.load() {
                if PolicyCache::is_valid(&entry, &key, facts_hash, &files) {
                    tracing::debug!(target: "cache", "policy cache hit");
                    return Ok((entry.result, true));
                }
                tracing::debug!(target: "cache", "policy cache stale, re-evaluating");
            }
        }

        let report = self.evaluator.evaluate(input)?;
        if cache_enabled {
            let entry = PolicyCacheEntry {
                version: POLICY_CACHE_VERSION,
                key,
                facts_hash: facts_hash.to_string(),
                files,
                result: report.clone(),
            };
            if let Err(e) = policy_cache.save(&entry) {
                tracing::warn!(target: "cache", "cannot write policy cache: {e}");
            }
        }
        Ok((report, false))
    }

    /// Run a closure on the bounded worker pool
    /// (`min(maxParallelFiles, numCPU)` threads).
    fn in_pool<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        let threads = self.config.effective_parallelism();
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => pool.install(op),
            Err(e) => {
                tracing::warn!(target: "indexer", "cannot build worker pool: {e}");
                op()
            }
        }
    }
}

/// Register a file's exported design units under its resolved library.
fn register_symbols(facts: &FileFacts, library: &str, symbols: &SymbolTable) {
    for entity in &facts.entities {
        symbols.add(library, &entity.name, SymbolKind::Entity, &facts.path, entity.line);
    }
    for package in facts.packages.iter().filter(|p| !p.is_body) {
        symbols.add(
            library,
            &package.name,
            SymbolKind::Package,
            &facts.path,
            package.line,
        );
    }
    for component in &facts.components {
        symbols.add(
            library,
            &component.name,
            SymbolKind::Component,
            &facts.path,
            component.line,
        );
    }
    for architecture in &facts.architectures {
        symbols.add(
            library,
            &architecture.name,
            SymbolKind::Architecture,
            &facts.path,
            architecture.line,
        );
    }
}

/// Clear both cache levels under the configured cache directory.
pub fn clear_caches(config: &Config, root: &Path) -> std::io::Result<()> {
    let dir = if config.analysis.cache.dir.is_absolute() {
        config.analysis.cache.dir.clone()
    } else {
        root.join(&config.analysis.cache.dir)
    };
    PolicyCache::at(&dir).clear()?;
    let index = dir.join("index.json");
    if index.exists() {
        std::fs::remove_file(index)?;
    }
    let facts = dir.join("facts");
    if facts.is_dir() {
        std::fs::remove_dir_all(facts)?;
    }
    let tables = dir.join("fact_tables.json");
    if tables.exists() {
        std::fs::remove_file(tables)?;
    }
    Ok(())
}
