use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use vhdlint::config::Config;
use vhdlint::index::{Indexer, clear_caches};
use vhdlint::policy::SubprocessEvaluator;
use vhdlint::timing::TimingRecorder;

#[derive(Parser)]
#[command(name = "vhdlint")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Static analysis for VHDL projects")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a project and report policy violations
    Analyze {
        /// Project root (defaults to the current directory)
        path: Option<PathBuf>,

        /// Use a specific configuration file instead of the search order
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write a JSONL timing log to this path
        #[arg(long)]
        timing: Option<PathBuf>,

        /// Worker pool size (overrides analysis.maxParallelFiles)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Disable both cache levels for this run
        #[arg(long)]
        no_cache: bool,
    },

    /// Show which files are impacted by a change to one file
    Impact {
        /// The changed file
        file: PathBuf,

        /// Project root (defaults to the current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Print the effective configuration as JSON
    Config {
        /// Project root (defaults to the current directory)
        path: Option<PathBuf>,
    },

    /// Write a default vhdl_lint.json
    Init {
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove the facts cache and the policy cache
    Clear {
        /// Project root (defaults to the current directory)
        path: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    vhdlint::logging::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            path,
            config,
            timing,
            threads,
            no_cache,
        } => {
            let root = root_dir(path);
            let mut config = match config {
                Some(file) => Config::load_from(&file).unwrap_or_else(|e| {
                    tracing::warn!(target: "config", "invalid configuration, using defaults: {e}");
                    Config::default()
                }),
                None => Config::load_or_default(&root),
            };
            if let Some(threads) = threads {
                config.analysis.max_parallel_files = threads;
            }
            if no_cache {
                config.analysis.cache.enabled = false;
            }

            let recorder = match timing {
                Some(path) => TimingRecorder::to_path(&path)
                    .with_context(|| format!("cannot open timing log {}", path.display()))?,
                None => TimingRecorder::from_env(),
            };

            let result = Indexer::new(config, &root)
                .with_evaluator(Arc::new(SubprocessEvaluator::from_env()))
                .with_timing(recorder)
                .run()?;

            for error in &result.file_errors {
                eprintln!("{}: {:?}: {}", error.file, error.kind, error.message);
            }
            for violation in &result.report.violations {
                println!(
                    "{}:{}: {} [{}] {}",
                    violation.file,
                    violation.line,
                    violation.severity,
                    violation.rule,
                    violation.message
                );
            }
            let summary = &result.report.summary;
            eprintln!(
                "{} violations ({} errors, {} warnings), {} files ({} extracted, {} cached){}",
                summary.total_violations,
                summary.errors,
                summary.warnings,
                result.stats.files,
                result.stats.extracted,
                result.stats.cache_hits,
                if result.from_cache { " [policy cache]" } else { "" }
            );
        }

        Commands::Impact { file, path } => {
            let root = root_dir(path);
            let config = Config::load_or_default(&root);
            let indexer = Indexer::new(config, &root);
            let (graph, errors) = indexer.dependents_graph();
            for error in &errors {
                eprintln!("{}: {:?}: {}", error.file, error.kind, error.message);
            }
            let target = if file.is_absolute() {
                file
            } else {
                root.join(file)
            };
            let levels = graph.compute_impact(&target.to_string_lossy());
            if levels.is_empty() {
                println!("no dependents");
            }
            for (depth, level) in levels.iter().enumerate() {
                for file in level {
                    println!("{}\t{}", depth + 1, file);
                }
            }
        }

        Commands::Cache {
            action: CacheAction::Clear { path },
        } => {
            let root = root_dir(path);
            let config = Config::load_or_default(&root);
            clear_caches(&config, &root).context("cannot clear caches")?;
            println!("caches cleared");
        }

        Commands::Config { path } => {
            let root = root_dir(path);
            let config = Config::load_or_default(&root);
            let json = serde_json::to_string_pretty(&config)?;
            println!("{json}");
        }

        Commands::Init { force } => {
            let root = root_dir(None);
            match Config::init_config_file(&root, force) {
                Ok(path) => println!("created configuration at {}", path.display()),
                Err(e) => anyhow::bail!("{e}"),
            }
        }
    }
    Ok(())
}

fn root_dir(path: Option<PathBuf>) -> PathBuf {
    path.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}
