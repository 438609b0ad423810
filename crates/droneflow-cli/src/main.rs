//! Droneflow command-line host
//!
//! Validates, analyzes and dry-runs workflow documents. `run` uses a
//! dispatcher that logs each command and answers immediately, so a mission
//! can be rehearsed without a drone attached.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use droneflow_engine::{
    validate_workflow, CallbackDispatcher, CriticalPath, DependencyGraph, EngineConfig, EngineError,
    ExecutionEngine, ExecutionGroup, ExecutionMode, ExecutionStats, RunReport, ValidationResult, WorkflowGraph,
};
use droneflow_nodes::builtin_registry;

/// Droneflow - visual workflow execution for drone missions
#[derive(Parser)]
#[command(name = "droneflow")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a workflow for structural and parameter errors
    Validate {
        /// Path to the workflow JSON document
        workflow_file: PathBuf,
    },

    /// Print execution levels, statistics and the critical path
    Analyze {
        /// Path to the workflow JSON document
        workflow_file: PathBuf,
    },

    /// Dry-run a workflow against a logging dispatcher
    Run {
        /// Path to the workflow JSON document
        workflow_file: PathBuf,

        /// Run level by level instead of walking from the start node
        #[arg(long)]
        parallel: bool,

        /// Engine configuration document
        #[arg(long, env = "DRONEFLOW_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Validate { workflow_file } => {
            let result = validate_file(&workflow_file).await?;
            print_validation(&result);
            if !result.valid {
                anyhow::bail!("workflow has {} error(s)", result.errors.len());
            }
        }
        Commands::Analyze { workflow_file } => {
            let analysis = analyze_file(&workflow_file).await?;
            print_analysis(&analysis);
        }
        Commands::Run {
            workflow_file,
            parallel,
            config,
        } => {
            let report = run_file(&workflow_file, parallel, config.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

async fn load_workflow(path: &Path) -> Result<WorkflowGraph> {
    WorkflowGraph::load(path)
        .await
        .with_context(|| format!("failed to load workflow file: {}", path.display()))
}

async fn validate_file(path: &Path) -> Result<ValidationResult> {
    let graph = load_workflow(path).await?;
    let registry = builtin_registry();
    Ok(validate_workflow(&graph, &registry))
}

fn print_validation(result: &ValidationResult) {
    for error in &result.errors {
        println!("error: {}", error.message);
    }
    for warning in &result.warnings {
        println!("warning: {}", warning.message);
    }
    for suggestion in &result.suggestions {
        println!("hint: {}", suggestion.message);
    }
    if result.valid {
        println!("Workflow is valid");
    }
}

/// What `analyze` reports for a workflow
struct Analysis {
    levels: Vec<ExecutionGroup>,
    stats: ExecutionStats,
    critical_path: CriticalPath,
}

async fn analyze_file(path: &Path) -> Result<Analysis> {
    let graph = load_workflow(path).await?;
    let deps = DependencyGraph::build(&graph.nodes, &graph.edges);
    if let Some(cycle) = deps.find_cycles().into_iter().next() {
        anyhow::bail!("cannot analyze workflow: circular dependency {}", cycle.join(" -> "));
    }

    Ok(Analysis {
        levels: deps.levels()?,
        stats: deps.stats()?,
        critical_path: deps.critical_path()?,
    })
}

fn print_analysis(analysis: &Analysis) {
    for group in &analysis.levels {
        println!("level {}: {}", group.level, group.node_ids().join(", "));
    }
    let stats = &analysis.stats;
    println!(
        "{} node(s), {} level(s), max parallelism {}, {:.2} node(s) per level",
        stats.total_nodes, stats.level_count, stats.max_parallelism, stats.avg_nodes_per_level
    );
    println!(
        "critical path ({}): {}",
        analysis.critical_path.length,
        analysis.critical_path.path.join(" -> ")
    );
}

/// Dispatcher that logs every command and acknowledges it
fn dry_run_dispatcher() -> CallbackDispatcher {
    CallbackDispatcher::new(|command, payload| async move {
        match &payload {
            Some(payload) => log::info!("[dry-run] {} {}", command, payload),
            None => log::info!("[dry-run] {}", command),
        }
        Ok::<_, EngineError>(serde_json::json!({"status": "ok", "command": command, "dryRun": true}))
    })
}

async fn run_file(path: &Path, parallel: bool, config_path: Option<&Path>) -> Result<RunReport> {
    let graph = load_workflow(path).await?;
    let mut config = match config_path {
        Some(p) => EngineConfig::load(p)
            .await
            .with_context(|| format!("failed to load config: {}", p.display()))?,
        None => EngineConfig::default(),
    };
    if parallel {
        config.execution_mode = ExecutionMode::Parallel;
    }

    let engine = Arc::new(ExecutionEngine::new(
        Arc::new(builtin_registry()),
        Arc::new(dry_run_dispatcher()),
        config,
    ));
    engine.set_workflow(graph)?;

    let validation = engine.validate()?;
    if !validation.valid {
        print_validation(&validation);
        anyhow::bail!("refusing to run an invalid workflow");
    }

    let watcher = {
        let engine = engine.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupt received, stopping workflow");
                engine.stop();
            }
        })
    };

    let outcome = engine.run_configured().await;
    watcher.abort();

    match outcome {
        Ok(report) => Ok(report),
        Err(err @ EngineError::Aborted { .. }) => {
            let stats = engine.error_stats();
            log::error!("{} ({} error(s) recorded)", err, stats.total_errors);
            Err(err.into())
        }
        Err(err) => Err(err).context("workflow run failed"),
    }
}
