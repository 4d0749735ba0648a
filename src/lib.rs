// src/lib.rs

pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod formula;
pub mod graph;
pub mod logging;
pub mod partition;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::FormulaCache;
use crate::cli::{CliArgs, Command};
use crate::config::{EngineConfig, default_config_path, load_and_validate, load_or_default};
use crate::engine::{CancelToken, RunStatus, Scheduler};
use crate::exec::CommandRunner;
use crate::formula::generate_molecule;
use crate::graph::{
    CriticalPath, Graph, NodeId, NodeSpec, compute_levels, critical_path, detect_cycle,
    max_parallelism, strongly_connected_cycles, topological_sort,
};
use crate::partition::{
    ModuleSuggestion, PartitionConstraints, PartitionOutcome, PartitionRequest, Partition,
    cut_value, find_optimal_cuts, multi_way_cut, suggest_modules,
};

/// High-level entry point used by `main.rs`.
///
/// Loads the config, dispatches the subcommand and prints its JSON result
/// on stdout.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = match &args.config {
        Some(path) => load_and_validate(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => load_or_default(default_config_path())?,
    };
    debug!(?cfg, "configuration loaded");

    match args.command {
        Command::Analyze { graph } => {
            let graph = read_graph(&graph)?;
            print_json(&analyze(&graph)?)
        }
        Command::Partition {
            graph,
            groups,
            constraints,
            terminals,
        } => {
            let out = partition(&cfg, &graph, groups, constraints.as_deref(), &terminals)?;
            print_json(&out)
        }
        Command::Run {
            graph,
            max_parallel,
            timeout_ms,
        } => run_graph(&cfg, &graph, max_parallel, timeout_ms).await,
        Command::Formula { file, vars } => {
            let vars: BTreeMap<String, String> = vars.into_iter().collect();
            let out = formula(&cfg, &file, &vars).await?;
            print_json(&out)
        }
    }
}

/// Output of `beadflow analyze`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutput {
    pub nodes: usize,
    pub edges: usize,
    pub has_cycle: bool,
    /// Closed walk through one cycle, if any.
    pub cycle_path: Vec<NodeId>,
    /// Every strongly connected group that forms a cycle.
    pub cycles: Vec<Vec<NodeId>>,
    /// The fields below are empty when the graph has a cycle.
    pub order: Vec<NodeId>,
    pub levels: Vec<Vec<NodeId>>,
    pub max_parallelism: usize,
    pub critical_path: CriticalPath,
}

/// Everything `beadflow analyze` reports about a graph.
pub fn analyze(graph: &Graph) -> crate::errors::Result<AnalysisOutput> {
    let report = detect_cycle(graph);
    let cycles = strongly_connected_cycles(graph);

    if report.has_cycle {
        warn!(cycle = ?report.cycle_path, "graph has a dependency cycle");
        return Ok(AnalysisOutput {
            nodes: graph.len(),
            edges: graph.edges().len(),
            has_cycle: true,
            cycle_path: report.cycle_path,
            cycles,
            order: Vec::new(),
            levels: Vec::new(),
            max_parallelism: 0,
            critical_path: critical_path(graph),
        });
    }

    Ok(AnalysisOutput {
        nodes: graph.len(),
        edges: graph.edges().len(),
        has_cycle: false,
        cycle_path: Vec::new(),
        cycles,
        order: topological_sort(graph)?,
        levels: compute_levels(graph)?,
        max_parallelism: max_parallelism(graph)?,
        critical_path: critical_path(graph),
    })
}

/// Output of `beadflow partition`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionOutput {
    pub partition: Partition,
    pub cut_value: f64,
    pub cut_edges: Vec<crate::partition::CutEdge>,
    pub modules: Vec<ModuleSuggestion>,
}

fn partition(
    cfg: &EngineConfig,
    path: &Path,
    groups: usize,
    constraints: Option<&Path>,
    terminals: &[String],
) -> Result<PartitionOutput> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading graph {}", path.display()))?;
    let opts = cfg.partition.spectral_options();

    // A request object carries its own edges, group count and constraints.
    let (graph, outcome) = if let Ok(request) = serde_json::from_str::<PartitionRequest>(&contents)
    {
        let graph = Graph::with_edges(request.graph.clone(), request.edges.clone())?;
        let outcome = crate::partition::partition_request(request, &opts)?;
        (graph, outcome)
    } else {
        let specs: Vec<NodeSpec> = serde_json::from_str(&contents)
            .with_context(|| format!("parsing graph {}", path.display()))?;
        let graph = Graph::from_specs(specs)?;

        let outcome = if terminals.is_empty() {
            let constraints = match constraints {
                Some(p) => {
                    let raw = fs::read_to_string(p)
                        .with_context(|| format!("reading constraints {}", p.display()))?;
                    serde_json::from_str::<PartitionConstraints>(&raw)
                        .with_context(|| format!("parsing constraints {}", p.display()))?
                }
                None => PartitionConstraints::default(),
            };
            find_optimal_cuts(&graph, groups, &constraints, &opts)?
        } else {
            let refs: Vec<&str> = terminals.iter().map(String::as_str).collect();
            let cut = multi_way_cut(&graph, &refs)?;
            PartitionOutcome {
                cut_value: cut_value(&cut.cut_edges),
                partition: cut.partition,
                cut_edges: cut.cut_edges,
            }
        };
        (graph, outcome)
    };

    info!(
        groups = outcome.partition.num_groups,
        cut_value = outcome.cut_value,
        "partition computed"
    );

    let modules = suggest_modules(&graph, &outcome);
    Ok(PartitionOutput {
        partition: outcome.partition,
        cut_value: outcome.cut_value,
        cut_edges: outcome.cut_edges,
        modules,
    })
}

async fn run_graph(
    cfg: &EngineConfig,
    path: &Path,
    max_parallel: Option<usize>,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let graph = read_graph(path)?;

    let mut options = cfg.scheduler.execution_options();
    if let Some(n) = max_parallel {
        options.max_parallel = n;
    }
    if let Some(ms) = timeout_ms {
        options.step_timeout = Some(std::time::Duration::from_millis(ms));
    }

    // Ctrl-C → cancel the run.
    let cancel = CancelToken::new();
    options.cancel = Some(cancel.clone());
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            cancel.cancel();
        });
    }

    let scheduler = Scheduler::new();
    let report = scheduler
        .execute(graph, CommandRunner::new(), options)
        .await?;
    print_json(&report)?;

    let report = report.into_result()?;
    match report.status {
        RunStatus::Completed => Ok(()),
        status => bail!("run finished with status {status:?}"),
    }
}

/// Output of `beadflow formula`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaOutput {
    pub formula: crate::formula::CookedFormula,
    pub molecule: crate::formula::Molecule,
    /// Bead ids in execution order.
    pub order: Vec<String>,
}

async fn formula(
    cfg: &EngineConfig,
    path: &Path,
    vars: &BTreeMap<String, String>,
) -> Result<FormulaOutput> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading formula {}", path.display()))?;

    let cache = FormulaCache::new(cfg.cache.capacity, cfg.cache.ttl);
    let cooked = cache.cook(&content, vars).await?;
    let molecule = generate_molecule(&cooked)?;
    if molecule.has_cycle {
        warn!(formula = %molecule.formula_name, "molecule has a dependency cycle");
    }

    let order = molecule
        .execution_order
        .iter()
        .filter_map(|&i| molecule.beads.get(i).map(|b| b.id.clone()))
        .collect();

    Ok(FormulaOutput {
        formula: (*cooked).clone(),
        molecule,
        order,
    })
}

fn read_graph(path: &Path) -> Result<Graph> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading graph {}", path.display()))?;
    let graph = Graph::from_json(&contents)
        .with_context(|| format!("loading graph {}", path.display()))?;
    Ok(graph)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
