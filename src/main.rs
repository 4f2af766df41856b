//! sflow-report: descriptive statistics for sampled sFlow CSV logs.
//!
//! Loads a headerless flow log, prints the top talkers, listeners and
//! destination ports, the TCP/UDP mix and the extrapolated traffic volume,
//! then draws the busiest communication pairs as a directed graph.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Loader    │────>│  Analyzer   │────>│   Export    │
//! │   (csv)     │     │  (metrics)  │     │ (text/json) │
//! └─────────────┘     └──────┬──────┘     └─────────────┘
//!                            │ top pairs
//!                     ┌──────▼──────┐     ┌─────────────┐
//!                     │    Graph    │────>│   Render    │
//!                     │ (petgraph)  │     │   (png)     │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! Running without arguments reads `Data_2.csv` and writes
//! `Network_Graph_Top5.png` in the working directory.

mod analyzer;
mod config;
mod error;
mod export;
mod graph;
mod loader;
mod record;
mod render;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::analyzer::{analyze_core_metrics, top_pairs, PairCount};
use crate::config::{Config, RenderConfig};
use crate::export::{
    core_metrics_text, pairs_text, Console, JsonReport, OutputFormat, VisualisationOutcome,
};
use crate::graph::{PairGraph, SpringLayout};
use crate::loader::{load_flow_table, LoadOptions};
use crate::render::GraphRenderer;

/// sflow-report: statistics and top-pair graph for sampled flow logs.
#[derive(Parser, Debug)]
#[command(name = "sflow-report")]
#[command(version = "0.1.0")]
#[command(about = "Summarize an sFlow CSV log and graph its top communication pairs")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Flow log to analyze (default: Data_2.csv).
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output PNG path (default: Network_Graph_Top5.png).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of entries in each ranking.
    #[arg(short = 'n', long)]
    top: Option<usize>,

    /// Report format: text, json.
    #[arg(short, long)]
    format: Option<OutputFormat>,

    /// Seed for the graph layout.
    #[arg(long)]
    seed: Option<u64>,

    /// Do not render the pair graph.
    #[arg(long)]
    no_graph: bool,

    /// Skip undecodable rows instead of aborting.
    #[arg(long)]
    skip_malformed: bool,

    /// Enable verbose logging (writes to stderr).
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a default configuration file.
    InitConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::InitConfig) = cli.command {
        print!("{}", Config::generate_default());
        return Ok(());
    }

    // Config problems are logged before the final verbosity is known.
    let config = tracing::subscriber::with_default(build_subscriber(cli.verbose), || {
        resolve_config(&cli)
    });
    init_logging(config.output.verbose)?;
    config.validate().context("Invalid configuration")?;

    debug!("Effective configuration: {:?}", config);
    run_report(&config)
}

/// Applies CLI overrides on top of the file configuration.
fn resolve_config(cli: &Cli) -> Config {
    let mut config = Config::load_or_default(cli.config.as_deref());

    if let Some(input) = &cli.input {
        config.input.path = input.clone();
    }
    if let Some(output) = &cli.output {
        config.render.path = output.clone();
    }
    if let Some(top) = cli.top {
        config.analysis.top_n = top;
    }
    if let Some(format) = cli.format {
        config.output.format = format;
    }
    if let Some(seed) = cli.seed {
        config.render.layout_seed = Some(seed);
    }
    if cli.no_graph {
        config.render.enabled = false;
    }
    if cli.skip_malformed {
        config.input.skip_malformed = true;
    }
    if cli.verbose {
        config.output.verbose = true;
    }

    config
}

fn build_subscriber(verbose: bool) -> impl tracing::Subscriber + Send + Sync + 'static {
    let log_level = if verbose { Level::DEBUG } else { Level::WARN };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish()
}

fn init_logging(verbose: bool) -> Result<()> {
    tracing::subscriber::set_global_default(build_subscriber(verbose))
        .context("Failed to set tracing subscriber")
}

fn run_report(config: &Config) -> Result<()> {
    let console = Console::new(config.output.format);
    let options = LoadOptions {
        skip_malformed: config.input.skip_malformed,
    };

    let Some(table) = load_flow_table(&config.input.path, options, &console)? else {
        info!("No input data, nothing to analyze");
        return Ok(());
    };

    if table.is_empty() {
        warn!("{} contains no flow records", config.input.path.display());
    }

    let top_n = config.analysis.top_n;
    let metrics = analyze_core_metrics(&table, top_n);
    console.section(&core_metrics_text(&metrics));

    let pairs = top_pairs(&table, top_n);
    console.section(&pairs_text(&pairs));

    let outcome = visualise_pairs(&pairs, top_n, &config.render, &console)?;

    if console.format() == OutputFormat::Json {
        let input = table.source().map(|p| p.display().to_string());
        let report = JsonReport::new(input, table.skipped_rows(), &metrics, &pairs, &outcome);
        println!("{}", report.to_json());
    }

    Ok(())
}

/// Builds, lays out and renders the pair graph.
///
/// A missing rendering capability is reported and skipped; write failures
/// propagate.
fn visualise_pairs(
    pairs: &[PairCount],
    top_n: usize,
    render_config: &RenderConfig,
    console: &Console,
) -> Result<VisualisationOutcome> {
    console.status("\nNetwork Visualisation Plot");

    if !render_config.enabled {
        console.status("Skipping visualisation: disabled by configuration");
        return Ok(VisualisationOutcome::Disabled);
    }

    let graph = PairGraph::from_pairs(pairs);
    if graph.is_empty() {
        let reason = "no communication pairs to draw".to_string();
        console.status(&format!("Skipping visualisation: {}", reason));
        return Ok(VisualisationOutcome::Skipped { reason });
    }

    let renderer = match GraphRenderer::probe(render_config) {
        Ok(renderer) => renderer,
        Err(e) if e.is_capability_missing() => {
            let reason = e.to_string();
            console.status(&format!("Skipping visualisation: {}", reason));
            console.status(
                "Install a TrueType font (e.g. `apt install fonts-dejavu-core`) \
                 or set render.font_path in the config file.",
            );
            return Ok(VisualisationOutcome::Skipped { reason });
        }
        Err(e) => return Err(e.into()),
    };
    debug!(
        "Rendering {} nodes and {} edges with font {}",
        graph.node_count(),
        graph.edge_count(),
        renderer.font_path().display()
    );

    let layout = SpringLayout {
        k: render_config.spring_k,
        iterations: render_config.layout_iterations,
        seed: render_config.layout_seed,
    }
    .compute(&graph);

    let title = format!("Top {} Communication Pairs Network Graph", top_n);
    let path = &render_config.path;
    renderer
        .render_to_file(&graph, &layout, &title, path)
        .context("Failed to save visualisation")?;

    console.status(&format!("Saved visualisation into '{}'", path.display()));
    Ok(VisualisationOutcome::Saved { path: path.clone() })
}
