//! Run inference on a network loaded from JSON.
//!
//! The input file holds a `network` and its junction tree (`topology`), see
//! `demos/data/` for samples.
//!
//! Run with:
//! ```bash
//! cargo run --example infer -- demos/data/asia.json -e xray=yes -e smoke=yes
//! cargo run --example infer -- demos/data/asia.json -e dysp=yes --event lung=yes --event bronc=yes
//! cargo run --example infer -- demos/data/chain.json --snapshot
//! ```

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use color_eyre::eyre::{eyre, WrapErr};
use indexmap::IndexMap;
use log::info;
use serde::Deserialize;

use lazyprop_rs::debug::show_potential;
use lazyprop_rs::engine::{InferAllOptions, InferenceEngine, LazyPropagationEngine};
use lazyprop_rs::network::Network;
use lazyprop_rs::topology::JunctionTree;

#[derive(Debug, Parser)]
#[command(author, version, about = "Lazy junction-tree inference on a Bayesian network")]
struct Cli {
    /// JSON file with `network` and `topology`
    input: PathBuf,

    /// Observation, as NAME=STATE (repeatable)
    #[arg(short, long = "evidence", value_name = "NAME=STATE")]
    evidence: Vec<String>,

    /// Joint event to query, as NAME=STATE (repeatable)
    #[arg(long = "event", value_name = "NAME=STATE")]
    event: Vec<String>,

    /// Only report these variables
    #[arg(long)]
    only: Vec<String>,

    /// Print the clique posteriors as tables
    #[arg(long)]
    cliques: bool,

    /// Print the engine snapshot as JSON
    #[arg(long)]
    snapshot: bool,

    /// Write the formula graph of all node posteriors to a DOT file
    #[arg(long, value_name = "PATH")]
    dot: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: simplelog::LevelFilter,
}

#[derive(Debug, Deserialize)]
struct Input {
    network: Network,
    topology: JunctionTree,
}

fn parse_assignment(pairs: &[String]) -> color_eyre::Result<IndexMap<String, String>> {
    pairs
        .iter()
        .map(|pair| {
            let (name, state) = pair
                .split_once('=')
                .ok_or_else(|| eyre!("expected NAME=STATE, got '{}'", pair))?;
            Ok((name.trim().to_string(), state.trim().to_string()))
        })
        .collect()
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    simplelog::TermLogger::init(
        cli.log_level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let text = std::fs::read_to_string(&cli.input).wrap_err_with(|| format!("reading {}", cli.input.display()))?;
    let input: Input = serde_json::from_str(&text)?;

    let start = Instant::now();
    let mut engine = LazyPropagationEngine::new(input.network, &input.topology)?;
    info!(
        "built engine with {} formulas in {:.2} ms",
        engine.formulas().len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    let evidence = parse_assignment(&cli.evidence)?;
    engine.set_evidence(&evidence)?;

    let options = InferAllOptions {
        only_variables: if cli.only.is_empty() { None } else { Some(cli.only.clone()) },
        only_evidence: false,
    };
    let start = Instant::now();
    let result = engine.infer_all(&options)?;
    info!("infer_all took {:.2} ms", start.elapsed().as_secs_f64() * 1000.0);

    println!("=== Posterior marginals ===");
    for (name, row) in &result {
        let marker = if evidence.contains_key(name) { " (observed)" } else { "" };
        println!("{}{}", name, marker);
        for (state, p) in row {
            println!("  {:>10} {:.6}", state, p);
        }
    }

    if !cli.event.is_empty() {
        let event = parse_assignment(&cli.event)?;
        let p = engine.infer(&event)?;
        let description: Vec<String> = event.iter().map(|(n, s)| format!("{}={}", n, s)).collect();
        println!("\nP({}) = {:.6}", description.join(", "), p);
    }

    if cli.cliques {
        println!("\n=== Clique posteriors ===");
        for clique in engine.cliques().to_vec() {
            let values = engine.evaluate(clique.posterior)?.to_vec();
            let formula = engine.formulas().get(clique.posterior)?;
            println!("{}:\n{}", clique.name, show_potential(formula, &values, engine.nodes()));
        }
    }

    let stats = engine.cache_stats();
    info!(
        "cache: {}/{} filled, {} hits, {} misses, {} computations, {} invalidations",
        stats.filled,
        engine.formulas().len(),
        stats.hits,
        stats.misses,
        stats.computations,
        stats.invalidations
    );

    if cli.snapshot {
        println!("{}", engine.to_json()?);
    }

    if let Some(path) = &cli.dot {
        let roots: Vec<_> = engine.nodes().iter().map(|n| n.posterior).collect();
        let dot = engine
            .formulas()
            .to_dot(&roots)
            .map_err(|e| eyre!("rendering DOT: {}", e))?;
        std::fs::write(path, dot)?;
        println!("Formula graph written to {}", path.display());
    }

    Ok(())
}
