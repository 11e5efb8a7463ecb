//! MetapopPy Simulator CLI
//!
//! Run replicate batches of the demonstration SIR model on a chosen topology.

use clap::Parser;
use metapop_sim::dynamics::{MAX_TIME, RECORD_INTERVAL};
use metapop_sim::{BatchSummary, ReplicateRunner, SimConfig, SimExport, SirModel, SIR_COMPARTMENTS};
use metapop_env::{MetapopError, Result};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// MetapopPy stochastic metapopulation simulator
#[derive(Parser, Debug)]
#[command(name = "metapop-sim")]
#[command(about = "Run Gillespie replicates of an SIR metapopulation", long_about = None)]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(short, long)]
    config: Option<String>,

    /// Master seed for determinism
    #[arg(short, long)]
    seed: Option<u64>,

    /// Number of independent replicates
    #[arg(short, long)]
    replicates: Option<usize>,

    /// Topology (single_patch, ring, lattice)
    #[arg(short = 'S', long)]
    scenario: Option<String>,

    /// Patches in the ring, or per side of the lattice
    #[arg(long)]
    size: Option<usize>,

    /// Maximum simulated time
    #[arg(short, long)]
    max_time: Option<f64>,

    /// Recording interval
    #[arg(short, long)]
    interval: Option<f64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON summary on stdout
    #[arg(long)]
    json: bool,

    /// Write every trajectory to this JSON file
    #[arg(long)]
    export: Option<String>,
}

impl Args {
    fn to_config(&self) -> Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => SimConfig::from_json_file(path)?,
            None => SimConfig::default(),
        };
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(replicates) = self.replicates {
            config.replicates = replicates;
        }
        if let Some(scenario) = &self.scenario {
            config.scenario = scenario.clone();
        }
        if let Some(size) = self.size {
            config.size = size;
        }
        if let Some(t) = self.max_time {
            config.params.insert(MAX_TIME, t);
        }
        if let Some(interval) = self.interval {
            config.params.insert(RECORD_INTERVAL, interval);
        }
        config.validate()?;
        Ok(config)
    }
}

fn run(args: &Args) -> Result<()> {
    let config = args.to_config()?;
    let scenario = config.scenario_id()?;

    let mut params = SirModel::default_params();
    params.merge(&config.params);

    info!(
        "{} replicates on {} (size={}, seed={})",
        config.replicates, scenario, config.size, config.seed
    );
    let runner = ReplicateRunner::new(SirModel, config.seed, config.replicates).with_params(params.clone());
    let results = runner.run(|| scenario.build_network(SIR_COMPARTMENTS, config.size))?;
    let summary = BatchSummary::of(&results);

    if let Some(path) = &args.export {
        let export = SimExport::new("sir", scenario.name(), config.seed, params, results.clone());
        export.write_to_file(path)?;
        info!("Exported {} replicates to {}", results.len(), path);
    }

    if args.json {
        let output = serde_json::json!({
            "scenario": scenario.name(),
            "seed": config.seed,
            "summary": summary,
            "results": results.iter().map(|r| {
                let last = r.trajectory.last();
                serde_json::json!({
                    "replicate": r.replicate,
                    "seed": r.seed,
                    "termination": r.trajectory.termination,
                    "end_time": r.trajectory.end_time,
                    "events_fired": r.trajectory.events_fired,
                    "final": SIR_COMPARTMENTS.iter().map(|c| {
                        (c.to_string(), last.map(|s| s.total(c)).unwrap_or(0))
                    }).collect::<std::collections::BTreeMap<_, _>>(),
                })
            }).collect::<Vec<_>>(),
        });
        let text = serde_json::to_string_pretty(&output).map_err(|e| MetapopError::Serialization(e.to_string()))?;
        println!("{}", text);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!(
            "{} replicates: mean {:.1} events, mean end t={:.3}, {} exhausted",
            summary.replicates, summary.mean_events_fired, summary.mean_end_time, summary.exhausted
        );
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("MetapopPy Simulator v0.1.0");
    }

    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }
}
