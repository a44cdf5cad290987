//! `vtxfit` CLI: scenario runs, refits of recorded events, metrics export.

use anyhow::{Context, Result};
use bfield::ConstantBField;
use clap::{Parser, Subcommand};
use sim::generator::{EventGenerator, SimEvent};
use sim::replay::{load_events, save_events, EventLog};
use sim::scenarios::{Scenario, ScenarioKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use vertex_core::metrics::VertexMetrics;
use vertex_core::{HelicalTrackLinearizer, VertexFitterAlgorithm, VertexFitterConfig};

#[derive(Parser)]
#[command(name = "vtxfit", about = "Vertex seeding and Billoir fitting CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate events for a named scenario, fit them and output metrics.
    RunScenario {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Number of events to generate
        #[arg(long, default_value_t = 100)]
        events: usize,
        /// Output metrics to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also save the generated events
        #[arg(long)]
        save_events: Option<PathBuf>,
        /// Fitter configuration (JSON) replacing the scenario's
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Refit a previously recorded event log.
    Fit {
        /// Path to event log JSON file
        input: PathBuf,
        /// Output metrics to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
        /// Fitter configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::RunScenario {
            scenario,
            seed,
            events,
            output,
            save_events: save_path,
            config,
        } => {
            run_scenario(
                scenario,
                seed,
                events,
                output.as_deref(),
                save_path.as_deref(),
                config.as_deref(),
            )?;
        }
        Commands::Fit { input, output, config } => {
            run_fit(&input, output.as_deref(), config.as_deref())?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<VertexFitterConfig> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing fitter config {}", path.display()))
}

/// Fit every event and compare with its truth vertices.
fn evaluate(events: &[SimEvent], bz: f64, config: VertexFitterConfig) -> VertexMetrics {
    let linearizer = HelicalTrackLinearizer::new(Arc::new(ConstantBField::along_z(bz)));
    let algorithm = VertexFitterAlgorithm::new(config, linearizer);
    let mut metrics = VertexMetrics::default();

    for (event_index, event) in events.iter().enumerate() {
        let output = algorithm.execute(&event.tracks, &event.proto_vertices());
        metrics.record_event(output.skipped, output.failed.len());
        for failure in &output.failed {
            warn!(
                event = event_index,
                proto_vertex = failure.proto_vertex,
                "fit failed: {}",
                failure.error
            );
        }
        for vertex in &output.vertices {
            // every fitted vertex carries at least one track
            let Some(first) = vertex.tracks.first() else {
                continue;
            };
            let truth = &event.vertices[event.truth_tracks[first.index].vertex];
            metrics.accumulate(vertex, &truth.position);
        }
    }
    metrics
}

fn metrics_json(
    name: &str,
    seed: u64,
    n_events: usize,
    elapsed_s: f64,
    m: &VertexMetrics,
) -> serde_json::Value {
    serde_json::json!({
        "scenario": name,
        "seed": seed,
        "events": n_events,
        "elapsed_s": elapsed_s,
        "fitted": m.n_matched,
        "skipped": m.skipped,
        "failed": m.failed,
        "rmse_mm": { "x": m.rmse(0), "y": m.rmse(1), "z": m.rmse(2), "xyz": m.rmse_position() },
        "rmse_t_ns": m.rmse(3),
        "pull_rms": {
            "x": m.pull_rms(0),
            "y": m.pull_rms(1),
            "z": m.pull_rms(2),
            "t": m.pull_rms(3),
        },
        "mean_chi2_per_ndf": m.mean_chi2_per_ndf(),
        "raw": m,
    })
}

fn print_summary(m: &VertexMetrics, elapsed_s: f64) {
    println!(
        "Done: {} vertices fitted, {} skipped, {} failed, elapsed={:.2}s",
        m.n_matched, m.skipped, m.failed, elapsed_s
    );
    println!(
        "RMSE: x={:.4} mm  y={:.4} mm  z={:.4} mm  t={:.4} ns",
        m.rmse(0),
        m.rmse(1),
        m.rmse(2),
        m.rmse(3)
    );
    println!(
        "Pull RMS: x={:.2}  y={:.2}  z={:.2}  t={:.2}  <chi2/ndf>={:.2}",
        m.pull_rms(0),
        m.pull_rms(1),
        m.pull_rms(2),
        m.pull_rms(3),
        m.mean_chi2_per_ndf()
    );
}

fn run_scenario(
    kind: ScenarioKind,
    seed: u64,
    n_events: usize,
    output_path: Option<&Path>,
    events_path: Option<&Path>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut scenario = Scenario::build(kind, seed);
    if let Some(path) = config_path {
        scenario.fitter = load_config(path)?;
    }

    println!("Running scenario '{}' (seed={}, events={})...", scenario.name, seed, n_events);

    let mut generator = EventGenerator::new(scenario.generator.clone(), seed);
    let events: Vec<SimEvent> = (0..n_events).map(|_| generator.generate()).collect();
    info!(
        tracks = events.iter().map(|e| e.tracks.len()).sum::<usize>(),
        "generated {} events",
        events.len()
    );

    let start = std::time::Instant::now();
    let metrics = evaluate(&events, scenario.generator.bz, scenario.fitter.clone());
    let elapsed = start.elapsed().as_secs_f64();
    print_summary(&metrics, elapsed);

    // Save events if requested
    if let Some(epath) = events_path {
        let log = EventLog {
            scenario_name: scenario.name.clone(),
            seed,
            generator: scenario.generator.clone(),
            events,
        };
        save_events(&log, epath)?;
        println!("Events saved to {}", epath.display());
    }

    // Output metrics
    if let Some(opath) = output_path {
        let json = metrics_json(&scenario.name, seed, n_events, elapsed, &metrics);
        std::fs::write(opath, serde_json::to_string_pretty(&json)?)?;
        println!("Metrics saved to {}", opath.display());
    }

    Ok(())
}

fn run_fit(input: &Path, output_path: Option<&Path>, config_path: Option<&Path>) -> Result<()> {
    let log = load_events(input)
        .with_context(|| format!("loading events from {}", input.display()))?;
    println!("Fitting '{}' ({} events)...", log.scenario_name, log.events.len());

    let config = match config_path {
        Some(path) => load_config(path)?,
        None => VertexFitterConfig::default(),
    };

    let start = std::time::Instant::now();
    let metrics = evaluate(&log.events, log.generator.bz, config);
    let elapsed = start.elapsed().as_secs_f64();
    print_summary(&metrics, elapsed);

    if let Some(opath) = output_path {
        let json = metrics_json(&log.scenario_name, log.seed, log.events.len(), elapsed, &metrics);
        std::fs::write(opath, serde_json::to_string_pretty(&json)?)?;
        println!("Metrics saved to {}", opath.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim::generator::GeneratorConfig;

    #[test]
    fn clean_events_fit_close_to_truth() {
        let config = GeneratorConfig { mean_multiplicity: 15.0, ..Default::default() };
        let mut generator = EventGenerator::new(config.clone(), 21);
        let events: Vec<SimEvent> = (0..20).map(|_| generator.generate()).collect();
        let fitter = VertexFitterConfig { use_density_seed: true, ..Default::default() };
        let m = evaluate(&events, config.bz, fitter);
        assert_eq!(m.n_events, 20);
        assert_eq!(m.failed, 0);
        assert_eq!(m.n_matched, 20);
        assert!(m.rmse(2) < 0.1, "z rmse {}", m.rmse(2));
        assert!(m.pull_rms(2) > 0.5 && m.pull_rms(2) < 2.0, "z pull {}", m.pull_rms(2));
    }

    #[test]
    fn cli_parses_run_scenario() {
        let args = ["vtxfit", "run-scenario", "pile-up", "--events", "3"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::RunScenario { scenario, events, seed, .. } => {
                assert_eq!(scenario, ScenarioKind::PileUp);
                assert_eq!(events, 3);
                assert_eq!(seed, 42);
            }
            Commands::Fit { .. } => panic!("wrong subcommand"),
        }
    }
}
