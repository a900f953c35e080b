//! Waymark harness CLI.
//!
//! Run deterministic end-to-end scenarios against the spatial engine.

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use waymark_sim::scenarios::ScenarioId;
use waymark_sim::{ScenarioRunner, SimConfig};

#[derive(Parser, Debug)]
#[command(name = "waymark-sim", about = "Deterministic harness for the Waymark spatial engine")]
struct Cli {
    /// Scenario to run (steady_heading, slow_turn, city_walk)
    #[arg(long, default_value = "steady_heading")]
    scenario: String,

    /// Run every scenario in sequence
    #[arg(long)]
    all: bool,

    /// List scenarios and exit
    #[arg(long)]
    list: bool,

    /// Master seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Simulated duration in seconds
    #[arg(long, default_value_t = 30.0)]
    duration: f64,

    /// Tick rate in Hz
    #[arg(long, default_value_t = 30)]
    tick_rate: u32,

    /// Gaussian sensor noise standard deviation
    #[arg(long, default_value_t = 0.3)]
    noise_std: f64,

    /// World view distance in meters (<= 0 means unbounded)
    #[arg(long, default_value_t = 250.0)]
    view_distance: f64,

    /// Write per-frame JSON to this path (single-scenario runs only)
    #[arg(long)]
    export: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    if cli.list {
        for scenario in ScenarioId::all() {
            println!("{:16} {}", scenario.name(), scenario.description());
        }
        return;
    }

    let scenarios = if cli.all {
        ScenarioId::all()
    } else {
        match cli.scenario.parse::<ScenarioId>() {
            Ok(scenario) => vec![scenario],
            Err(message) => {
                error!("{message}");
                std::process::exit(2);
            }
        }
    };
    let export_path = if cli.all {
        if cli.export.is_some() {
            info!("--export is ignored with --all");
        }
        None
    } else {
        cli.export
    };

    let mut all_passed = true;
    for scenario in scenarios {
        let config = SimConfig {
            seed: cli.seed,
            scenario,
            duration_secs: cli.duration,
            tick_rate_hz: cli.tick_rate,
            sensor_noise_std: cli.noise_std,
            view_distance_m: cli.view_distance,
        };
        let runner = ScenarioRunner::new(config);
        match runner.run(export_path.as_deref()) {
            Ok(result) => {
                info!(
                    "{}: {} | mean heading error {:.2}° | candidates {}..{} | picks {}",
                    result.scenario,
                    if result.passed { "PASS" } else { "FAIL" },
                    result.mean_abs_heading_error_deg,
                    result.min_candidates,
                    result.max_candidates,
                    result.pick_hits,
                );
                if !result.passed {
                    all_passed = false;
                }
            }
            Err(err) => {
                error!("{scenario}: {err}");
                all_passed = false;
            }
        }
    }

    if !all_passed {
        std::process::exit(1);
    }
}
