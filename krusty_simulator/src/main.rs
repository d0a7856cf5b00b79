//! CLI entry point for the pause simulator: runs filament-change scenarios against the
//! simulated machine and writes the move log as CSV and the event stream as JSON lines.

mod scenario;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use csv::Writer;
use serde::Serialize;
use tracing::{info, warn, Level};

use krusty_pause::sim::SimMachine;
use krusty_pause::{
    FilamentChangeRequest, LoadRequest, PauseConfig, PauseController, PauseRequest, ParkRequest, ResumeParams,
    UnloadRequest, UnloadTarget,
};

use scenario::{BUILTIN_SCENARIOS, Scenario, Step};

/// Pause Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "pause-sim", about = "Runs pause, resume and filament change scenarios on a simulated printer.")]
pub struct Cli {
    /// Path to a TOML config file (overrides defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory for the move CSV and event log
    #[arg(short, long, default_value = "./sim_output")]
    output: PathBuf,

    /// Built-in scenario name or path to a scenario TOML file
    #[arg(long, default_value = "change")]
    scenario: String,

    /// Log every state transition
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available built-in scenarios
    ListScenarios,
    /// Run a single scenario (default)
    Run,
}

#[derive(Debug, Serialize)]
struct MoveRow {
    step: usize,
    x: f64,
    y: f64,
    z: f64,
    e: f64,
    feedrate: f64,
}

type BoxError = Box<dyn std::error::Error>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .init();

    if let Some(Commands::ListScenarios) = cli.command {
        for name in BUILTIN_SCENARIOS {
            println!("{name}");
        }
        return Ok(());
    }

    let config = match cli.config {
        Some(ref path) => krusty_pause::load_config(&path.to_string_lossy())?,
        None => PauseConfig::default(),
    };
    let scenario = load_scenario(&cli.scenario)?;

    let sim = setup(&config, &scenario);
    let mut controller = sim.controller(config);
    for (index, step) in scenario.steps.iter().enumerate() {
        info!("Step {}: {:?}", index + 1, step);
        run_step(&sim, &mut controller, step).await;
    }

    std::fs::create_dir_all(&cli.output)?;
    write_moves(&sim, &cli.output.join("moves.csv"))?;
    std::fs::write(cli.output.join("events.jsonl"), sim.events_jsonl()?)?;
    info!(
        "Done at {:.1}s: {} moves, {} events written to {}",
        sim.now().as_secs_f64(),
        sim.moves().len(),
        sim.events().len(),
        cli.output.display()
    );
    Ok(())
}

fn load_scenario(name: &str) -> Result<Scenario, BoxError> {
    if let Some(scenario) = Scenario::builtin(name) {
        return Ok(scenario);
    }
    let contents = std::fs::read_to_string(name).map_err(|e| format!("unknown scenario '{name}': {e}"))?;
    Ok(Scenario::parse(&contents)?)
}

fn setup(config: &PauseConfig, scenario: &Scenario) -> SimMachine {
    let sim = SimMachine::new(config, scenario.hotends)
        .with_recovery()
        .with_media()
        .with_sensor();
    sim.set_position(scenario.start);
    sim.set_homed(scenario.homed);
    sim.set_all_temperatures(scenario.temperature, scenario.temperature);
    sim.set_media_active(scenario.media_printing);
    for ms in &scenario.confirm_after_ms {
        sim.confirm_after(Duration::from_millis(*ms));
    }
    sim
}

async fn run_step(sim: &SimMachine, controller: &mut PauseController, step: &Step) {
    match *step {
        Step::Change { extruder, resume_temp } => {
            let request = FilamentChangeRequest {
                extruder,
                resume_temp,
                ..FilamentChangeRequest::default()
            };
            report("change", controller.change_filament(request).await);
        }
        Step::Park => report("park", controller.park_head(ParkRequest::default()).await),
        Step::Pause { unload_length } => {
            let config = controller.config();
            let retract = -config.pause.retract_length;
            let park = config.pause.park_point(sim.active_extruder());
            let request = PauseRequest::new(retract, park, -unload_length.abs());
            report("pause", controller.pause_print(request).await);
        }
        Step::Wait => controller.wait_for_confirmation(false, -1).await,
        Step::Resume => report("resume", controller.resume_print(ResumeParams::default()).await),
        Step::Runout { extruder } => {
            let before = sim.injected().len();
            controller.runout_detected(extruder).await;
            let injected = sim.injected();
            for script in injected.iter().skip(before) {
                for line in script.lines() {
                    dispatch(controller, line).await;
                }
            }
        }
        Step::Load { extruder, length } => {
            let request = LoadRequest {
                extruder,
                length,
                ..LoadRequest::default()
            };
            report("load", controller.load_to_nozzle(request).await);
        }
        Step::Unload { extruder, all } => {
            let target = match (all, extruder) {
                (true, _) => UnloadTarget::AllExtruders,
                (false, Some(e)) => UnloadTarget::Extruder(e),
                (false, None) => UnloadTarget::Active,
            };
            let request = UnloadRequest {
                target,
                ..UnloadRequest::default()
            };
            report("unload", controller.unload_from_nozzle(request).await);
        }
        Step::Idle { ms } => {
            for _ in 0..ms.div_ceil(100) {
                controller.machine_mut().idle.idle().await;
            }
        }
    }
}

/// Runs a queued runout command the way the command queue would.
async fn dispatch(controller: &mut PauseController, line: &str) {
    match line.split_whitespace().next() {
        Some("M600") => report("M600", controller.change_filament(FilamentChangeRequest::default()).await),
        Some("M125") => report("M125", controller.park_head(ParkRequest::default()).await),
        Some("M25") => {
            let config = controller.config();
            let park = config.pause.park_point(0);
            let request = PauseRequest::new(-config.pause.retract_length, park, 0.0);
            report("M25", controller.pause_print(request).await);
        }
        Some(other) => warn!("Ignoring queued command {}", other),
        None => {}
    }
}

fn report<E: std::fmt::Display>(what: &str, result: Result<(), E>) {
    match result {
        Ok(()) => info!("{} finished", what),
        Err(e) => warn!("{} failed: {}", what, e),
    }
}

fn write_moves(sim: &SimMachine, path: &Path) -> Result<(), BoxError> {
    let mut writer = Writer::from_path(path)?;
    for (step, record) in sim.moves().iter().enumerate() {
        writer.serialize(MoveRow {
            step,
            x: record.target.x,
            y: record.target.y,
            z: record.target.z,
            e: record.target.e,
            feedrate: record.feedrate,
        })?;
    }
    writer.flush()?;
    Ok(())
}
