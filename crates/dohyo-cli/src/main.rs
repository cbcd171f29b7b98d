//! `dohyo` – command line front end of the sumo control core.
//!
//! - `dohyo check-config <path>` – load and validate a configuration file.
//! - `dohyo default-config` – print the default configuration as TOML.
//! - `dohyo replay <scenario.toml>` – feed a scripted frame list through the
//!   full control core on a manual clock and print every cycle.
//! - `dohyo sim` – run the real-time loop against idle simulated hardware
//!   until Ctrl-C or a cycle limit.

mod scenario;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::warn;

use dohyo_hal::sim::SimRig;
use dohyo_hal::{ManualClock, MonotonicClock};
use dohyo_runtime::{ControlConfig, ControlLoop, CycleReport, JsonlRecorder, RunSummary};
use dohyo_types::RobotState;

use crate::scenario::Scenario;

#[derive(Parser)]
#[command(name = "dohyo")]
#[command(about = "Sumo robot control core")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a configuration file
    CheckConfig {
        /// Path to the TOML configuration
        path: PathBuf,
    },

    /// Print the default configuration as TOML
    DefaultConfig,

    /// Replay a scripted scenario through the control core
    Replay {
        /// Scenario file with [[frame]] entries
        scenario: PathBuf,
        /// Configuration file (defaults when omitted)
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
        /// Write one JSON record per cycle to this file
        #[arg(short = 'r', long = "record", value_name = "FILE")]
        record: Option<PathBuf>,
    },

    /// Run the real-time loop on simulated hardware
    Sim {
        /// Configuration file (defaults when omitted)
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
        /// Stop after this many cycles
        #[arg(short = 'n', long = "cycles")]
        cycles: Option<u64>,
    },
}

fn main() -> ExitCode {
    dohyo_runtime::init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::CheckConfig { path } => check_config(&path),
        Commands::DefaultConfig => default_config(),
        Commands::Replay {
            scenario,
            config,
            record,
        } => replay(&scenario, config.as_deref(), record.as_deref()),
        Commands::Sim { config, cycles } => sim(config.as_deref(), cycles),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ControlConfig, String> {
    match path {
        Some(p) => ControlConfig::load(p).map_err(|e| e.to_string()),
        None => {
            let mut cfg = ControlConfig::default();
            cfg.apply_env_overrides();
            cfg.validate().map_err(|e| e.to_string())?;
            Ok(cfg)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subcommands
// ─────────────────────────────────────────────────────────────────────────────

fn check_config(path: &Path) -> Result<(), String> {
    let cfg = ControlConfig::load(path).map_err(|e| e.to_string())?;
    println!("{} {}", "✓".green().bold(), path.display().to_string().bold());
    println!(
        "  cycle {} ms, staleness {} ms, edge {} ({:?}), push power {}",
        cfg.timing.cycle_period_ms,
        cfg.timing.sensor_staleness_ms,
        cfg.edge.reflectance_threshold,
        cfg.edge.polarity,
        cfg.drive.push_power,
    );
    Ok(())
}

fn default_config() -> Result<(), String> {
    let raw = ControlConfig::default()
        .to_toml()
        .map_err(|e| e.to_string())?;
    print!("{raw}");
    Ok(())
}

fn replay(scenario_path: &Path, config: Option<&Path>, record: Option<&Path>) -> Result<(), String> {
    let cfg = load_config(config)?;
    let scenario = Scenario::load(scenario_path)?;

    let clock = ManualClock::new();
    let (hub, drive, sim) = SimRig::new(Arc::new(clock.clone()), cfg.staleness())
        .with_all_sensors()
        .build();
    let mut control = ControlLoop::new(&cfg, hub, drive);
    if let Some(path) = record {
        let recorder = JsonlRecorder::create(path).map_err(|e| e.to_string())?;
        control = control.with_sink(Box::new(recorder));
    }

    if let Some(name) = &scenario.name {
        println!("{} {}", "Scenario".bold(), name.cyan());
    }
    println!(
        "{}",
        format!(
            "{:>5} {:>8}  {:<9} {:<22} {:>7} {:>7}",
            "cycle", "t (ms)", "state", "intent", "left", "right"
        )
        .dimmed()
    );

    for frame in scenario.cycles() {
        clock.advance(frame.dt_ms.map(Duration::from_millis).unwrap_or(cfg.cycle_period()));
        frame.apply(&sim);
        print_cycle(&control.cycle());
    }
    control.stop();

    println!(
        "\n  {} cycles, {} safety overrides, final state {}",
        control.cycles(),
        control.gate().overrides(),
        paint_state(control.state())
    );
    if let Some(path) = record {
        println!("  Recorded to {}", path.display().to_string().bold());
    }
    Ok(())
}

fn sim(config: Option<&Path>, cycles: Option<u64>) -> Result<(), String> {
    let cfg = load_config(config)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the drive …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; stop with a cycle limit instead");
    }

    let (hub, drive, _sim) = SimRig::new(Arc::new(MonotonicClock::new()), cfg.staleness())
        .with_all_sensors()
        .build();
    let mut control = ControlLoop::new(&cfg, hub, drive);
    println!(
        "  Simulated run {} at {} ms per cycle. Press {} to stop.",
        control.run_id().to_string().dimmed(),
        cfg.timing.cycle_period_ms,
        "Ctrl-C".bold()
    );

    let summary = control.run(&shutdown, cycles);
    print_summary(&summary);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Output helpers
// ─────────────────────────────────────────────────────────────────────────────

fn paint_state(state: RobotState) -> colored::ColoredString {
    let label = state.to_string();
    match state {
        RobotState::Search => label.cyan(),
        RobotState::LockOn => label.yellow(),
        RobotState::Approach => label.blue(),
        RobotState::Push => label.red().bold(),
        RobotState::Recovery => label.magenta(),
    }
}

fn print_cycle(r: &CycleReport) {
    let intent = format!("{:?}", r.intent);
    let mut line = format!(
        "{:>5} {:>8.1}  {:<9} {:<22} {:>7.1} {:>7.1}",
        r.cycle,
        r.at.as_secs_f64() * 1000.0,
        paint_state(r.state),
        intent,
        r.command.left,
        r.command.right,
    );
    if let Some(t) = r.transition {
        line.push_str(&format!("  {} {:?}", "←".dimmed(), t.reason));
    }
    if r.safety.edge_detected {
        line.push_str(&format!("  {}", "EDGE".red().bold()));
    }
    if let Some(e) = &r.actuator_error {
        line.push_str(&format!("  {}", e.to_string().yellow()));
    }
    println!("{line}");
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("  {} cycles", summary.cycles.to_string().bold());
    println!("  {} overruns", summary.overruns);
    println!("  {} actuator failures", summary.actuator_failures);
    println!("  {} safety overrides", summary.safety_overrides);
    println!("  final state {}", paint_state(summary.final_state));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_every_subcommand() {
        let cli = Cli::try_parse_from(["dohyo", "check-config", "dohyo.toml"]).expect("parse");
        assert!(matches!(cli.command, Commands::CheckConfig { .. }));

        let cli = Cli::try_parse_from(["dohyo", "replay", "s.toml", "--record", "out.jsonl"])
            .expect("parse");
        match cli.command {
            Commands::Replay { record, config, .. } => {
                assert_eq!(record, Some(PathBuf::from("out.jsonl")));
                assert_eq!(config, None);
            }
            _ => panic!("expected replay"),
        }

        let cli = Cli::try_parse_from(["dohyo", "sim", "--cycles", "10"]).expect("parse");
        assert!(matches!(cli.command, Commands::Sim { cycles: Some(10), .. }));
        assert!(Cli::try_parse_from(["dohyo", "fly"]).is_err());
    }

    #[test]
    fn invalid_config_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[drive]\nturn_min_power = 60.0\n").expect("write");
        let err = check_config(&path).unwrap_err();
        assert!(err.contains("drive.turn_min_power"));
    }

    #[test]
    fn replay_records_every_cycle() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let scenario = dir.path().join("s.toml");
        std::fs::write(
            &scenario,
            "[[frame]]\nrepeat = 4\nedge_left = 70.0\nedge_right = 70.0\nrange_front = 15.0\n",
        )
        .expect("write");
        let out = dir.path().join("run.jsonl");
        replay(&scenario, None, Some(&out)).expect("replay");
        let raw = std::fs::read_to_string(&out).expect("read");
        assert_eq!(raw.lines().count(), 4);
    }
}
