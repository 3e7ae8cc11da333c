//! motorstate CLI
//!
//! Captures, compares and restores the parameters of the motors in a server
//! group.
//!
//! # Modes
//!
//! - default - read every motor and save a full and a reduced snapshot file
//!   plus a readable table
//! - `--write FILE` - write a snapshot file back to the motors
//! - `--compare FILE` - compare a snapshot file with the motors

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use motorstate_core::config::{Config, ConfigBuilder};
use motorstate_devices::{parse_device_ids, DeviceNameResolver, MotorTarget, SimulatedBus};
use motorstate_engine::{Error as EngineError, RunMode, RunReport, Session};

/// Exit code of a write-back that was rolled back
const EXIT_ROLLED_BACK: u8 = 3;

/// Exit code of a write-back whose rollback failed
const EXIT_ROLLBACK_FAILED: u8 = 4;

/// Motor parameter snapshot and write-back tool.
#[derive(Parser, Debug)]
#[command(name = "motorstate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server group to operate on, e.g. EH1A
    server_group: String,

    /// Beamline prefix of the device addresses
    #[arg(short, long)]
    beamline: Option<String>,

    /// Devices of the group to use, e.g. 1,2,7 or 3-6 (default: all)
    #[arg(short, long, value_parser = parse_devices)]
    devices: Option<DeviceList>,

    /// Write the parameters in FILE back to the motors
    #[arg(short, long, value_name = "FILE", conflicts_with = "compare")]
    write: Option<PathBuf>,

    /// Compare the parameters in FILE with the motors
    #[arg(long, value_name = "FILE")]
    compare: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory snapshot files are written to
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// State file of the simulated device backend
    #[arg(long, value_name = "FILE")]
    state_file: Option<PathBuf>,

    /// Create factory-default simulated devices for the group and exit
    #[arg(long, conflicts_with_all = ["write", "compare"])]
    seed_simulation: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Sorted, de-duplicated device indices
#[derive(Debug, Clone, PartialEq, Eq)]
struct DeviceList(Vec<u32>);

fn parse_devices(text: &str) -> std::result::Result<DeviceList, String> {
    parse_device_ids(text)
        .map(DeviceList)
        .map_err(|e| e.to_string())
}

impl Cli {
    fn mode(&self) -> RunMode {
        match (&self.write, &self.compare) {
            (Some(path), _) => RunMode::WriteBack(path.clone()),
            (None, Some(path)) => RunMode::Compare(path.clone()),
            (None, None) => RunMode::Snapshot,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match start(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            eprintln!("error: {:#}", err);
            exit_code(&err)
        }
    }
}

async fn start(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    let filter = if cli.verbose { "debug" } else { config.logging.level.as_str() };
    motorstate_core::init(filter).context("Failed to initialize logging")?;

    run(cli, config).await
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let mut resolver = DeviceNameResolver::new(config.devices.clone());
    if let Some(beamline) = &cli.beamline {
        resolver = resolver.with_beamline(beamline.clone());
    }
    let ids = cli.devices.as_ref().map(|list| list.0.as_slice());
    let targets = resolver.resolve(&cli.server_group, ids)?;

    let state_file = cli
        .state_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.simulation.state_file));

    if cli.seed_simulation {
        return seed_simulation(&state_file, &targets);
    }

    let bus = SimulatedBus::load(&state_file).with_context(|| {
        format!(
            "Failed to load simulated devices from {} (create it with --seed-simulation)",
            state_file.display()
        )
    })?;

    let mut session = Session::new(&bus, &config)?;
    if let Some(dir) = &cli.output_dir {
        session = session.with_output_dir(dir);
    }

    match session.run(&targets, &cli.mode()).await? {
        RunReport::Snapshot(files) => {
            println!("Full snapshot: {}", files.full.display());
            println!("Reduced snapshot: {}", files.reduced.display());
            println!("Table: {}", files.table.display());
        }
        RunReport::WriteBack(outcomes) => {
            for outcome in outcomes {
                let retried = if outcome.retried() { " after retry" } else { "" };
                println!(
                    "{}: wrote {} attributes{}",
                    outcome.motor,
                    outcome.written.len(),
                    retried
                );
            }
        }
        RunReport::Compare(report) => print!("{}", report),
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut builder = ConfigBuilder::new().with_environment_prefix("motorstate");
    if let Some(path) = path {
        builder = builder.with_config_file(path);
    }
    Ok(builder.build()?)
}

fn seed_simulation(state_file: &Path, targets: &[MotorTarget]) -> Result<()> {
    let bus = if state_file.exists() {
        SimulatedBus::load(state_file)?
    } else {
        SimulatedBus::new().with_state_file(state_file)
    };

    bus.seed_defaults(targets)?;
    bus.save()?;
    info!("Seeded {} simulated motors", targets.len());
    println!(
        "Seeded {} motors into {}",
        targets.len(),
        state_file.display()
    );
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<EngineError>() {
        Some(EngineError::WriteBackAborted { .. }) => ExitCode::from(EXIT_ROLLED_BACK),
        Some(EngineError::RollbackFailed { .. }) => ExitCode::from(EXIT_ROLLBACK_FAILED),
        _ => ExitCode::FAILURE,
    }
}
