/*!
 * Run sessions.
 *
 * A session drives one run over a list of motors: capture a snapshot, write a
 * snapshot file back, or compare a snapshot file with the live devices.
 * Motors are handled one at a time, in order.
 */
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use tracing::{info, Instrument};

use motorstate_core::config::Config;
use motorstate_core::logging::session_span;
use motorstate_core::types::{AllowList, Snapshot};
use motorstate_core::utils::millis_to_limit;
use motorstate_devices::{connect_pair, EndpointConnector, MotorTarget};

use crate::codec::{self, SnapshotFiles};
use crate::comparator::{self, ComparisonReport};
use crate::error::{Error, Result};
use crate::reader::read_parameters;
use crate::writer::{TransactionalWriter, WriteOutcome};

/// What a run does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Read every motor and save a snapshot
    Snapshot,
    /// Write the snapshot in the file back to the motors
    WriteBack(PathBuf),
    /// Compare the snapshot in the file with the motors
    Compare(PathBuf),
}

/// Result of a run
#[derive(Debug, Clone)]
pub enum RunReport {
    /// Files a snapshot was saved to
    Snapshot(SnapshotFiles),
    /// One outcome per written motor
    WriteBack(Vec<WriteOutcome>),
    /// Drift per motor
    Compare(ComparisonReport),
}

/// One run over a list of motors
#[derive(Debug)]
pub struct Session<'a> {
    connector: &'a dyn EndpointConnector,
    writer: TransactionalWriter,
    limit: Option<Duration>,
    output_dir: PathBuf,
    file_prefix: String,
}

impl<'a> Session<'a> {
    /// Create a session from configuration
    pub fn new(connector: &'a dyn EndpointConnector, config: &Config) -> Result<Self> {
        let allow_list = config.catalog.allow_list()?;
        Ok(Self::with_allow_list(connector, allow_list)
            .with_timeout(millis_to_limit(config.runtime.operation_timeout_ms))
            .with_output_dir(&config.general.output_dir)
            .with_file_prefix(&config.general.file_prefix))
    }

    /// Create a session with defaults and the given allow-list
    pub fn with_allow_list(connector: &'a dyn EndpointConnector, allow_list: AllowList) -> Self {
        Self {
            connector,
            writer: TransactionalWriter::new(allow_list),
            limit: None,
            output_dir: PathBuf::from("."),
            file_prefix: "motor_parameters".to_string(),
        }
    }

    /// Bound every endpoint call
    pub fn with_timeout(mut self, limit: Option<Duration>) -> Self {
        self.limit = limit;
        self
    }

    /// Directory snapshot files are written to
    pub fn with_output_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.output_dir = dir.as_ref().to_path_buf();
        self
    }

    /// File name prefix of snapshot files
    pub fn with_file_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    /// Run `mode` over `targets`
    pub async fn run(&self, targets: &[MotorTarget], mode: &RunMode) -> Result<RunReport> {
        let span = session_span(self.connector.name());

        async {
            info!("Starting {:?} run over {} motors", mode, targets.len());
            match mode {
                RunMode::Snapshot => self.snapshot(targets).await.map(RunReport::Snapshot),
                RunMode::WriteBack(path) => {
                    self.write_back(targets, path).await.map(RunReport::WriteBack)
                }
                RunMode::Compare(path) => self.compare(targets, path).await.map(RunReport::Compare),
            }
        }
        .instrument(span)
        .await
    }

    /// Read every motor
    pub async fn capture(&self, targets: &[MotorTarget]) -> Result<Snapshot> {
        let mut snapshot = Snapshot::new();
        for target in targets {
            let endpoints = connect_pair(self.connector, target, self.limit).await?;
            let parameters = read_parameters(&target.motor, &endpoints).await?;
            snapshot.insert(target.motor.clone(), parameters);
        }
        Ok(snapshot)
    }

    /// Read every motor and save the snapshot files and the readable table
    pub async fn snapshot(&self, targets: &[MotorTarget]) -> Result<SnapshotFiles> {
        let snapshot = self.capture(targets).await?;
        codec::write_snapshot_files(
            &self.output_dir,
            &self.file_prefix,
            &snapshot,
            self.writer.allow_list(),
            &Local::now(),
        )
    }

    /// Write the snapshot in `path` back to every motor
    ///
    /// Stops at the first motor whose write-back fails.
    pub async fn write_back(&self, targets: &[MotorTarget], path: &Path) -> Result<Vec<WriteOutcome>> {
        let snapshot = load_covering(path, targets)?;

        let mut outcomes = Vec::with_capacity(targets.len());
        for target in targets {
            let parameters = snapshot
                .get(&target.motor)
                .ok_or_else(|| Error::MissingMotor(target.motor.to_string()))?;
            let endpoints = connect_pair(self.connector, target, self.limit).await?;
            let outcome = self
                .writer
                .write_parameters(&target.motor, &endpoints, parameters)
                .await?;
            outcomes.push(outcome);
        }

        info!("Wrote back {} motors from {}", outcomes.len(), path.display());
        Ok(outcomes)
    }

    /// Compare the snapshot in `path` with every motor
    pub async fn compare(&self, targets: &[MotorTarget], path: &Path) -> Result<ComparisonReport> {
        let captured = load_covering(path, targets)?;
        let live = self.capture(targets).await?;
        comparator::compare(&captured, &live)
    }
}

/// Load a snapshot file and check that it covers every target
fn load_covering(path: &Path, targets: &[MotorTarget]) -> Result<Snapshot> {
    let snapshot = codec::read_snapshot_file(path)?;
    let missing = codec::missing_motors(&snapshot, targets.iter().map(|t| &t.motor));
    match missing.first() {
        Some(motor) => Err(Error::MissingMotor(motor.to_string())),
        None => Ok(snapshot),
    }
}
