/*!
 * Transactional write-back.
 *
 * Writes a motor's captured attributes back to its endpoints. Only
 * allow-listed keys are written, and the deactivation flag never is. Every
 * overwritten value is recorded first. A failed pass is retried once without
 * rewriting what already succeeded; a second failure restores the recorded
 * values and aborts.
 */
use std::collections::BTreeSet;

use tracing::{debug, error, info, warn, Instrument};

use motorstate_core::logging::motor_span;
use motorstate_core::types::{
    delay, keys, AllowList, AttributeKey, AttributeMap, EndpointClass, MotorId, Value,
};
use motorstate_devices::EndpointPair;

use crate::error::{Error, Result};
use crate::transaction::{WriteState, WriteTransaction};

/// Result of a committed write-back
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    /// Motor that was written
    pub motor: MotorId,
    /// Keys that were written, in key order
    pub written: Vec<AttributeKey>,
    /// Keys that were present but not eligible for writing
    pub skipped: Vec<AttributeKey>,
    /// State transitions taken
    pub transitions: Vec<(WriteState, WriteState)>,
}

impl WriteOutcome {
    /// Check if the write-back needed a second pass
    pub fn retried(&self) -> bool {
        self.transitions
            .iter()
            .any(|(_, to)| *to == WriteState::Retry)
    }
}

/// Writes attribute maps back to motors
#[derive(Debug, Clone)]
pub struct TransactionalWriter {
    allow_list: AllowList,
}

impl TransactionalWriter {
    /// Create a writer restricted to `allow_list`
    pub fn new(allow_list: AllowList) -> Self {
        Self { allow_list }
    }

    /// Get the allow-list
    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    /// Write `parameters` to the endpoints of `motor` and commit them
    ///
    /// Returns [`Error::WriteBackAborted`] if the write-back failed twice and
    /// the original values were restored, and [`Error::RollbackFailed`] if
    /// restoring failed as well.
    pub async fn write_parameters(
        &self,
        motor: &MotorId,
        endpoints: &EndpointPair,
        parameters: &AttributeMap,
    ) -> Result<WriteOutcome> {
        let span = motor_span("write", motor);
        self.run(motor, endpoints, parameters).instrument(span).await
    }

    async fn run(
        &self,
        motor: &MotorId,
        endpoints: &EndpointPair,
        parameters: &AttributeMap,
    ) -> Result<WriteOutcome> {
        let (entries, skipped) = self.eligible(parameters)?;

        let mut transaction = WriteTransaction::new(motor.clone());
        let mut written = BTreeSet::new();
        let mut transitions = Vec::new();
        let mut cause: Option<Error> = None;
        let mut state = WriteState::Attempt;

        while !state.is_final() {
            let next = match state {
                WriteState::Attempt | WriteState::Retry => {
                    match apply(endpoints, &entries, &mut written, Some(&mut transaction)).await {
                        Ok(()) => state.on_success(),
                        Err(err) if err.is_configuration() => return Err(err),
                        Err(err) => {
                            warn!("Write-back {} of {} failed: {}", state, motor, err);
                            cause = Some(err);
                            state.on_failure()
                        }
                    }
                }
                WriteState::Rollback => {
                    let plan = transaction.restore_plan();
                    info!("Restoring {} attributes of {}", plan.len(), motor);

                    let mut restored = BTreeSet::new();
                    match apply(endpoints, &plan, &mut restored, None).await {
                        Ok(()) => state.on_success(),
                        Err(err) => {
                            error!("Rollback of {} failed: {}", motor, err);
                            return Err(Error::RollbackFailed {
                                motor: motor.to_string(),
                                cause: describe(&cause),
                                source: Box::new(err),
                            });
                        }
                    }
                }
                WriteState::Abort | WriteState::Committed => state,
            };

            debug!("Write-back of {}: {} -> {}", motor, state, next);
            transitions.push((state, next));
            state = next;
        }

        if state == WriteState::Abort {
            return Err(Error::WriteBackAborted {
                motor: motor.to_string(),
                cause: describe(&cause),
            });
        }

        info!("Wrote and committed {} attributes of {}", written.len(), motor);
        Ok(WriteOutcome {
            motor: motor.clone(),
            written: written.into_iter().collect(),
            skipped,
            transitions,
        })
    }

    /// Split `parameters` into the entries to write and the skipped keys
    ///
    /// Keys are filtered first. Only the surviving keys must route to an
    /// endpoint class, and they are all checked before any device I/O.
    fn eligible(
        &self,
        parameters: &AttributeMap,
    ) -> Result<(Vec<(AttributeKey, Value)>, Vec<AttributeKey>)> {
        let mut entries = Vec::new();
        let mut skipped = Vec::new();

        for (key, value) in parameters {
            if key.as_str() == keys::DEACTIVATION {
                debug!("Skipping {}, it is never written directly", key);
                skipped.push(key.clone());
            } else if !self.allow_list.contains(key) {
                debug!("Skipping {}, not in the allow-list", key);
                skipped.push(key.clone());
            } else if value.is_nan() {
                warn!("Skipping {}, no value was captured", key);
                skipped.push(key.clone());
            } else {
                route(key)?;
                entries.push((key.clone(), value.clone()));
            }
        }

        Ok((entries, skipped))
    }
}

/// One pass over `entries`, followed by a commit on the secondary endpoint
///
/// Keys in `done` are skipped and every key written is added to it. With a
/// transaction, each value is read and recorded before it is overwritten.
async fn apply(
    endpoints: &EndpointPair,
    entries: &[(AttributeKey, Value)],
    done: &mut BTreeSet<AttributeKey>,
    mut transaction: Option<&mut WriteTransaction>,
) -> Result<()> {
    for (key, value) in entries {
        if done.contains(key) {
            debug!("{} already written, skipping", key);
            continue;
        }

        let (class, name) = route(key)?;
        let endpoint = endpoints.get(class);

        if let Some(transaction) = transaction.as_deref_mut() {
            let previous = endpoint.read_attribute(name).await?;
            transaction.record(key.clone(), previous);
        }

        endpoint.write_attribute(name, device_value(key, value)?).await?;
        debug!("Wrote {} = {}", key, value);
        done.insert(key.clone());
    }

    let status = endpoints.secondary.commit().await?;
    if !status.is_success() {
        return Err(Error::Commit {
            device: endpoints.secondary.address().to_string(),
            status: status.to_string(),
        });
    }

    Ok(())
}

fn route(key: &AttributeKey) -> Result<(EndpointClass, &str)> {
    key.split()
        .map_err(|e| Error::configuration(format!("Cannot route {}: {}", key, e)))
}

/// The value the device expects for `key`
///
/// The current delay is displayed in milliseconds but written as a table
/// code.
fn device_value(key: &AttributeKey, value: &Value) -> Result<Value> {
    if key.as_str() != keys::CURRENT_DELAY_TIME {
        return Ok(value.clone());
    }

    value
        .as_float()
        .and_then(delay::code_for)
        .map(Value::Integer)
        .ok_or_else(|| {
            Error::validation(format!(
                "{} is not a valid setting of {}",
                value,
                keys::CURRENT_DELAY_TIME
            ))
        })
}

fn describe(cause: &Option<Error>) -> String {
    cause
        .as_ref()
        .map(|err| err.to_string())
        .unwrap_or_else(|| "unknown failure".to_string())
}
