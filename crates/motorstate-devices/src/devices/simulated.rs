/*!
 * Simulated endpoint backend for motorstate.
 *
 * The bus keeps the attribute tables of any number of endpoints in memory,
 * optionally backed by a JSON state file. A commit on a secondary endpoint
 * persists the whole bus, the way an EPROM write makes values survive a power
 * cycle. Faults can be injected per endpoint to exercise the engine's soft
 * read handling, retry and rollback paths.
 */
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, info};

use motorstate_core::types::{delay, keys, AttributeKey, EndpointClass, Value};

use crate::connector::EndpointConnector;
use crate::device::{CommitStatus, DeviceError, Endpoint, Result};
use crate::resolver::MotorTarget;

/// Attribute tables keyed by endpoint address
pub type DeviceTable = BTreeMap<String, BTreeMap<String, Value>>;

/// A call observed by the bus
#[derive(Debug, Clone, PartialEq)]
pub enum BusCall {
    /// An attribute read
    Read {
        /// Endpoint address
        address: String,
        /// Attribute name
        attribute: String,
    },
    /// An attribute write, with the value as sent by the caller
    Write {
        /// Endpoint address
        address: String,
        /// Attribute name
        attribute: String,
        /// Written value
        value: Value,
    },
    /// A commit request
    Commit {
        /// Endpoint address
        address: String,
    },
}

/// Faults injected into one endpoint
#[derive(Debug, Clone, Default)]
struct Faults {
    undefined: BTreeSet<String>,
    undecodable: BTreeSet<String>,
    unreachable: BTreeSet<String>,
    failing_writes: BTreeMap<String, usize>,
    commit_rejections: usize,
}

#[derive(Debug, Default)]
struct BusState {
    devices: DeviceTable,
    faults: BTreeMap<String, Faults>,
    calls: Vec<BusCall>,
}

/// A shared, in-memory control-system bus
#[derive(Debug, Clone, Default)]
pub struct SimulatedBus {
    state: Arc<Mutex<BusState>>,
    state_file: Option<PathBuf>,
}

impl SimulatedBus {
    /// Create an empty bus without persistence
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a bus from its JSON state file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let devices: DeviceTable = serde_json::from_str(&text)?;
        info!("Loaded {} simulated endpoints from {}", devices.len(), path.display());

        Ok(Self {
            state: Arc::new(Mutex::new(BusState {
                devices,
                ..BusState::default()
            })),
            state_file: Some(path.to_path_buf()),
        })
    }

    /// Persist commits to `path`
    pub fn with_state_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.state_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Write the current state to the state file, if one is set
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.state_file else {
            return Ok(());
        };

        let text = {
            let state = self.lock()?;
            serde_json::to_string_pretty(&state.devices)?
        };
        std::fs::write(path, text)?;
        debug!("Saved simulated bus to {}", path.display());
        Ok(())
    }

    /// Add an endpoint with the given attributes, replacing any previous one
    pub fn insert_device<S: Into<String>>(
        &self,
        address: S,
        attributes: BTreeMap<String, Value>,
    ) -> Result<()> {
        self.lock()?.devices.insert(address.into(), attributes);
        Ok(())
    }

    /// Populate both endpoints of every target with factory defaults
    pub fn seed_defaults(&self, targets: &[MotorTarget]) -> Result<()> {
        for target in targets {
            self.insert_device(target.primary_address.clone(), primary_defaults())?;
            self.insert_device(
                target.secondary_address.clone(),
                secondary_defaults(target.motor.as_str()),
            )?;
        }
        Ok(())
    }

    /// Set one attribute directly, bypassing faults and the call log
    pub fn set_attribute(&self, address: &str, name: &str, value: Value) -> Result<()> {
        let mut state = self.lock()?;
        let device = state
            .devices
            .get_mut(address)
            .ok_or_else(|| DeviceError::NotConnected(address.to_string()))?;
        device.insert(name.to_string(), value);
        Ok(())
    }

    /// Current value of an attribute, bypassing faults and the call log
    pub fn attribute(&self, address: &str, name: &str) -> Option<Value> {
        self.lock()
            .ok()?
            .devices
            .get(address)
            .and_then(|device| device.get(name).cloned())
    }

    /// Reads of `name` report no defined value
    pub fn mark_undefined(&self, address: &str, name: &str) -> Result<()> {
        self.with_faults(address, |faults| {
            faults.undefined.insert(name.to_string());
        })
    }

    /// Reads of `name` return an undecodable payload
    pub fn mark_undecodable(&self, address: &str, name: &str) -> Result<()> {
        self.with_faults(address, |faults| {
            faults.undecodable.insert(name.to_string());
        })
    }

    /// Reads of `name` fail with a communication error
    pub fn mark_unreachable(&self, address: &str, name: &str) -> Result<()> {
        self.with_faults(address, |faults| {
            faults.unreachable.insert(name.to_string());
        })
    }

    /// The next `times` writes of `name` are rejected
    pub fn fail_writes(&self, address: &str, name: &str, times: usize) -> Result<()> {
        self.with_faults(address, |faults| {
            faults.failing_writes.insert(name.to_string(), times);
        })
    }

    /// The next `times` commits are rejected
    pub fn reject_commits(&self, address: &str, times: usize) -> Result<()> {
        self.with_faults(address, |faults| {
            faults.commit_rejections = times;
        })
    }

    /// Every call made through endpoints of this bus, in order
    pub fn calls(&self) -> Vec<BusCall> {
        self.lock().map(|state| state.calls.clone()).unwrap_or_default()
    }

    /// Writes made through endpoints of this bus, as (address, attribute, value)
    pub fn writes(&self) -> Vec<(String, String, Value)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BusCall::Write { address, attribute, value } => Some((address, attribute, value)),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) -> Result<()> {
        self.lock()?.calls.clear();
        Ok(())
    }

    /// Handle to the endpoint at `address`
    pub fn endpoint(&self, address: &str, class: EndpointClass) -> Result<SimulatedEndpoint> {
        if !self.lock()?.devices.contains_key(address) {
            return Err(DeviceError::NotConnected(address.to_string()));
        }

        Ok(SimulatedEndpoint {
            address: address.to_string(),
            class,
            bus: self.clone(),
        })
    }

    fn with_faults<F: FnOnce(&mut Faults)>(&self, address: &str, apply: F) -> Result<()> {
        let mut state = self.lock()?;
        apply(state.faults.entry(address.to_string()).or_default());
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BusState>> {
        self.state
            .lock()
            .map_err(|_| DeviceError::Other("Failed to acquire lock on simulated bus".to_string()))
    }
}

#[async_trait]
impl EndpointConnector for SimulatedBus {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn connect(&self, address: &str, class: EndpointClass) -> Result<Arc<dyn Endpoint>> {
        Ok(Arc::new(self.endpoint(address, class)?))
    }
}

/// Handle to one endpoint on a [`SimulatedBus`]
#[derive(Debug, Clone)]
pub struct SimulatedEndpoint {
    address: String,
    class: EndpointClass,
    bus: SimulatedBus,
}

impl SimulatedEndpoint {
    fn not_found(&self, name: &str) -> DeviceError {
        DeviceError::AttributeNotFound {
            device: self.address.clone(),
            attribute: name.to_string(),
        }
    }

    fn is_delay_attribute(&self, name: &str) -> bool {
        AttributeKey::new(self.class, name).as_str() == keys::CURRENT_DELAY_TIME
    }
}

#[async_trait]
impl Endpoint for SimulatedEndpoint {
    fn address(&self) -> &str {
        &self.address
    }

    fn class(&self) -> EndpointClass {
        self.class
    }

    async fn list_attributes(&self) -> Result<Vec<String>> {
        let state = self.bus.lock()?;
        let device = state
            .devices
            .get(&self.address)
            .ok_or_else(|| DeviceError::NotConnected(self.address.clone()))?;
        Ok(device.keys().cloned().collect())
    }

    async fn read_attribute(&self, name: &str) -> Result<Value> {
        let mut state = self.bus.lock()?;
        state.calls.push(BusCall::Read {
            address: self.address.clone(),
            attribute: name.to_string(),
        });

        if let Some(faults) = state.faults.get(&self.address) {
            if faults.undefined.contains(name) {
                return Err(DeviceError::NoValue {
                    device: self.address.clone(),
                    attribute: name.to_string(),
                });
            }
            if faults.undecodable.contains(name) {
                return Err(DeviceError::Decode {
                    device: self.address.clone(),
                    attribute: name.to_string(),
                    reason: "unsupported data format".to_string(),
                });
            }
            if faults.unreachable.contains(name) {
                return Err(DeviceError::CommunicationError(format!(
                    "{} did not answer a read of {}",
                    self.address, name
                )));
            }
        }

        state
            .devices
            .get(&self.address)
            .and_then(|device| device.get(name).cloned())
            .ok_or_else(|| self.not_found(name))
    }

    async fn write_attribute(&self, name: &str, value: Value) -> Result<()> {
        let mut state = self.bus.lock()?;
        state.calls.push(BusCall::Write {
            address: self.address.clone(),
            attribute: name.to_string(),
            value: value.clone(),
        });

        if let Some(remaining) = state
            .faults
            .get_mut(&self.address)
            .and_then(|faults| faults.failing_writes.get_mut(name))
        {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DeviceError::WriteRejected {
                    device: self.address.clone(),
                    attribute: name.to_string(),
                    reason: "device busy".to_string(),
                });
            }
        }

        // The power stage accepts table codes but reports milliseconds
        let stored = if self.is_delay_attribute(name) {
            let code = value.as_integer().ok_or_else(|| DeviceError::WriteRejected {
                device: self.address.clone(),
                attribute: name.to_string(),
                reason: format!("{} is not a table code", value),
            })?;
            let ms = delay::displayed_for(code).ok_or_else(|| DeviceError::WriteRejected {
                device: self.address.clone(),
                attribute: name.to_string(),
                reason: format!("no table entry for code {}", code),
            })?;
            Value::Integer(ms)
        } else {
            value
        };

        let device = state
            .devices
            .get_mut(&self.address)
            .ok_or_else(|| DeviceError::NotConnected(self.address.clone()))?;
        match device.get_mut(name) {
            Some(slot) => {
                *slot = stored;
                Ok(())
            }
            None => Err(self.not_found(name)),
        }
    }

    async fn commit(&self) -> Result<CommitStatus> {
        if self.class != EndpointClass::Secondary {
            return Err(DeviceError::Unsupported(format!(
                "commit on {} endpoint {}",
                self.class, self.address
            )));
        }

        {
            let mut state = self.bus.lock()?;
            state.calls.push(BusCall::Commit {
                address: self.address.clone(),
            });

            if let Some(faults) = state.faults.get_mut(&self.address) {
                if faults.commit_rejections > 0 {
                    faults.commit_rejections -= 1;
                    return Ok(CommitStatus::Rejected("EPROM write refused".to_string()));
                }
            }
        }

        self.bus.save()?;
        Ok(CommitStatus::Committed)
    }
}

fn primary_defaults() -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("Acceleration".to_string(), Value::Float(40000.0)),
        ("Conversion".to_string(), Value::Float(0.00125)),
        ("BaseRate".to_string(), Value::Integer(200)),
        ("SlewRate".to_string(), Value::Integer(4000)),
        ("SlewRateMax".to_string(), Value::Integer(8000)),
        ("Position".to_string(), Value::Float(0.0)),
        ("StepPositionController".to_string(), Value::Integer(0)),
    ])
}

fn secondary_defaults(axis_name: &str) -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("AxisName".to_string(), Value::String(axis_name.to_string())),
        ("RunCurrent".to_string(), Value::Float(1.2)),
        ("StopCurrent".to_string(), Value::Float(0.6)),
        ("BoostCurrent".to_string(), Value::Float(1.5)),
        ("CurrentDelayTime".to_string(), Value::Integer(20)),
        ("StepResolution".to_string(), Value::Integer(8)),
        ("Deactivation".to_string(), Value::Integer(0)),
        ("Temperature".to_string(), Value::Float(31.5)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const OMS: &str = "p022/motor/EH1A.01";
    const ZMX: &str = "p022/ZMX/EH1A.01";

    fn bus() -> SimulatedBus {
        let bus = SimulatedBus::new();
        bus.insert_device(OMS, primary_defaults()).unwrap();
        bus.insert_device(ZMX, secondary_defaults("EH1A.01")).unwrap();
        bus
    }

    #[tokio::test]
    async fn test_read_and_write() {
        let bus = bus();
        let oms = bus.endpoint(OMS, EndpointClass::Primary).unwrap();

        assert_eq!(oms.read_attribute("SlewRate").await.unwrap(), Value::Integer(4000));
        oms.write_attribute("SlewRate", Value::Integer(5000)).await.unwrap();
        assert_eq!(bus.attribute(OMS, "SlewRate"), Some(Value::Integer(5000)));

        let err = oms.read_attribute("Missing").await.unwrap_err();
        assert!(matches!(err, DeviceError::AttributeNotFound { .. }));
        assert_eq!(bus.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_list_attributes() {
        let bus = bus();
        let zmx = bus.endpoint(ZMX, EndpointClass::Secondary).unwrap();
        let names = zmx.list_attributes().await.unwrap();
        assert_eq!(names.len(), 8);
        assert!(names.contains(&"AxisName".to_string()));
    }

    #[tokio::test]
    async fn test_read_faults() {
        let bus = bus();
        bus.mark_undefined(OMS, "Position").unwrap();
        bus.mark_undecodable(OMS, "Conversion").unwrap();
        let oms = bus.endpoint(OMS, EndpointClass::Primary).unwrap();

        assert!(oms.read_attribute("Position").await.unwrap_err().is_soft_read_failure());
        assert!(oms.read_attribute("Conversion").await.unwrap_err().is_soft_read_failure());
    }

    #[tokio::test]
    async fn test_write_fault_is_consumed() {
        let bus = bus();
        bus.fail_writes(OMS, "BaseRate", 1).unwrap();
        let oms = bus.endpoint(OMS, EndpointClass::Primary).unwrap();

        assert!(oms.write_attribute("BaseRate", Value::Integer(300)).await.is_err());
        assert!(oms.write_attribute("BaseRate", Value::Integer(300)).await.is_ok());
        assert_eq!(bus.attribute(OMS, "BaseRate"), Some(Value::Integer(300)));
    }

    #[tokio::test]
    async fn test_delay_is_stored_as_milliseconds() {
        let bus = bus();
        let zmx = bus.endpoint(ZMX, EndpointClass::Secondary).unwrap();

        zmx.write_attribute("CurrentDelayTime", Value::Integer(10)).await.unwrap();
        assert_eq!(bus.attribute(ZMX, "CurrentDelayTime"), Some(Value::Integer(40)));
        assert!(zmx
            .write_attribute("CurrentDelayTime", Value::Integer(99))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_commit_only_on_secondary() {
        let bus = bus();
        let oms = bus.endpoint(OMS, EndpointClass::Primary).unwrap();
        let zmx = bus.endpoint(ZMX, EndpointClass::Secondary).unwrap();

        assert!(matches!(oms.commit().await, Err(DeviceError::Unsupported(_))));
        assert_eq!(zmx.commit().await.unwrap(), CommitStatus::Committed);

        bus.reject_commits(ZMX, 1).unwrap();
        assert!(!zmx.commit().await.unwrap().is_success());
        assert!(zmx.commit().await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_commit_persists_state_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let bus = bus().with_state_file(&path);
        let zmx = bus.endpoint(ZMX, EndpointClass::Secondary).unwrap();
        zmx.write_attribute("RunCurrent", Value::Float(0.9)).await.unwrap();
        zmx.commit().await.unwrap();

        let reloaded = SimulatedBus::load(&path).unwrap();
        assert_eq!(reloaded.attribute(ZMX, "RunCurrent"), Some(Value::Float(0.9)));
        assert_eq!(
            reloaded.attribute(ZMX, "AxisName"),
            Some(Value::String("EH1A.01".to_string()))
        );
    }

    #[tokio::test]
    async fn test_connect_unknown_address() {
        let bus = bus();
        let err = bus
            .connect("p022/motor/EH1A.02", EndpointClass::Primary)
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::NotConnected(_)));
    }
}
