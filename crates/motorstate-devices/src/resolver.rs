/*!
 * Device name resolution.
 *
 * Maps a server group and an optional list of device indices onto motor
 * identifiers and the addresses of their two endpoints.
 */
use std::collections::BTreeSet;

use tracing::debug;

use motorstate_core::config::DevicesConfig;
use motorstate_core::types::{EndpointClass, MotorId};

use crate::device::{DeviceError, Result};

/// One motor and the addresses of its endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotorTarget {
    /// Motor identifier, e.g. `EH1A.07`
    pub motor: MotorId,
    /// Address of the primary (`oms`) endpoint
    pub primary_address: String,
    /// Address of the secondary (`zmx`) endpoint
    pub secondary_address: String,
}

impl MotorTarget {
    /// Address of the endpoint of `class`
    pub fn address(&self, class: EndpointClass) -> &str {
        match class {
            EndpointClass::Primary => &self.primary_address,
            EndpointClass::Secondary => &self.secondary_address,
        }
    }
}

/// Resolves server groups into motor targets
#[derive(Debug, Clone)]
pub struct DeviceNameResolver {
    devices: DevicesConfig,
}

impl DeviceNameResolver {
    /// Create a resolver over the configured server groups
    pub fn new(devices: DevicesConfig) -> Self {
        Self { devices }
    }

    /// Override the beamline prefix of every address
    pub fn with_beamline<S: Into<String>>(mut self, beamline: S) -> Self {
        self.devices.beamline = beamline.into();
        self
    }

    /// Resolve the motors of `group`
    ///
    /// Without `ids` every device `1..=N` of the group is returned. Explicit
    /// ids must lie inside that range.
    pub fn resolve(&self, group: &str, ids: Option<&[u32]>) -> Result<Vec<MotorTarget>> {
        let config = self
            .devices
            .server_group(group)
            .ok_or_else(|| DeviceError::UnknownServerGroup(group.to_string()))?;

        let indices: BTreeSet<u32> = match ids {
            Some(ids) => {
                for &index in ids {
                    if index == 0 || index > config.devices {
                        return Err(DeviceError::DeviceOutOfRange {
                            group: config.name.clone(),
                            index,
                            max: config.devices,
                        });
                    }
                }
                ids.iter().copied().collect()
            }
            None => (1..=config.devices).collect(),
        };

        debug!("Resolved {} motors in server group {}", indices.len(), config.name);

        Ok(indices
            .into_iter()
            .map(|index| self.target(&config.name, index))
            .collect())
    }

    fn target(&self, group: &str, index: u32) -> MotorTarget {
        let motor = MotorId::from_group(group, index);
        MotorTarget {
            primary_address: format!(
                "{}/{}/{}",
                self.devices.beamline, self.devices.primary_domain, motor
            ),
            secondary_address: format!(
                "{}/{}/{}",
                self.devices.beamline, self.devices.secondary_domain, motor
            ),
            motor,
        }
    }
}

/// Widest range a device-id list may contain
pub const MAX_RANGE: u32 = 10_000;

/// Parse a device-id list such as `1,2,7` or `3-6,9`
pub fn parse_device_ids(text: &str) -> Result<Vec<u32>> {
    let parse = |s: &str| {
        s.trim()
            .parse::<u32>()
            .map_err(|_| DeviceError::InvalidDeviceList(format!("'{}' is not a device number", s)))
    };

    let mut ids = BTreeSet::new();
    for part in text.split(',') {
        if part.trim().is_empty() {
            return Err(DeviceError::InvalidDeviceList(format!(
                "empty entry in '{}'",
                text
            )));
        }

        match part.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (parse(start)?, parse(end)?);
                if start > end {
                    return Err(DeviceError::InvalidDeviceList(format!(
                        "descending range '{}'",
                        part
                    )));
                }
                if end - start >= MAX_RANGE {
                    return Err(DeviceError::InvalidDeviceList(format!(
                        "range '{}' spans more than {} devices",
                        part.trim(),
                        MAX_RANGE
                    )));
                }
                ids.extend(start..=end);
            }
            None => {
                ids.insert(parse(part)?);
            }
        }
    }

    Ok(ids.into_iter().collect())
}
