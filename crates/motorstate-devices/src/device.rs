/*!
 * Endpoint trait and core device abstractions.
 *
 * A motor is driven by two cooperating control-system endpoints. This module
 * defines the capability set the engine needs from each of them.
 */
use std::fmt::{self, Debug};

use async_trait::async_trait;
use thiserror::Error;

use motorstate_core::{
    error::Error as CoreError,
    types::{EndpointClass, Value},
};

/// Error type for endpoint operations
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The endpoint could not be reached
    #[error("Device {0} not connected")]
    NotConnected(String),

    /// The endpoint has no attribute with this name
    #[error("Attribute {attribute} not found on {device}")]
    AttributeNotFound {
        /// Endpoint address
        device: String,
        /// Attribute name
        attribute: String,
    },

    /// The device reports no defined value for the attribute
    #[error("Attribute {attribute} on {device} has no value")]
    NoValue {
        /// Endpoint address
        device: String,
        /// Attribute name
        attribute: String,
    },

    /// The attribute payload could not be decoded
    #[error("Attribute {attribute} on {device} could not be decoded: {reason}")]
    Decode {
        /// Endpoint address
        device: String,
        /// Attribute name
        attribute: String,
        /// Decoder message
        reason: String,
    },

    /// The device refused a write
    #[error("Write of {attribute} on {device} rejected: {reason}")]
    WriteRejected {
        /// Endpoint address
        device: String,
        /// Attribute name
        attribute: String,
        /// Device message
        reason: String,
    },

    /// The operation is not supported by this endpoint
    #[error("Operation not supported: {0}")]
    Unsupported(String),

    /// The server group is not configured
    #[error("Unknown server group: {0}")]
    UnknownServerGroup(String),

    /// A device index lies outside the server group
    #[error("Device {index} is outside server group {group} (1..={max})")]
    DeviceOutOfRange {
        /// Server group name
        group: String,
        /// Requested index
        index: u32,
        /// Highest index of the group
        max: u32,
    },

    /// A device-id list could not be parsed
    #[error("Invalid device list: {0}")]
    InvalidDeviceList(String),

    /// Communication error with the device
    #[error("Communication error: {0}")]
    CommunicationError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),

    /// Core error
    #[error("Core error: {0}")]
    CoreError(#[from] CoreError),
}

impl DeviceError {
    /// Check if this is a read failure that is recorded as a sentinel
    /// rather than propagated
    pub fn is_soft_read_failure(&self) -> bool {
        matches!(self, DeviceError::NoValue { .. } | DeviceError::Decode { .. })
    }

    /// Check if this error comes from naming or configuration rather than
    /// from talking to a device
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DeviceError::UnknownServerGroup(_)
                | DeviceError::DeviceOutOfRange { .. }
                | DeviceError::InvalidDeviceList(_)
                | DeviceError::CoreError(CoreError::Config(_))
        )
    }
}

impl From<serde_json::Error> for DeviceError {
    fn from(err: serde_json::Error) -> Self {
        DeviceError::Serialization(err.to_string())
    }
}

/// Result type for endpoint operations
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Outcome of a commit request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStatus {
    /// Written values are now non-volatile
    Committed,
    /// The device refused to commit
    Rejected(String),
}

impl CommitStatus {
    /// Check if the commit succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, CommitStatus::Committed)
    }
}

impl fmt::Display for CommitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitStatus::Committed => f.write_str("committed"),
            CommitStatus::Rejected(reason) => write!(f, "rejected ({})", reason),
        }
    }
}

/// A live handle to one control-system endpoint
///
/// Connection establishment is done by an
/// [`EndpointConnector`](crate::connector::EndpointConnector); a handle is
/// assumed connected for its whole lifetime.
#[async_trait]
pub trait Endpoint: Send + Sync + Debug {
    /// Address of the endpoint, e.g. `p022/ZMX/EH1A.07`
    fn address(&self) -> &str;

    /// Which of the two motor endpoints this is
    fn class(&self) -> EndpointClass;

    /// Names of every attribute the endpoint currently exposes
    async fn list_attributes(&self) -> Result<Vec<String>>;

    /// Read an attribute value
    async fn read_attribute(&self, name: &str) -> Result<Value>;

    /// Write an attribute value
    async fn write_attribute(&self, name: &str, value: Value) -> Result<()>;

    /// Make written values non-volatile
    ///
    /// Only secondary endpoints support this.
    async fn commit(&self) -> Result<CommitStatus> {
        Err(DeviceError::Unsupported(format!(
            "commit on {} endpoint {}",
            self.class(),
            self.address()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_read_failures() {
        let no_value = DeviceError::NoValue {
            device: "p022/motor/EH1A.01".to_string(),
            attribute: "Position".to_string(),
        };
        assert!(no_value.is_soft_read_failure());
        assert_eq!(
            no_value.to_string(),
            "Attribute Position on p022/motor/EH1A.01 has no value"
        );

        let decode = DeviceError::Decode {
            device: "p022/motor/EH1A.01".to_string(),
            attribute: "Status".to_string(),
            reason: "bad utf-8".to_string(),
        };
        assert!(decode.is_soft_read_failure());

        assert!(!DeviceError::NotConnected("x".to_string()).is_soft_read_failure());
    }

    #[test]
    fn test_configuration_errors() {
        assert!(DeviceError::UnknownServerGroup("EH9".to_string()).is_configuration());
        assert!(DeviceError::DeviceOutOfRange {
            group: "EH1A".to_string(),
            index: 50,
            max: 47,
        }
        .is_configuration());
        assert!(!DeviceError::CommunicationError("timeout".to_string()).is_configuration());
    }

    #[test]
    fn test_commit_status() {
        assert!(CommitStatus::Committed.is_success());
        let rejected = CommitStatus::Rejected("EPROM busy".to_string());
        assert!(!rejected.is_success());
        assert_eq!(rejected.to_string(), "rejected (EPROM busy)");
    }
}
