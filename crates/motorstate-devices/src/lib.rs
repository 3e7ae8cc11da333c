/*!
 * motorstate devices
 *
 * This crate provides the endpoint abstraction through which motor controller
 * attributes are read and written, the resolver that names the motors of a
 * server group, and a file-backed simulated backend.
 */

#![warn(missing_docs)]

// Re-export core types
pub use motorstate_core::prelude;

pub mod connector;
pub mod device;
pub mod devices;
pub mod resolver;

// Re-export endpoint trait and basic types
pub use connector::{connect_pair, EndpointConnector, EndpointPair, TimedEndpoint};
pub use device::{CommitStatus, DeviceError, Endpoint, Result};
pub use devices::{BusCall, SimulatedBus, SimulatedEndpoint};
pub use resolver::{parse_device_ids, DeviceNameResolver, MotorTarget};

/// motorstate devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
