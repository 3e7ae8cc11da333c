/*!
 * Endpoint implementations for motorstate.
 */

pub mod simulated;

pub use simulated::{BusCall, DeviceTable, SimulatedBus, SimulatedEndpoint};
