/*!
 * Prelude module for motorstate core.
 *
 * This module re-exports commonly used types and functions from the core crate
 * to make them easier to import.
 */

// Re-export error types
pub use crate::error::{Error, Result};

// Re-export core types
pub use crate::types::{
    keys, AllowList, AttributeKey, AttributeMap, EndpointClass, MotorId, Snapshot, Value,
};

// Re-export config types
pub use crate::config::{Config, ConfigBuilder};

// Re-export utility functions
pub use crate::utils::{with_timeout, timestamp_suffix};

// Re-export logging helpers
pub use crate::logging::{motor_span, session_span};
pub use tracing::{debug, error, info, trace, warn};
