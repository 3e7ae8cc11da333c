/*!
 * motorstate core
 *
 * This crate provides the shared foundation of motorstate: the snapshot data
 * model, configuration, logging and small async utilities.
 */

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod types;
pub mod utils;

/// Re-export of dependencies that are part of the public API
pub mod deps {
    pub use chrono;
    pub use tokio;
    pub use tracing;
}

/// motorstate core crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library initialization with the given log filter
pub fn init(filter: &str) -> Result<(), error::Error> {
    logging::install(filter)?;
    tracing::debug!("motorstate core {} initialized", VERSION);
    Ok(())
}
