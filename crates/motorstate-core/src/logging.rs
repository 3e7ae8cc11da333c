/*!
 * Tracing setup and the spans motorstate runs are logged under.
 *
 * A run logs inside one `session` span naming the device backend. Every read
 * or write-back of a motor opens a `motor` span below it.
 */
use tracing::Span;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{Error, Result};
use crate::types::MotorId;

/// Install the global subscriber
///
/// `RUST_LOG` overrides `filter` when it is set. Fails if a subscriber is
/// already installed.
pub fn install(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init()
        .map_err(|e| Error::runtime(format!("Failed to install log subscriber: {}", e)))
}

/// Span of one run against `backend`
pub fn session_span(backend: &str) -> Span {
    tracing::info_span!("session", backend = %backend)
}

/// Span of `operation` on one motor
pub fn motor_span(operation: &'static str, motor: &MotorId) -> Span {
    tracing::info_span!("motor", op = operation, motor = %motor)
}
