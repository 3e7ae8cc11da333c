/*!
 * Error types for the motorstate engine crate.
 */
use thiserror::Error;

use motorstate_devices::DeviceError;

/// Error type for engine operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed snapshot content
    #[error("Format error on line {line}: {message}")]
    Format {
        /// 1-based line number, 0 when not tied to a line
        line: usize,
        /// What is wrong with the line
        message: String,
    },

    /// Configuration error; never retried
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A snapshot does not cover a motor of the current run
    #[error("Snapshot has no entry for motor {0}")]
    MissingMotor(String),

    /// The device refused to commit written values
    #[error("Commit on {device} failed: {status}")]
    Commit {
        /// Secondary endpoint address
        device: String,
        /// Status reported by the device
        status: String,
    },

    /// A write-back failed twice and was rolled back
    #[error("Write-back of {motor} failed ({cause}); original values restored, aborting")]
    WriteBackAborted {
        /// Motor identifier
        motor: String,
        /// The failure that triggered the rollback
        cause: String,
    },

    /// Restoring original values after a failed write-back failed too
    #[error("Rollback of {motor} failed after write-back error ({cause})")]
    RollbackFailed {
        /// Motor identifier
        motor: String,
        /// The failure that triggered the rollback
        cause: String,
        /// The error raised while restoring
        #[source]
        source: Box<Error>,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Device error
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] motorstate_core::error::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new format error
    pub fn format<S: AsRef<str>>(line: usize, msg: S) -> Self {
        Error::Format {
            line,
            message: msg.as_ref().to_string(),
        }
    }

    /// Create a new configuration error
    pub fn configuration<S: AsRef<str>>(msg: S) -> Self {
        Error::Configuration(msg.as_ref().to_string())
    }

    /// Create a new validation error
    pub fn validation<S: AsRef<str>>(msg: S) -> Self {
        Error::Validation(msg.as_ref().to_string())
    }

    /// Create a new other error
    pub fn other<S: AsRef<str>>(msg: S) -> Self {
        Error::Other(msg.as_ref().to_string())
    }

    /// Check if the error is a configuration problem that retrying cannot fix
    pub fn is_configuration(&self) -> bool {
        match self {
            Error::Configuration(_) | Error::MissingMotor(_) => true,
            Error::Device(err) => err.is_configuration(),
            Error::Core(motorstate_core::error::Error::Config(_)) => true,
            _ => false,
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}
