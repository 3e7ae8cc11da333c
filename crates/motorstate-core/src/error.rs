/*!
 * Error types for the motorstate core crate.
 */
use thiserror::Error;

/// Error type for core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Runtime error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new configuration error
    pub fn config<S: AsRef<str>>(msg: S) -> Self {
        Error::Config(msg.as_ref().to_string())
    }

    /// Create a new runtime error
    pub fn runtime<S: AsRef<str>>(msg: S) -> Self {
        Error::Runtime(msg.as_ref().to_string())
    }

    /// Create a new validation error
    pub fn validation<S: AsRef<str>>(msg: S) -> Self {
        Error::Validation(msg.as_ref().to_string())
    }

    /// Create a new timeout error
    pub fn timeout<S: AsRef<str>>(msg: S) -> Self {
        Error::Timeout(msg.as_ref().to_string())
    }

    /// Create a new other error
    pub fn other<S: AsRef<str>>(msg: S) -> Self {
        Error::Other(msg.as_ref().to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}
