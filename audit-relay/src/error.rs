//! Error types for the logging and audit pipeline
//!
//! Startup problems (missing broker parameters, malformed configuration) are
//! fatal and surface through [`Error`]. Failures on the logging path itself
//! (formatting, broker delivery, reference extraction) are recovered locally
//! and only ever reach the log stream.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the pipeline
///
/// Large error variants are boxed to reduce stack size
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be extracted from its sources
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Required configuration missing or malformed
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Broker connection or delivery error
    #[error("Broker error: {0}")]
    Broker(String),

    /// Event could not be serialized
    #[error("Format error: {0}")]
    Format(#[from] serde_json::Error),

    /// Property file could not be read, written or replaced
    #[error("Property file error ({}): {message}", path.display())]
    PropertyFile {
        /// File being loaded or updated
        path: PathBuf,
        /// What went wrong
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The sink no longer accepts events
    #[error("Log sink is closed")]
    SinkClosed,

    /// Shutdown could not drain every queued event in time
    #[error("Drain did not complete within {0:?}")]
    DrainTimeout(Duration),
}

impl Error {
    /// Create a property file error for `path`
    pub fn property_file(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::PropertyFile {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this error must abort process startup
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::Configuration(_) | Error::PropertyFile { .. }
        )
    }
}

// Manual From implementation for boxed errors
impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}
