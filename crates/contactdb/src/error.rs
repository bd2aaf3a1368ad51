//! Error types for contact lookups

use std::fmt;
use std::time::Duration;

/// Result type alias for contact lookups
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for contact lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The artificial delay was cancelled before it elapsed
    Interrupted,

    /// Gave up waiting on another caller's in-flight load
    Timeout(Duration),

    /// Rejected configuration value
    InvalidConfig(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Interrupted => write!(f, "Load interrupted while waiting on the slow backend"),
            Error::Timeout(after) => {
                write!(f, "Timed out after {:?} waiting for an in-flight load", after)
            }
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
