//! Error types for the hybrid engine.

use crate::Key;
use thiserror::Error;

/// All possible errors from the hybrid engine.
#[derive(Debug, Error)]
pub enum Error {
    // Validation errors
    #[error("invalid key: {0:?}")]
    InvalidKey(Key),

    #[error("key uses the reserved '@' namespace: {0}")]
    ReservedKey(Key),

    // Encoding errors
    #[error("codec error: {0}")]
    Codec(String),

    // Storage errors
    #[error("local storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote storage error: {0}")]
    Remote(String),
}

impl Error {
    /// Returns true if this error was raised by input validation before any I/O.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::InvalidKey(_) | Error::ReservedKey(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Codec(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
