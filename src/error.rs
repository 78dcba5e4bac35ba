//! Error types for seed entry and offline signing

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for coldroll
#[derive(Error, Debug)]
pub enum Error {
    // Operator input errors
    #[error("{0}")]
    InvalidInput(String),

    #[error("Aborted: {0}")]
    Aborted(String),

    // Seed integrity errors
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    // External wallet program errors
    #[error("External process error: {0}")]
    ExternalProcess(String),

    #[error("External process timed out after {0}s")]
    ProcessTimeout(u64),

    // Startup resource errors
    #[error("Resource error: {0}")]
    Resource(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Key derivation errors
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if the current step can be retried without losing the run
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_) | Error::ExternalProcess(_) | Error::ProcessTimeout(_)
        )
    }

    /// Check if this error must terminate the run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Integrity(_) | Error::Resource(_) | Error::Config(_) | Error::Aborted(_)
        )
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
