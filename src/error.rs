//! Error types for Spam Sieve.

use crate::pipeline::types::MessageId;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("Classify error: {0}")]
    Classify(#[from] ClassifyError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to load fixture: {0}")]
    Fixture(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// User or batch lookup failures.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("Malformed email: {0:?}")]
    MalformedEmail(String),

    #[error("No user registered for {0}")]
    UnknownUser(String),

    #[error("Batch of {size} users exceeds the limit of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("Lookup service unavailable: {0}")]
    Unavailable(String),
}

/// Spam classifier failures.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("Unknown message {0}")]
    UnknownMessage(MessageId),

    #[error("Classifier unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
