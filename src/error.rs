use thiserror::Error;

/// Reasons a session start timestamp could not be turned into an instant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("timestamp is empty")]
    Empty,

    /// The string has no `Z`/offset suffix and the policy refuses to guess.
    #[error("timestamp '{0}' has no timezone marker")]
    MissingTimezone(String),

    #[error("invalid timestamp '{0}'")]
    Invalid(String),

    /// Naive timestamp falls into a local DST gap.
    #[error("timestamp '{0}' does not exist in the local timezone")]
    NonexistentLocal(String),
}

/// Failures of the settings store.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
