use std::path::PathBuf;

use crate::ScriptHash;

/// Error type for this crate.
#[derive(Debug, thiserror::Error)]
pub enum DolphError {
    /// Redis error.
    #[error("redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// The store no longer recognises the registered counting program.
    #[error("store does not recognise script {0}")]
    UnknownScript(ScriptHash),

    /// The counting program could not be read from disk.
    #[error("unable to read counting script at {}: {source}", path.display())]
    ScriptRead {
        /// Location the program was read from.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A required option was not supplied and has no default.
    #[error("{0} required")]
    MissingOption(&'static str),

    /// Invalid counter key.
    #[error("invalid counter key: {0}")]
    InvalidCounterKey(String),

    /// Invalid window expiry.
    #[error("invalid expiry: {0}")]
    InvalidExpiry(String),

    /// Invalid retry budget.
    #[error("invalid retry budget: {0}")]
    InvalidRetryBudget(String),

    /// Invalid store connection count.
    #[error("invalid store connection count: {0}")]
    InvalidConnectionCount(String),
}

impl DolphError {
    /// Whether this error means the store has forgotten a previously registered script.
    pub fn is_unknown_script(&self) -> bool {
        matches!(self, Self::UnknownScript(_))
    }
}

/// Comparison with a plain message, used by validation tests.
impl PartialEq<&str> for DolphError {
    fn eq(&self, other: &&str) -> bool {
        match self {
            Self::InvalidCounterKey(msg)
            | Self::InvalidExpiry(msg)
            | Self::InvalidRetryBudget(msg)
            | Self::InvalidConnectionCount(msg) => msg == other,
            _ => false,
        }
    }
}
