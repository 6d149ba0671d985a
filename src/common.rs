use std::{fmt, ops::Deref, sync::Arc};

use crate::DolphError;

/// Window length applied when a counter is created, in seconds.
///
/// Fixed-window semantics: the expiry is set only when the counter is created and
/// is never extended by later increments within the same window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExpirySeconds(u64);

impl Default for ExpirySeconds {
    /// Returns a 60 second window.
    fn default() -> Self {
        Self(60)
    }
}

impl Deref for ExpirySeconds {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for ExpirySeconds {
    type Error = DolphError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err(DolphError::InvalidExpiry(
                "Expiry must be at least 1 second".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}

/// Maximum number of calls admitted within one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestLimit(u64);

impl Default for RequestLimit {
    /// Returns a limit of 100 calls per window.
    fn default() -> Self {
        Self(100)
    }
}

impl Deref for RequestLimit {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<u64> for RequestLimit {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Number of re-register-and-retry cycles allowed when the store forgets the
/// counting program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RetryBudget(u32);

impl RetryBudget {
    /// A budget that never retries.
    pub fn none() -> Self {
        Self(0)
    }
}

impl Default for RetryBudget {
    /// Returns a budget of 3 retries.
    fn default() -> Self {
        Self(3)
    }
}

impl Deref for RetryBudget {
    type Target = u32;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u32> for RetryBudget {
    type Error = DolphError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value > 16 {
            Err(DolphError::InvalidRetryBudget(
                "Retry budget must not exceed 16".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}

/// A validated counter key.
///
/// Identifies the quota bucket of one caller. Must not be empty and must not be
/// longer than 1024 bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CounterKey(Arc<str>);

impl CounterKey {
    /// Prepend `prefix` to this key.
    ///
    /// The combined key is held to the same 1024 byte limit.
    pub fn with_prefix(&self, prefix: &str) -> Result<CounterKey, DolphError> {
        if prefix.is_empty() {
            return Ok(self.clone());
        }

        Self::try_from(format!("{prefix}{}", self.0))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for CounterKey {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CounterKey {
    type Error = DolphError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err(DolphError::InvalidCounterKey(
                "Counter key must not be empty".to_string(),
            ))
        } else if value.len() > 1024 {
            Err(DolphError::InvalidCounterKey(
                "Counter key must not be longer than 1024 bytes".to_string(),
            ))
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}

impl TryFrom<&str> for CounterKey {
    type Error = DolphError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}
