use std::future::Future;

use crate::{CounterKey, DolphError, ExpirySeconds, ScriptHash};

/// Reply of one run of the counting program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterReply {
    /// Counter value after this increment.
    pub count: u64,
    /// Seconds until the current window ends.
    pub ttl_seconds: u64,
}

impl CounterReply {
    /// Build a reply from the raw `(count, ttl)` pair returned by the store.
    ///
    /// Negative values are store sentinels (no key, no expiry) and map to 0.
    pub fn from_raw(count: i64, ttl_seconds: i64) -> Self {
        Self {
            count: count.max(0) as u64,
            ttl_seconds: ttl_seconds.max(0) as u64,
        }
    }
}

/// A shared key-value store able to run registered programs atomically.
///
/// Implementations must run the counting program as one indivisible operation
/// and must report a handle they do not know as [`DolphError::UnknownScript`],
/// distinct from every other failure.
pub trait CounterStore: Send + Sync {
    /// Register `source` and return its handle.
    fn load_script(
        &self,
        source: &str,
    ) -> impl Future<Output = Result<ScriptHash, DolphError>> + Send;

    /// Run the program registered as `hash` against `key`.
    ///
    /// The program increments `key`, sets its expiry to `expiry` if the
    /// increment created it, and returns the new count with the remaining TTL.
    fn eval_counter(
        &self,
        hash: &ScriptHash,
        key: &CounterKey,
        expiry: ExpirySeconds,
    ) -> impl Future<Output = Result<CounterReply, DolphError>> + Send;
}
