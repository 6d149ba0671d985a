use std::sync::Arc;

use crate::{
    CounterKey, CounterReply, CounterStore, DolphError, ExpirySeconds, RetryBudget, ScriptCache,
    ScriptSource,
};

/// Atomic fixed-window counter.
///
/// Runs the counting program against one key per call. The program handle is
/// registered lazily and cached; when the store reports it unknown the handle
/// is dropped, the program registered again and the call retried, up to the
/// configured [`RetryBudget`]. No counting happens in this process: the store
/// increments, sets the expiry on creation and reads the TTL in one step.
///
/// Clones share the handle cache.
#[derive(Clone, Debug)]
pub struct AtomicCounter<S> {
    store: S,
    cache: Arc<ScriptCache>,
    source: ScriptSource,
    prefix: Arc<str>,
    retry_budget: RetryBudget,
}

impl<S> AtomicCounter<S>
where
    S: CounterStore,
{
    /// Create a counter over `store` that registers the program from `source`.
    pub fn new(store: S, source: ScriptSource) -> Self {
        Self {
            store,
            cache: Arc::new(ScriptCache::new()),
            source,
            prefix: Arc::from(""),
            retry_budget: RetryBudget::default(),
        }
    }

    /// Prepend `prefix` to every key passed to [`Self::check_and_increment`].
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Arc::from(prefix.into());
        self
    }

    /// Replace the default budget of 3 reload-and-retry cycles.
    pub fn with_retry_budget(mut self, retry_budget: RetryBudget) -> Self {
        self.retry_budget = retry_budget;
        self
    }

    /// Share `cache` with other counters talking to the same store.
    pub fn with_cache(mut self, cache: Arc<ScriptCache>) -> Self {
        self.cache = cache;
        self
    }

    /// The handle cache.
    pub fn cache(&self) -> &Arc<ScriptCache> {
        &self.cache
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The key prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Increment the counter for `prefix + key` and return it with the
    /// remaining window TTL.
    ///
    /// Fails with [`DolphError::InvalidCounterKey`] without touching the store
    /// when `prefix + key` is longer than 1024 bytes.
    pub async fn check_and_increment(
        &self,
        key: &CounterKey,
        expiry: ExpirySeconds,
    ) -> Result<CounterReply, DolphError> {
        let key = key.with_prefix(&self.prefix)?;
        self.execute(&key, expiry, self.retry_budget).await
    }

    /// Run the counting program against `key` as is.
    ///
    /// Each [`DolphError::UnknownScript`] reply consumes one retry and triggers a
    /// fresh registration. Once `retries` is spent, or on any other error, the
    /// error is returned unchanged.
    pub async fn execute(
        &self,
        key: &CounterKey,
        expiry: ExpirySeconds,
        retries: RetryBudget,
    ) -> Result<CounterReply, DolphError> {
        let mut retries_remaining = *retries;

        loop {
            let hash = self.cache.ensure_loaded(&self.store, &self.source).await?;

            match self.store.eval_counter(&hash, key, expiry).await {
                Ok(reply) => return Ok(reply),
                Err(err) if err.is_unknown_script() && retries_remaining > 0 => {
                    tracing::warn!(
                        script = %hash,
                        retries_remaining,
                        "Counting script unknown to store, registering again"
                    );

                    self.cache.invalidate_if(&hash);
                    retries_remaining -= 1;
                }
                Err(err) => {
                    if err.is_unknown_script() {
                        tracing::error!(error = %err, %key, "Retry budget exhausted");
                    }

                    return Err(err);
                }
            }
        }
    } // end method execute
}
