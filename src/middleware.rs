//! Framework-agnostic per-request glue around [`AtomicCounter`].
//!
//! The host framework supplies its request type as the context `C`, copies
//! [`RateLimitDecision::headers`] onto its response, and maps
//! [`MiddlewareError::RateLimited`] to a rejection carrying
//! [`MiddlewareError::status_code`].

use crate::{
    AtomicCounter, CounterKey, CounterStore, DeriveFn, DolphError, ExpirySeconds, QuotaExceeded,
    RateLimitDecision, RateLimiterOptions, RedisCounterStore, RequestLimit, Setting,
};

/// Result of a call that was not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The bypass predicate skipped the check. Nothing was counted.
    Bypassed,
    /// The call was counted and is within its limit.
    Admitted(RateLimitDecision),
}

/// Failure of [`RateLimitMiddleware::check`].
#[derive(Debug, thiserror::Error)]
pub enum MiddlewareError {
    /// The call went over its limit.
    #[error("{exceeded}")]
    RateLimited {
        /// Status the host should respond with.
        status: u16,
        /// Offending count, limit and TTL.
        exceeded: QuotaExceeded,
        /// The full decision, for the quota headers.
        decision: RateLimitDecision,
    },
    /// The counter could not be read.
    #[error(transparent)]
    Store(#[from] DolphError),
}

impl MiddlewareError {
    /// Whether this is a quota rejection rather than an infrastructure failure.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Status for a quota rejection.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::RateLimited { status, .. } => Some(*status),
            Self::Store(_) => None,
        }
    }

    /// Decision behind a quota rejection.
    pub fn decision(&self) -> Option<&RateLimitDecision> {
        match self {
            Self::RateLimited { decision, .. } => Some(decision),
            Self::Store(_) => None,
        }
    }
}

/// Applies a fixed-window quota to each call.
pub struct RateLimitMiddleware<C, S> {
    counter: AtomicCounter<S>,
    key_function: DeriveFn<C, String>,
    expiry: Setting<C, u64>,
    limit: Setting<C, u64>,
    apply_limit: Setting<C, bool>,
    rejection_status: u16,
}

impl<C> RateLimitMiddleware<C, RedisCounterStore> {
    /// Open the store described by `options.store` and build the middleware.
    pub async fn connect(options: RateLimiterOptions<C>) -> Result<Self, DolphError> {
        let store = options.store.clone().open().await?;
        Ok(Self::new(options, store))
    }
}

impl<C, S> RateLimitMiddleware<C, S>
where
    S: CounterStore,
{
    /// Build the middleware over `store`, ignoring `options.store`.
    pub fn new(options: RateLimiterOptions<C>, store: S) -> Self {
        let counter = AtomicCounter::new(store, options.script_source)
            .with_prefix(options.prefix)
            .with_retry_budget(options.retry_budget);

        Self {
            counter,
            key_function: options.key_function,
            expiry: options.expiry,
            limit: options.limit,
            apply_limit: options.apply_limit,
            rejection_status: options.rejection_status,
        }
    }

    /// The counter behind this middleware.
    pub fn counter(&self) -> &AtomicCounter<S> {
        &self.counter
    }

    /// Count the call described by `ctx` and decide whether to admit it.
    pub async fn check(&self, ctx: &C) -> Result<Outcome, MiddlewareError> {
        if !self.apply_limit.resolve(ctx) {
            return Ok(Outcome::Bypassed);
        }

        let key = CounterKey::try_from((self.key_function)(ctx))?;
        let expiry = ExpirySeconds::try_from(self.expiry.resolve(ctx))?;

        let reply = self.counter.check_and_increment(&key, expiry).await?;

        let limit = RequestLimit::from(self.limit.resolve(ctx));
        let decision = RateLimitDecision::evaluate(reply.count, reply.ttl_seconds, limit);

        match decision.into_result() {
            Ok(decision) => Ok(Outcome::Admitted(decision)),
            Err(exceeded) => {
                tracing::debug!(
                    %key,
                    count = exceeded.count,
                    limit = exceeded.limit,
                    ttl_seconds = exceeded.ttl_seconds,
                    "Rate limit exceeded"
                );

                Err(MiddlewareError::RateLimited {
                    status: self.rejection_status,
                    exceeded,
                    decision,
                })
            }
        }
    }
}
