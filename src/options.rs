//! Per-call configuration of [`RateLimitMiddleware`](crate::RateLimitMiddleware).
//!
//! Every policy value is either a literal or a function of the call context,
//! resolved once per call. Literals are validated when the options are built.

use std::{fmt, sync::Arc};

use crate::{
    DolphError, ExpirySeconds, RedisCounterStore, RequestLimit, RetryBudget, ScriptSource,
    StoreConnection,
};

/// Function deriving a value from the call context.
pub type DeriveFn<C, T> = Arc<dyn Fn(&C) -> T + Send + Sync>;

/// A policy value: fixed, or derived per call from the context `C`.
pub enum Setting<C, T> {
    /// The same value for every call.
    Fixed(T),
    /// Computed from the call context.
    Derived(DeriveFn<C, T>),
}

impl<C, T> Setting<C, T>
where
    T: Clone,
{
    /// Wrap a derivation function.
    pub fn derived<F>(f: F) -> Self
    where
        F: Fn(&C) -> T + Send + Sync + 'static,
    {
        Self::Derived(Arc::new(f))
    }

    /// The value for the call described by `ctx`.
    pub fn resolve(&self, ctx: &C) -> T {
        match self {
            Self::Fixed(value) => value.clone(),
            Self::Derived(f) => f(ctx),
        }
    }
}

impl<C, T: Clone> Clone for Setting<C, T> {
    fn clone(&self) -> Self {
        match self {
            Self::Fixed(value) => Self::Fixed(value.clone()),
            Self::Derived(f) => Self::Derived(f.clone()),
        }
    }
}

impl<C, T: fmt::Debug> fmt::Debug for Setting<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Self::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

/// How the middleware obtains its store.
#[derive(Debug, Clone)]
pub enum StoreSettings {
    /// A ready store.
    Store(RedisCounterStore),
    /// A pre-built client; one connection is opened from it.
    Client(redis::Client),
    /// Connection parameters.
    Connection(StoreConnection),
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self::Connection(StoreConnection::default())
    }
}

impl StoreSettings {
    /// Open the store these settings describe.
    pub async fn open(self) -> Result<RedisCounterStore, DolphError> {
        match self {
            Self::Store(store) => Ok(store),
            Self::Client(client) => RedisCounterStore::default_from_client(client).await,
            Self::Connection(connection) => RedisCounterStore::connect(&connection).await,
        }
    }
}

/// Validated configuration for [`RateLimitMiddleware`](crate::RateLimitMiddleware).
pub struct RateLimiterOptions<C> {
    /// Prepended to every derived key.
    pub prefix: String,
    /// Derives the caller's key fragment.
    pub key_function: DeriveFn<C, String>,
    /// Window length in seconds.
    pub expiry: Setting<C, u64>,
    /// Calls admitted per window.
    pub limit: Setting<C, u64>,
    /// Whether a call is counted at all.
    pub apply_limit: Setting<C, bool>,
    /// Status reported for rejected calls.
    pub rejection_status: u16,
    /// Store to count in.
    pub store: StoreSettings,
    /// Location of the counting program.
    pub script_source: ScriptSource,
    /// Reload-and-retry cycles when the store forgets the program.
    pub retry_budget: RetryBudget,
}

impl<C> RateLimiterOptions<C> {
    /// Start building options.
    pub fn builder() -> RateLimiterOptionsBuilder<C> {
        RateLimiterOptionsBuilder::default()
    }
}

impl<C> fmt::Debug for RateLimiterOptions<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiterOptions")
            .field("prefix", &self.prefix)
            .field("expiry", &self.expiry)
            .field("limit", &self.limit)
            .field("apply_limit", &self.apply_limit)
            .field("rejection_status", &self.rejection_status)
            .field("store", &self.store)
            .field("script_source", &self.script_source)
            .field("retry_budget", &self.retry_budget)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RateLimiterOptions`].
pub struct RateLimiterOptionsBuilder<C> {
    prefix: String,
    key_function: Option<DeriveFn<C, String>>,
    expiry: Setting<C, u64>,
    limit: Setting<C, u64>,
    apply_limit: Setting<C, bool>,
    rejection_status: u16,
    store: StoreSettings,
    script_source: ScriptSource,
    retry_budget: RetryBudget,
}

impl<C> Default for RateLimiterOptionsBuilder<C> {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            key_function: None,
            expiry: Setting::Fixed(*ExpirySeconds::default()),
            limit: Setting::Fixed(*RequestLimit::default()),
            apply_limit: Setting::Fixed(true),
            rejection_status: 403,
            store: StoreSettings::default(),
            script_source: ScriptSource::default(),
            retry_budget: RetryBudget::default(),
        }
    }
}

impl<C> RateLimiterOptionsBuilder<C> {
    /// Key prefix, empty by default.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Derives the caller's key fragment. Required.
    pub fn key_function<F>(mut self, f: F) -> Self
    where
        F: Fn(&C) -> String + Send + Sync + 'static,
    {
        self.key_function = Some(Arc::new(f));
        self
    }

    /// Fixed window length in seconds, 60 by default.
    pub fn expiry(mut self, seconds: u64) -> Self {
        self.expiry = Setting::Fixed(seconds);
        self
    }

    /// Window length derived per call.
    pub fn expiry_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&C) -> u64 + Send + Sync + 'static,
    {
        self.expiry = Setting::derived(f);
        self
    }

    /// Fixed limit, 100 by default.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Setting::Fixed(limit);
        self
    }

    /// Limit derived per call.
    pub fn limit_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&C) -> u64 + Send + Sync + 'static,
    {
        self.limit = Setting::derived(f);
        self
    }

    /// Count every call (`true`, the default) or none.
    pub fn apply_limit(mut self, apply: bool) -> Self {
        self.apply_limit = Setting::Fixed(apply);
        self
    }

    /// Decide per call whether to count it.
    pub fn apply_limit_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&C) -> bool + Send + Sync + 'static,
    {
        self.apply_limit = Setting::derived(f);
        self
    }

    /// Status reported for rejected calls, 403 by default.
    pub fn rejection_status(mut self, status: u16) -> Self {
        self.rejection_status = status;
        self
    }

    /// Connect with these parameters (the default is `127.0.0.1:6379`).
    pub fn store_connection(mut self, connection: StoreConnection) -> Self {
        self.store = StoreSettings::Connection(connection);
        self
    }

    /// Use a pre-built client.
    pub fn store_client(mut self, client: redis::Client) -> Self {
        self.store = StoreSettings::Client(client);
        self
    }

    /// Use a ready store.
    pub fn store(mut self, store: RedisCounterStore) -> Self {
        self.store = StoreSettings::Store(store);
        self
    }

    /// Where the counting program is read from.
    pub fn script_source(mut self, source: ScriptSource) -> Self {
        self.script_source = source;
        self
    }

    /// Reload-and-retry cycles, 3 by default.
    pub fn retry_budget(mut self, retry_budget: RetryBudget) -> Self {
        self.retry_budget = retry_budget;
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<RateLimiterOptions<C>, DolphError> {
        let key_function = self
            .key_function
            .ok_or(DolphError::MissingOption("key_function"))?;

        if let Setting::Fixed(seconds) = &self.expiry {
            ExpirySeconds::try_from(*seconds)?;
        }

        Ok(RateLimiterOptions {
            prefix: self.prefix,
            key_function,
            expiry: self.expiry,
            limit: self.limit,
            apply_limit: self.apply_limit,
            rejection_status: self.rejection_status,
            store: self.store,
            script_source: self.script_source,
            retry_budget: self.retry_budget,
        })
    }
}
