//! The counting program and its process-local handle cache.
//!
//! The program is registered with the store once and then invoked by its
//! content-derived handle. [`ScriptCache`] remembers that handle and forgets it
//! when the store reports it unknown, so the next call registers it again.

use std::{
    fmt,
    ops::Deref,
    path::{Path, PathBuf},
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{CounterStore, DolphError};

/// The counting program shipped with this crate.
pub const BUNDLED_SCRIPT: &str = include_str!("../lua/limit.lua");

/// Opaque handle returned by the store when a program is registered.
///
/// For Redis this is the SHA1 digest of the program source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptHash(Arc<str>);

impl ScriptHash {
    /// The handle as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for ScriptHash {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<String> for ScriptHash {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl fmt::Display for ScriptHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the counting program is read from on each load cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    /// Read from a file every time the program has to be registered.
    File(PathBuf),
    /// Program text held in memory.
    Inline(Arc<str>),
}

impl ScriptSource {
    /// The `lua/limit.lua` file in this crate's source checkout.
    ///
    /// The path is fixed at build time, so this only resolves on the machine
    /// that compiled the crate. Deployed binaries should use [`Self::embedded`].
    pub fn bundled() -> Self {
        Self::File(Path::new(env!("CARGO_MANIFEST_DIR")).join("lua").join("limit.lua"))
    }

    /// The bundled program compiled into the binary.
    pub fn embedded() -> Self {
        Self::Inline(Arc::from(BUNDLED_SCRIPT))
    }

    /// Read the program text.
    pub async fn read(&self) -> Result<Arc<str>, DolphError> {
        match self {
            Self::File(path) => tokio::fs::read_to_string(path)
                .await
                .map(Arc::from)
                .map_err(|source| DolphError::ScriptRead {
                    path: path.clone(),
                    source,
                }),
            Self::Inline(program) => Ok(program.clone()),
        }
    }
}

impl Default for ScriptSource {
    /// Returns [`ScriptSource::embedded`].
    fn default() -> Self {
        Self::embedded()
    }
}

/// Memoized handle of the registered counting program.
///
/// Loads are single-flight: callers that miss the cache at the same time wait
/// for one registration and share its handle. A failed load caches nothing.
#[derive(Debug, Default)]
pub struct ScriptCache {
    handle: RwLock<Option<ScriptHash>>,
    load_guard: tokio::sync::Mutex<()>,
    load_count: AtomicU64,
}

impl ScriptCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached handle, if any.
    pub fn get(&self) -> Option<ScriptHash> {
        self.handle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the cached handle.
    pub fn set(&self, hash: ScriptHash) {
        *self.handle.write().unwrap_or_else(PoisonError::into_inner) = Some(hash);
    }

    /// Forget the cached handle.
    pub fn invalidate(&self) {
        self.handle
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Forget the cached handle only while it is still `stale`.
    ///
    /// A handle refreshed by a concurrent caller is kept.
    pub fn invalidate_if(&self, stale: &ScriptHash) {
        let mut handle = self.handle.write().unwrap_or_else(PoisonError::into_inner);

        if handle.as_ref() == Some(stale) {
            handle.take();
        }
    }

    /// Number of successful registrations performed through this cache.
    pub fn load_count(&self) -> u64 {
        self.load_count.load(Ordering::Relaxed)
    }

    /// Return the cached handle, registering the program with `store` first if
    /// nothing is cached.
    pub async fn ensure_loaded<S>(
        &self,
        store: &S,
        source: &ScriptSource,
    ) -> Result<ScriptHash, DolphError>
    where
        S: CounterStore,
    {
        if let Some(hash) = self.get() {
            return Ok(hash);
        }

        let _guard = self.load_guard.lock().await;

        // a concurrent caller may have registered it while this one waited
        if let Some(hash) = self.get() {
            return Ok(hash);
        }

        let program = source.read().await?;
        let hash = store.load_script(&program).await?;

        tracing::debug!(script = %hash, "Registered counting script");

        self.load_count.fetch_add(1, Ordering::Relaxed);
        self.set(hash.clone());

        Ok(hash)
    } // end method ensure_loaded
}
