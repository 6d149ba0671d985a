use std::{path::PathBuf, sync::Arc};

use crate::{DolphError, ScriptCache, ScriptHash, ScriptSource, tests::memory_store::MemoryStore};

#[tokio::test]
async fn ensure_loaded_registers_once_and_reuses_the_handle() {
    let store = MemoryStore::new();
    let cache = ScriptCache::new();
    let source = ScriptSource::embedded();

    assert!(cache.get().is_none());

    let first = cache.ensure_loaded(&store, &source).await.unwrap();
    let second = cache.ensure_loaded(&store, &source).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(cache.get(), Some(first));
    assert_eq!(store.loads(), 1);
    assert_eq!(cache.load_count(), 1);
}

#[tokio::test]
async fn invalidate_forces_a_fresh_registration() {
    let store = MemoryStore::new();
    let cache = ScriptCache::new();
    let source = ScriptSource::embedded();

    let first = cache.ensure_loaded(&store, &source).await.unwrap();
    cache.invalidate();
    assert!(cache.get().is_none());

    let second = cache.ensure_loaded(&store, &source).await.unwrap();

    // content-addressed: same program, same handle
    assert_eq!(first, second);
    assert_eq!(store.loads(), 2);
}

#[test]
fn invalidate_if_keeps_a_refreshed_handle() {
    let cache = ScriptCache::new();
    let stale = ScriptHash::from("stale".to_string());
    let fresh = ScriptHash::from("fresh".to_string());

    cache.set(fresh.clone());
    cache.invalidate_if(&stale);
    assert_eq!(cache.get(), Some(fresh.clone()));

    cache.invalidate_if(&fresh);
    assert!(cache.get().is_none());

    // nothing cached
    cache.invalidate_if(&fresh);
    assert!(cache.get().is_none());
}

#[tokio::test]
async fn set_short_circuits_the_store() {
    let store = MemoryStore::new();
    let cache = ScriptCache::new();
    let preset = ScriptHash::from("preset".to_string());

    cache.set(preset.clone());

    let hash = cache
        .ensure_loaded(&store, &ScriptSource::embedded())
        .await
        .unwrap();

    assert_eq!(hash, preset);
    assert_eq!(store.loads(), 0);
}

#[tokio::test]
async fn unreadable_source_is_reported_and_nothing_is_cached() {
    let store = MemoryStore::new();
    let cache = ScriptCache::new();
    let source = ScriptSource::File(PathBuf::from("/nonexistent/dolph/limit.lua"));

    let err = cache.ensure_loaded(&store, &source).await.unwrap_err();

    assert!(matches!(err, DolphError::ScriptRead { .. }));
    assert!(err.to_string().contains("/nonexistent/dolph/limit.lua"));
    assert!(cache.get().is_none());
    assert_eq!(store.loads(), 0);
}

#[tokio::test]
async fn rejected_registration_is_reported_and_nothing_is_cached() {
    let store = MemoryStore::new();
    let cache = ScriptCache::new();
    store.fail_loads(true);

    let err = cache
        .ensure_loaded(&store, &ScriptSource::embedded())
        .await
        .unwrap_err();

    assert!(matches!(err, DolphError::RedisError(_)));
    assert!(cache.get().is_none());
    assert_eq!(cache.load_count(), 0);

    store.fail_loads(false);
    assert!(
        cache
            .ensure_loaded(&store, &ScriptSource::embedded())
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn bundled_file_matches_embedded_program() {
    let from_file = ScriptSource::bundled().read().await.unwrap();
    let embedded = ScriptSource::embedded().read().await.unwrap();

    assert_eq!(from_file, embedded);
    assert!(from_file.contains("INCR"));
    assert!(from_file.contains("EXPIRE"));
    assert!(from_file.contains("TTL"));
}

#[tokio::test]
async fn default_source_is_compiled_in() {
    let source = ScriptSource::default();

    assert_eq!(source, ScriptSource::embedded());
    assert!(matches!(source, ScriptSource::Inline(_)));
    assert_eq!(&*source.read().await.unwrap(), crate::BUNDLED_SCRIPT);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_share_one_registration() {
    let store = MemoryStore::new();
    let cache = Arc::new(ScriptCache::new());

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..32 {
        let store = store.clone();
        let cache = cache.clone();
        tasks.spawn(async move {
            cache
                .ensure_loaded(&store, &ScriptSource::embedded())
                .await
                .unwrap()
        });
    }

    let hashes = tasks.join_all().await;

    assert_eq!(hashes.len(), 32);
    assert!(hashes.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(store.loads(), 1);
    assert_eq!(cache.load_count(), 1);
}
