// Resource Registry - Cached Chat Runtime Handles with Single-Flight Builds
//
// Serves constructed resources by key. A cache hit is a lock-free map
// read; a miss either joins an already-running build for that key or
// claims the builder role atomically, so N concurrent callers cause
// exactly one factory invocation. Failed builds are never cached.
//
// Per-key lifecycle: Absent -> Building -> Cached -> Absent. Building
// is only observable through the single-flight wait; every exit from
// Cached goes back to Absent, and a later lookup starts a fresh build.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::config::RegistryConfig;
use crate::domain::descriptor::Descriptor;
use crate::domain::resource::{ConfigStore, RegistryError, ResourceFactory, StoreError};

type BuildOutcome<R> = Result<Arc<R>, RegistryError>;

/// Receiver half of an in-flight build; `None` until the builder publishes.
type BuildSlot<R> = watch::Receiver<Option<BuildOutcome<R>>>;

/// What a cache miss resolved to: an entry that appeared between the
/// miss and the in-flight claim, or a build slot to wait on.
enum BuildJoin<R> {
    Cached(Arc<R>),
    Pending(BuildSlot<R>),
}

/// A fully-constructed resource plus the bookkeeping the sweeper and
/// capacity eviction need. Never handed out directly; callers get the
/// inner `Arc<R>`.
struct CacheEntry<R> {
    resource: Arc<R>,
    built_from_version: u64,
    built_at: DateTime<Utc>,
    /// Milliseconds since registry start, updated on every hit
    last_access: AtomicU64,
}

impl<R> CacheEntry<R> {
    fn touch(&self, epoch: Instant) {
        self.last_access
            .store(epoch.elapsed().as_millis() as u64, Ordering::Relaxed);
    }
}

/// Cache metadata for one key (for admin/diagnostic listings)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResourceInfo {
    pub key: String,
    pub built_from_version: u64,
    pub built_at: DateTime<Utc>,
}

struct Inner<R> {
    store: Arc<dyn ConfigStore>,
    factory: Arc<dyn ResourceFactory<R>>,
    entries: DashMap<String, Arc<CacheEntry<R>>>,
    in_flight: DashMap<String, BuildSlot<R>>,
    max_entries: Option<usize>,
    epoch: Instant,
}

/// Concurrent registry of constructed runtime resources.
///
/// Cheaply cloneable handle over shared state; the backend keeps one
/// per resource kind (agent chat clients, workflow executors) and
/// shares it between request handlers and the reconciliation sweeper.
pub struct ResourceRegistry<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for ResourceRegistry<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Send + Sync + 'static> ResourceRegistry<R> {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        factory: Arc<dyn ResourceFactory<R>>,
        config: &RegistryConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                factory,
                entries: DashMap::new(),
                in_flight: DashMap::new(),
                max_entries: config.max_entries,
                epoch: Instant::now(),
            }),
        }
    }

    /// Get the resource for a key, building it on first access.
    ///
    /// Concurrent calls for the same uncached key all wait on the one
    /// build that is in flight and observe its result — the same
    /// `Arc` on success, the same error on failure. Build failures are
    /// not cached; the next call retries from scratch.
    pub async fn get(&self, key: &str) -> Result<Arc<R>, RegistryError> {
        if let Some(entry) = self.inner.entries.get(key) {
            entry.touch(self.inner.epoch);
            return Ok(Arc::clone(&entry.resource));
        }

        let slot = match self.join_or_start_build(key) {
            BuildJoin::Cached(resource) => return Ok(resource),
            BuildJoin::Pending(slot) => slot,
        };
        match Self::wait_for_outcome(slot).await {
            Some(outcome) => outcome,
            // Builder task died without publishing. Nothing was cached,
            // so the next call rebuilds cleanly.
            None => Err(RegistryError::build_failed(
                key,
                "builder task aborted before completing",
            )),
        }
    }

    /// Eagerly build and cache a key (startup warm-up, "created"
    /// notifications). No-op when already cached.
    pub async fn register(&self, key: &str) -> Result<(), RegistryError> {
        if self.is_registered(key) {
            return Ok(());
        }
        self.get(key).await.map(|_| ())
    }

    /// Drop the cached entry for a key, if any. Idempotent; returns
    /// whether an entry was actually removed.
    pub fn unregister(&self, key: &str) -> bool {
        let removed = self.inner.entries.remove(key).is_some();
        if removed {
            debug!(key = %key, "unregistered cached resource");
        }
        removed
    }

    /// Rebuild a key from its current descriptor, used after an admin
    /// edit so the change is not masked by a stale entry until the
    /// next sweep. Returns `NotFound` when the descriptor is gone or
    /// no longer enabled.
    pub async fn refresh(&self, key: &str) -> Result<(), RegistryError> {
        self.unregister(key);
        self.register(key).await
    }

    /// O(1) membership check against the live cache only; does not
    /// consult the store.
    pub fn is_registered(&self, key: &str) -> bool {
        self.inner.entries.contains_key(key)
    }

    /// Build every currently-enabled descriptor, returning how many
    /// were cached. Per-key build failures are logged and skipped so
    /// one broken descriptor cannot abort startup; those keys are
    /// served lazily on first access instead.
    pub async fn warm_up(&self) -> Result<usize, StoreError> {
        let descriptors = self.inner.store.list_enabled().await?;
        let mut warmed = 0;

        for descriptor in descriptors {
            match self.register(&descriptor.key).await {
                Ok(()) => warmed += 1,
                Err(err) => {
                    warn!(key = %descriptor.key, error = %err, "warm-up build failed, key will be served lazily");
                }
            }
        }

        info!(warmed, "registry warm-up complete");
        Ok(warmed)
    }

    /// Snapshot of cached keys, taken without holding any lock across
    /// the caller's iteration (used by the sweeper)
    pub fn cached_keys(&self) -> Vec<String> {
        self.inner.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Cache metadata for admin/diagnostic listings
    pub fn snapshot(&self) -> Vec<CachedResourceInfo> {
        self.inner
            .entries
            .iter()
            .map(|entry| CachedResourceInfo {
                key: entry.key().clone(),
                built_from_version: entry.value().built_from_version,
                built_at: entry.value().built_at,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Join the in-flight build for a key, or claim the builder role.
    ///
    /// The vacant-entry insert is the atomic "start build for key X"
    /// step: holding the map entry while the slot receiver is stored
    /// means a second caller can only ever observe an occupied slot,
    /// never start a competing build.
    fn join_or_start_build(&self, key: &str) -> BuildJoin<R> {
        match self.inner.in_flight.entry(key.to_string()) {
            Entry::Occupied(slot) => BuildJoin::Pending(slot.get().clone()),
            Entry::Vacant(vacant) => {
                // A build may have finished between the caller's cache
                // miss and this claim. The builder inserts its entry
                // before releasing the in-flight slot, so re-checking
                // the cache here closes that window: the caller gets
                // the build that was in flight when it arrived instead
                // of starting a second one.
                if let Some(entry) = self.inner.entries.get(key) {
                    entry.touch(self.inner.epoch);
                    return BuildJoin::Cached(Arc::clone(&entry.resource));
                }

                let (publish, slot) = watch::channel(None);
                vacant.insert(slot.clone());
                self.spawn_build(key.to_string(), publish);
                BuildJoin::Pending(slot)
            }
        }
    }

    /// Run the build in its own task so an abandoned caller (request
    /// timeout upstream) never cancels a build other waiters depend on.
    fn spawn_build(&self, key: String, publish: watch::Sender<Option<BuildOutcome<R>>>) {
        let registry = self.clone();
        tokio::spawn(async move {
            let outcome = registry.build(&key).await;

            match &outcome {
                Ok(_) => debug!(key = %key, "resource built and cached"),
                Err(RegistryError::NotFound { .. }) => {
                    debug!(key = %key, "no enabled descriptor, nothing cached");
                }
                Err(err) => warn!(key = %key, error = %err, "resource build failed"),
            }

            // On success the cache entry is already inserted, so a caller
            // arriving after this release hits the cache; after a failure
            // it starts a fresh build (no negative caching).
            registry.inner.in_flight.remove(&key);
            let _ = publish.send(Some(outcome));
        });
    }

    async fn build(&self, key: &str) -> BuildOutcome<R> {
        let descriptor = self
            .inner
            .store
            .get(key)
            .await
            .map_err(|err| RegistryError::build_failed(key, &err))?;

        let descriptor = match descriptor {
            Some(descriptor) if descriptor.is_servable() => descriptor,
            _ => {
                return Err(RegistryError::NotFound {
                    key: key.to_string(),
                })
            }
        };

        let resource = self
            .inner
            .factory
            .build(&descriptor)
            .await
            .map_err(|err| RegistryError::build_failed(key, format!("{err:#}")))?;
        let resource = Arc::new(resource);

        self.insert_entry(&descriptor, Arc::clone(&resource));
        Ok(resource)
    }

    fn insert_entry(&self, descriptor: &Descriptor, resource: Arc<R>) {
        self.evict_for_capacity();

        let entry = Arc::new(CacheEntry {
            resource,
            built_from_version: descriptor.version,
            built_at: Utc::now(),
            last_access: AtomicU64::new(self.inner.epoch.elapsed().as_millis() as u64),
        });
        self.inner.entries.insert(descriptor.key.clone(), entry);
    }

    /// Evict least-recently-accessed entries until there is room for
    /// one more. Only runs when `max_entries` is configured.
    ///
    /// The bound is approximate: no exclusion is held between this
    /// pass and the insert that follows, so concurrent builds
    /// completing together can overshoot `max_entries` by one entry
    /// each until the next insert or sweep.
    fn evict_for_capacity(&self) {
        let Some(max) = self.inner.max_entries else {
            return;
        };

        while self.inner.entries.len() >= max {
            let victim = self
                .inner
                .entries
                .iter()
                .min_by_key(|entry| entry.value().last_access.load(Ordering::Relaxed))
                .map(|entry| entry.key().clone());

            let Some(key) = victim else { break };
            if self.inner.entries.remove(&key).is_some() {
                debug!(key = %key, "evicted least-recently-used entry at capacity");
            }
        }
    }

    async fn wait_for_outcome(mut slot: BuildSlot<R>) -> Option<BuildOutcome<R>> {
        loop {
            if let Some(outcome) = slot.borrow_and_update().clone() {
                return Some(outcome);
            }
            if slot.changed().await.is_err() {
                // Builder dropped the sender; pick up anything published
                // right before the drop.
                return slot.borrow().clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::descriptor::DescriptorStatus;
    use crate::infrastructure::store::InMemoryConfigStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct CountingFactory {
        calls: AtomicUsize,
    }

    impl CountingFactory {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResourceFactory<String> for CountingFactory {
        async fn build(&self, descriptor: &Descriptor) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("client-{}", descriptor.key))
        }
    }

    fn enabled(key: &str) -> Descriptor {
        Descriptor::new(key, DescriptorStatus::Enabled, json!({}))
    }

    fn registry_with(
        store: &InMemoryConfigStore,
        factory: Arc<CountingFactory>,
        max_entries: Option<usize>,
    ) -> ResourceRegistry<String> {
        let config = RegistryConfig {
            max_entries,
            ..RegistryConfig::default()
        };
        ResourceRegistry::new(Arc::new(store.clone()), factory, &config)
    }

    #[tokio::test]
    async fn test_get_caches_and_reuses_resource() {
        let store = InMemoryConfigStore::new();
        store.upsert(enabled("agent-1"));
        let factory = CountingFactory::new();
        let registry = registry_with(&store, factory.clone(), None);

        let first = registry.get("agent-1").await.unwrap();
        let second = registry.get("agent-1").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.calls(), 1);
        assert!(registry.is_registered("agent-1"));
    }

    #[tokio::test]
    async fn test_get_unknown_key_is_not_found_without_build() {
        let store = InMemoryConfigStore::new();
        let factory = CountingFactory::new();
        let registry = registry_with(&store, factory.clone(), None);

        let err = registry.get("missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(factory.calls(), 0);
        assert!(!registry.is_registered("missing"));
    }

    #[tokio::test]
    async fn test_disabled_descriptor_is_not_found() {
        let store = InMemoryConfigStore::new();
        store.upsert(Descriptor::new("agent-1", DescriptorStatus::Disabled, json!({})));
        let factory = CountingFactory::new();
        let registry = registry_with(&store, factory.clone(), None);

        let err = registry.get("agent-1").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(factory.calls(), 0);
    }

    #[tokio::test]
    async fn test_unregister_absent_key_is_noop() {
        let store = InMemoryConfigStore::new();
        let registry = registry_with(&store, CountingFactory::new(), None);

        assert!(!registry.unregister("never-cached"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_register_cached_key_skips_factory() {
        let store = InMemoryConfigStore::new();
        store.upsert(enabled("agent-1"));
        let factory = CountingFactory::new();
        let registry = registry_with(&store, factory.clone(), None);

        registry.register("agent-1").await.unwrap();
        registry.register("agent-1").await.unwrap();

        assert_eq!(factory.calls(), 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_used() {
        let store = InMemoryConfigStore::new();
        store.upsert(enabled("a"));
        store.upsert(enabled("b"));
        store.upsert(enabled("c"));
        let factory = CountingFactory::new();
        let registry = registry_with(&store, factory.clone(), Some(2));

        registry.get("a").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        registry.get("b").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        // Touch "a" so "b" becomes the LRU victim
        registry.get("a").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        registry.get("c").await.unwrap();

        assert!(registry.is_registered("a"));
        assert!(!registry.is_registered("b"));
        assert!(registry.is_registered("c"));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_warm_up_builds_only_enabled_descriptors() {
        let store = InMemoryConfigStore::new();
        store.upsert(enabled("agent-1"));
        store.upsert(enabled("agent-2"));
        store.upsert(Descriptor::new("agent-3", DescriptorStatus::Disabled, json!({})));
        let factory = CountingFactory::new();
        let registry = registry_with(&store, factory.clone(), None);

        let warmed = registry.warm_up().await.unwrap();

        assert_eq!(warmed, 2);
        assert_eq!(factory.calls(), 2);
        assert!(registry.is_registered("agent-1"));
        assert!(registry.is_registered("agent-2"));
        assert!(!registry.is_registered("agent-3"));
    }

    #[tokio::test]
    async fn test_vacant_claim_after_completed_build_reuses_cached_entry() {
        let store = InMemoryConfigStore::new();
        store.upsert(enabled("agent-1"));
        let factory = CountingFactory::new();
        let registry = registry_with(&store, factory.clone(), None);

        let cached = registry.get("agent-1").await.unwrap();
        assert!(registry.inner.in_flight.is_empty());

        // A caller that missed the cache before this build completed
        // finds the in-flight map vacant; claiming the slot must hand
        // back the cached resource, never start a second build.
        match registry.join_or_start_build("agent-1") {
            BuildJoin::Cached(resource) => assert!(Arc::ptr_eq(&cached, &resource)),
            BuildJoin::Pending(_) => panic!("claimed a new build for a cached key"),
        }

        assert_eq!(factory.calls(), 1);
        assert!(registry.inner.in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_reports_descriptor_version() {
        let store = InMemoryConfigStore::new();
        store.upsert(enabled("agent-1"));
        store.upsert(enabled("agent-1")); // bump to version 2
        let registry = registry_with(&store, CountingFactory::new(), None);

        registry.get("agent-1").await.unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].key, "agent-1");
        assert_eq!(snapshot[0].built_from_version, 2);
    }
}
