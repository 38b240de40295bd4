//! Per-process resource cache.
//!
//! The cache holds non-authoritative copies of committed resources and of
//! list results. It is never consulted for uniqueness decisions.
//!
//! ## Read-through fills
//!
//! A reader takes a [`CacheEpoch`] before going to the store and hands it
//! back with the result. Every invalidation bumps the epoch under an
//! exclusive gate, so a result read before an invalidation is discarded
//! instead of overwriting the newer state.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use kc_model::{Resource, ResourceScope, ResourceType, UniquenessKey};
use parking_lot::RwLock;
use tracing::trace;
use uuid::Uuid;

use crate::invalidation::InvalidationEvent;

/// Cache configuration.
#[derive(Debug, Clone, Copy)]
pub struct ResourceCacheConfig {
    /// When false every lookup misses and every fill is dropped.
    pub enabled: bool,
    /// Fills stop once this many resources are cached.
    pub max_entries: usize,
}

impl Default for ResourceCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 100_000,
        }
    }
}

impl ResourceCacheConfig {
    /// A configuration that caches nothing.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            max_entries: 0,
        }
    }
}

/// Snapshot of the invalidation counter taken before a store read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEpoch(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ListKey {
    scope: ResourceScope,
    resource_type: ResourceType,
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that had to go to the store.
    pub misses: u64,
    /// Fills discarded because an invalidation raced them.
    pub stale_fills: u64,
    /// Invalidations applied, local and remote.
    pub invalidations: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stale_fills: AtomicU64,
    invalidations: AtomicU64,
}

/// Per-process cache of resources and list results.
#[derive(Debug)]
pub struct ResourceCache {
    config: ResourceCacheConfig,
    by_id: DashMap<Uuid, Resource>,
    by_key: DashMap<UniquenessKey, Uuid>,
    lists: DashMap<ListKey, Vec<Resource>>,
    epoch: AtomicU64,
    gate: RwLock<()>,
    counters: Counters,
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new(ResourceCacheConfig::default())
    }
}

impl ResourceCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(config: ResourceCacheConfig) -> Self {
        Self {
            config,
            by_id: DashMap::new(),
            by_key: DashMap::new(),
            lists: DashMap::new(),
            epoch: AtomicU64::new(0),
            gate: RwLock::new(()),
            counters: Counters::default(),
        }
    }

    /// Whether caching is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Takes the epoch token for a read-through fill.
    #[must_use]
    pub fn epoch(&self) -> CacheEpoch {
        CacheEpoch(self.epoch.load(Ordering::Acquire))
    }

    /// Looks up a resource by ID within a realm.
    #[must_use]
    pub fn get(&self, realm_id: Uuid, id: Uuid) -> Option<Resource> {
        let found = self
            .by_id
            .get(&id)
            .filter(|resource| resource.realm_id() == realm_id)
            .map(|resource| resource.value().clone());
        self.record(found.is_some());
        found
    }

    /// Looks up a resource by its uniqueness key.
    #[must_use]
    pub fn get_by_key(&self, key: &UniquenessKey) -> Option<Resource> {
        let id = self.by_key.get(key).map(|id| *id.value());
        let found = id
            .and_then(|id| self.by_id.get(&id).map(|resource| resource.value().clone()))
            .filter(|resource| resource.key() == *key);
        self.record(found.is_some());
        found
    }

    /// Looks up a cached list result.
    #[must_use]
    pub fn get_list(&self, scope: &ResourceScope, resource_type: ResourceType) -> Option<Vec<Resource>> {
        let found = self
            .lists
            .get(&ListKey {
                scope: *scope,
                resource_type,
            })
            .map(|list| list.value().clone());
        self.record(found.is_some());
        found
    }

    /// Stores a resource read from the store, unless invalidated since `epoch`.
    ///
    /// Returns whether the resource was cached.
    pub fn fill(&self, resource: &Resource, epoch: CacheEpoch) -> bool {
        if !self.config.enabled {
            return false;
        }
        let _gate = self.gate.read();
        if !self.fill_allowed(epoch) {
            return false;
        }
        self.by_key.insert(resource.key(), resource.id);
        self.by_id.insert(resource.id, resource.clone());
        true
    }

    /// Stores a list result read from the store, unless invalidated since `epoch`.
    ///
    /// Returns whether the list was cached.
    pub fn fill_list(
        &self,
        scope: &ResourceScope,
        resource_type: ResourceType,
        resources: &[Resource],
        epoch: CacheEpoch,
    ) -> bool {
        if !self.config.enabled {
            return false;
        }
        let _gate = self.gate.read();
        if !self.fill_allowed(epoch) {
            return false;
        }
        self.lists.insert(
            ListKey {
                scope: *scope,
                resource_type,
            },
            resources.to_vec(),
        );
        true
    }

    /// Applies a write committed by this process.
    ///
    /// The fresh resource replaces any cached copy and the list it belongs
    /// to is dropped, so this process reads its own write immediately.
    pub fn apply_local_write(&self, resource: &Resource) {
        if !self.config.enabled {
            return;
        }
        let key = resource.key();
        self.invalidate_with(|cache| {
            cache.evict(resource.id, &key);
            if cache.by_id.len() < cache.config.max_entries {
                cache.by_key.insert(key.clone(), resource.id);
                cache.by_id.insert(resource.id, resource.clone());
            }
        });
    }

    /// Applies a delete committed by this process.
    pub fn apply_local_delete(&self, resource: &Resource) {
        self.apply(&InvalidationEvent::Deleted {
            id: resource.id,
            key: resource.key(),
        });
    }

    /// Applies an invalidation event, local or from a peer.
    pub fn apply(&self, event: &InvalidationEvent) {
        if !self.config.enabled {
            return;
        }
        trace!(?event, "applying invalidation");
        self.invalidate_with(|cache| match event {
            InvalidationEvent::Upserted { id, key } => cache.evict(*id, key),
            InvalidationEvent::Deleted { id, key } => {
                cache.evict(*id, key);
                if let Some(owned) = event.removes_client_scope() {
                    cache.evict_scope(&owned);
                }
            }
            InvalidationEvent::RealmRemoved { realm_id } => cache.evict_realm(*realm_id),
            InvalidationEvent::Reset => cache.evict_all(),
        });
    }

    /// Drops everything.
    pub fn clear(&self) {
        self.invalidate_with(Self::evict_all);
    }

    /// Number of cached resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether no resources are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            stale_fills: self.counters.stale_fills.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
        }
    }

    fn record(&self, hit: bool) {
        let counter = if hit {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    // Caller holds the gate shared.
    fn fill_allowed(&self, epoch: CacheEpoch) -> bool {
        if self.epoch.load(Ordering::Acquire) != epoch.0 {
            self.counters.stale_fills.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.by_id.len() < self.config.max_entries
    }

    fn invalidate_with(&self, apply: impl FnOnce(&Self)) {
        let _gate = self.gate.write();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        apply(self);
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    fn evict_all(&self) {
        self.by_id.clear();
        self.by_key.clear();
        self.lists.clear();
    }

    fn evict(&self, id: Uuid, key: &UniquenessKey) {
        self.by_id.remove(&id);
        self.by_key.remove(key);
        self.lists.remove(&ListKey {
            scope: key.scope,
            resource_type: key.resource_type,
        });
    }

    fn evict_scope(&self, scope: &ResourceScope) {
        self.by_id.retain(|_, resource| resource.scope != *scope);
        self.by_key.retain(|key, _| key.scope != *scope);
        self.lists.retain(|key, _| key.scope != *scope);
    }

    fn evict_realm(&self, realm_id: Uuid) {
        self.by_id.retain(|_, resource| resource.realm_id() != realm_id);
        self.by_key.retain(|key, _| key.scope.realm_id != realm_id);
        self.lists.retain(|key, _| key.scope.realm_id != realm_id);
    }
}
