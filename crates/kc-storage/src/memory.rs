//! In-memory storage backend.
//!
//! Writes follow the same transaction shape as the SQL backend: the
//! uniqueness key is reserved first and the record committed second. A
//! reservation that is never committed is released when it is dropped, so
//! a failed or abandoned create leaves nothing behind. A second writer on a
//! reserved key waits until the first one commits or rolls back, the way a
//! unique index blocks a concurrent insert.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use kc_model::{
    Attributes, Realm, Resource, ResourceScope, ResourceType, ScopeOwner, UniquenessKey,
};
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::realm::RealmProvider;
use crate::resource::ResourceProvider;

#[derive(Debug, Clone)]
enum IndexSlot {
    Reserved { id: Uuid, pending: Arc<Mutex<()>> },
    Committed(Uuid),
}

#[derive(Debug, Clone)]
struct StoredResource {
    seq: u64,
    resource: Resource,
}

#[derive(Debug, Default)]
struct FaultInjection {
    failing_commits: AtomicUsize,
    commit_delay_ms: AtomicU64,
    failing_reads: AtomicUsize,
    read_delay_ms: AtomicU64,
}

impl FaultInjection {
    fn delay(millis: &AtomicU64) -> Option<Duration> {
        let ms = millis.load(Ordering::Acquire);
        (ms > 0).then(|| Duration::from_millis(ms))
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    realms: DashMap<Uuid, Realm>,
    realm_names: DashMap<String, Uuid>,
    records: DashMap<Uuid, StoredResource>,
    index: DashMap<UniquenessKey, IndexSlot>,
    sequence: AtomicU64,
    // Commits hold it shared, cascading deletes exclusively.
    scope_lock: RwLock<()>,
    faults: FaultInjection,
}

enum ReserveAttempt {
    Reserved(Reservation),
    Wait(Arc<Mutex<()>>),
}

/// An uncommitted claim on a uniqueness key.
struct Reservation {
    state: Arc<MemoryState>,
    key: UniquenessKey,
    id: Uuid,
    committed: bool,
    _pending: OwnedMutexGuard<()>,
}

impl Reservation {
    fn commit(mut self) {
        if let Some(mut slot) = self.state.index.get_mut(&self.key) {
            *slot = IndexSlot::Committed(self.id);
        }
        self.committed = true;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.committed {
            let id = self.id;
            self.state.index.remove_if(&self.key, |_, slot| {
                matches!(slot, IndexSlot::Reserved { id: reserved, .. } if *reserved == id)
            });
            debug!(key = %self.key, "reservation rolled back");
        }
    }
}

impl MemoryState {
    async fn before_commit(&self) -> StorageResult<()> {
        if let Some(delay) = FaultInjection::delay(&self.faults.commit_delay_ms) {
            tokio::time::sleep(delay).await;
        }
        if FaultInjection::take(&self.faults.failing_commits) {
            return Err(StorageError::Transaction(
                "injected commit failure".to_string(),
            ));
        }
        Ok(())
    }

    async fn before_read(&self) -> StorageResult<()> {
        if let Some(delay) = FaultInjection::delay(&self.faults.read_delay_ms) {
            tokio::time::sleep(delay).await;
        }
        if FaultInjection::take(&self.faults.failing_reads) {
            return Err(StorageError::Connection("injected read failure".to_string()));
        }
        Ok(())
    }

    fn scope_exists(&self, scope: &ResourceScope) -> bool {
        if !self.realms.contains_key(&scope.realm_id) {
            return false;
        }
        match scope.owner {
            ScopeOwner::Realm => true,
            ScopeOwner::Client(client_id) => self.records.get(&client_id).is_some_and(|stored| {
                stored.resource.is_client() && stored.resource.realm_id() == scope.realm_id
            }),
        }
    }

    fn try_reserve(self: &Arc<Self>, key: &UniquenessKey, id: Uuid) -> StorageResult<ReserveAttempt> {
        match self.index.entry(key.clone()) {
            Entry::Occupied(entry) => match entry.get() {
                IndexSlot::Committed(_) => Err(StorageError::duplicate(
                    key.resource_type.entity_name(),
                    "name",
                    key.name.clone(),
                )),
                IndexSlot::Reserved { pending, .. } => Ok(ReserveAttempt::Wait(Arc::clone(pending))),
            },
            Entry::Vacant(entry) => {
                let pending = Arc::new(Mutex::new(()));
                let guard = Arc::clone(&pending)
                    .try_lock_owned()
                    .map_err(|e| StorageError::Internal(e.to_string()))?;
                entry.insert(IndexSlot::Reserved { id, pending });
                Ok(ReserveAttempt::Reserved(Reservation {
                    state: Arc::clone(self),
                    key: key.clone(),
                    id,
                    committed: false,
                    _pending: guard,
                }))
            }
        }
    }

    async fn reserve(self: &Arc<Self>, key: &UniquenessKey, id: Uuid) -> StorageResult<Reservation> {
        loop {
            match self.try_reserve(key, id)? {
                ReserveAttempt::Reserved(reservation) => return Ok(reservation),
                ReserveAttempt::Wait(pending) => {
                    debug!(%key, "waiting for in-flight reservation");
                    drop(pending.lock().await);
                }
            }
        }
    }

    fn commit_resource(&self, resource: &Resource, reservation: Reservation) -> StorageResult<()> {
        let _scope = self.scope_lock.read();
        if !self.scope_exists(&resource.scope) {
            return Err(StorageError::InvalidReference(format!(
                "scope {} does not exist",
                resource.scope
            )));
        }
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.records.insert(
            resource.id,
            StoredResource {
                seq,
                resource: resource.clone(),
            },
        );
        reservation.commit();
        Ok(())
    }

    fn release_key(&self, resource: &Resource) {
        let id = resource.id;
        self.index.remove_if(&resource.key(), |_, slot| {
            matches!(slot, IndexSlot::Committed(committed) if *committed == id)
        });
    }

    fn remove_resource(&self, realm_id: Uuid, id: Uuid) -> StorageResult<Resource> {
        let _scope = self.scope_lock.write();
        let (_, stored) = self
            .records
            .remove_if(&id, |_, stored| stored.resource.realm_id() == realm_id)
            .ok_or_else(|| StorageError::not_found("Resource", id))?;
        self.release_key(&stored.resource);

        if stored.resource.is_client() {
            let owned = ResourceScope::client(realm_id, id);
            let children: Vec<Uuid> = self
                .records
                .iter()
                .filter(|entry| entry.resource.scope == owned)
                .map(|entry| *entry.key())
                .collect();
            for child in children {
                if let Some((_, removed)) = self.records.remove(&child) {
                    self.release_key(&removed.resource);
                }
            }
        }
        Ok(stored.resource)
    }

    fn apply_attributes(
        &self,
        realm_id: Uuid,
        id: Uuid,
        expected_version: i64,
        attributes: &Attributes,
    ) -> StorageResult<Resource> {
        let mut stored = self
            .records
            .get_mut(&id)
            .filter(|stored| stored.resource.realm_id() == realm_id)
            .ok_or_else(|| StorageError::not_found("Resource", id))?;

        if stored.resource.version != expected_version {
            return Err(StorageError::VersionConflict {
                entity_type: stored.resource.resource_type.entity_name(),
                id,
                expected: expected_version,
                actual: stored.resource.version,
            });
        }
        stored.resource.attributes = attributes.clone();
        stored.resource.version += 1;
        stored.resource.updated_at = Utc::now();
        Ok(stored.resource.clone())
    }

    fn remove_realm(&self, id: Uuid) -> StorageResult<Realm> {
        let _scope = self.scope_lock.write();
        let (_, realm) = self
            .realms
            .remove(&id)
            .ok_or_else(|| StorageError::not_found("Realm", id))?;
        self.realm_names.remove_if(&realm.name, |_, owner| *owner == id);
        self.records.retain(|_, stored| stored.resource.realm_id() != id);
        self.index.retain(|key, slot| {
            key.scope.realm_id != id || matches!(slot, IndexSlot::Reserved { .. })
        });
        Ok(realm)
    }
}

/// Transactional in-memory store.
///
/// Cloning is cheap; clones share the same data. Use [`MemoryStore::realms`]
/// and [`MemoryStore::resources`] to obtain the provider handles.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<MemoryState>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Realm provider backed by this store.
    #[must_use]
    pub fn realms(&self) -> MemoryRealmProvider {
        MemoryRealmProvider {
            state: Arc::clone(&self.state),
        }
    }

    /// Resource provider backed by this store.
    #[must_use]
    pub fn resources(&self) -> MemoryResourceProvider {
        MemoryResourceProvider {
            state: Arc::clone(&self.state),
        }
    }

    /// Makes the next `count` resource writes fail at commit time.
    pub fn fail_next_commits(&self, count: usize) {
        self.state.faults.failing_commits.store(count, Ordering::Release);
    }

    /// Delays every resource write before it commits.
    pub fn set_commit_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.state.faults.commit_delay_ms.store(ms, Ordering::Release);
    }

    /// Makes the next `count` resource reads fail with a connection error.
    pub fn fail_next_reads(&self, count: usize) {
        self.state.faults.failing_reads.store(count, Ordering::Release);
    }

    /// Delays every resource read.
    pub fn set_read_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.state.faults.read_delay_ms.store(ms, Ordering::Release);
    }

    /// Removes all injected faults.
    pub fn clear_faults(&self) {
        self.fail_next_commits(0);
        self.set_commit_delay(Duration::ZERO);
        self.fail_next_reads(0);
        self.set_read_delay(Duration::ZERO);
    }

    /// Number of committed resources across all realms.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.state.records.len()
    }

    /// Number of uniqueness keys reserved by uncommitted transactions.
    #[must_use]
    pub fn reserved_count(&self) -> usize {
        self.state
            .index
            .iter()
            .filter(|entry| matches!(entry.value(), IndexSlot::Reserved { .. }))
            .count()
    }
}

/// In-memory realm provider.
#[derive(Debug, Clone)]
pub struct MemoryRealmProvider {
    state: Arc<MemoryState>,
}

#[async_trait]
impl RealmProvider for MemoryRealmProvider {
    #[instrument(skip(self, realm), fields(realm = %realm.name))]
    async fn create(&self, realm: &Realm) -> StorageResult<()> {
        match self.state.realm_names.entry(realm.name.clone()) {
            Entry::Occupied(_) => Err(StorageError::duplicate("Realm", "name", realm.name.clone())),
            Entry::Vacant(entry) => {
                entry.insert(realm.id);
                self.state.realms.insert(realm.id, realm.clone());
                Ok(())
            }
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> StorageResult<Realm> {
        self.state.remove_realm(id)
    }

    async fn get_by_id(&self, id: Uuid) -> StorageResult<Option<Realm>> {
        Ok(self.state.realms.get(&id).map(|realm| realm.value().clone()))
    }

    async fn get_by_name(&self, name: &str) -> StorageResult<Option<Realm>> {
        let id = self.state.realm_names.get(name).map(|entry| *entry.value());
        Ok(id.and_then(|id| self.state.realms.get(&id).map(|realm| realm.value().clone())))
    }

    async fn list(&self) -> StorageResult<Vec<Realm>> {
        let mut realms: Vec<Realm> = self
            .state
            .realms
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        realms.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(realms)
    }
}

/// In-memory resource provider.
#[derive(Debug, Clone)]
pub struct MemoryResourceProvider {
    state: Arc<MemoryState>,
}

#[async_trait]
impl ResourceProvider for MemoryResourceProvider {
    #[instrument(skip(self, resource), fields(key = %resource.key(), id = %resource.id))]
    async fn create(&self, resource: &Resource) -> StorageResult<()> {
        let reservation = self.state.reserve(&resource.key(), resource.id).await?;
        self.state.before_commit().await?;
        self.state.commit_resource(resource, reservation)
    }

    async fn get_by_id(&self, realm_id: Uuid, id: Uuid) -> StorageResult<Option<Resource>> {
        self.state.before_read().await?;
        Ok(self
            .state
            .records
            .get(&id)
            .filter(|stored| stored.resource.realm_id() == realm_id)
            .map(|stored| stored.resource.clone()))
    }

    async fn get_by_key(&self, key: &UniquenessKey) -> StorageResult<Option<Resource>> {
        self.state.before_read().await?;
        let slot = self.state.index.get(key).map(|slot| slot.value().clone());
        match slot {
            Some(IndexSlot::Committed(id)) => Ok(self
                .state
                .records
                .get(&id)
                .map(|stored| stored.resource.clone())),
            _ => Ok(None),
        }
    }

    async fn list(
        &self,
        scope: &ResourceScope,
        resource_type: ResourceType,
    ) -> StorageResult<Vec<Resource>> {
        self.state.before_read().await?;
        let mut matching: Vec<StoredResource> = self
            .state
            .records
            .iter()
            .filter(|entry| entry.resource.scope == *scope && entry.resource.resource_type == resource_type)
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by_key(|stored| stored.seq);
        Ok(matching.into_iter().map(|stored| stored.resource).collect())
    }

    #[instrument(skip(self, attributes))]
    async fn update_attributes(
        &self,
        realm_id: Uuid,
        id: Uuid,
        expected_version: i64,
        attributes: &Attributes,
    ) -> StorageResult<Resource> {
        self.state.before_commit().await?;
        self.state
            .apply_attributes(realm_id, id, expected_version, attributes)
    }

    #[instrument(skip(self))]
    async fn delete(&self, realm_id: Uuid, id: Uuid) -> StorageResult<Resource> {
        self.state.before_commit().await?;
        self.state.remove_resource(realm_id, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_realm() -> (MemoryStore, Uuid) {
        let store = MemoryStore::new();
        let realm = Realm::new("test");
        store.realms().create(&realm).await.unwrap();
        (store, realm.id)
    }

    fn client(realm_id: Uuid, name: &str) -> Resource {
        Resource::new(
            ResourceScope::realm(realm_id),
            ResourceType::Client,
            name,
            Attributes::new(),
        )
    }

    fn role(scope: ResourceScope, name: &str) -> Resource {
        Resource::new(scope, ResourceType::Role, name, Attributes::new())
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let (store, realm_id) = store_with_realm().await;
        let resources = store.resources();

        resources.create(&client(realm_id, "web")).await.unwrap();
        let err = resources.create(&client(realm_id, "web")).await.unwrap_err();

        assert!(err.is_duplicate());
        assert_eq!(store.resource_count(), 1);
    }

    #[tokio::test]
    async fn same_name_in_different_scopes_is_allowed() {
        let (store, realm_id) = store_with_realm().await;
        let resources = store.resources();

        let web = client(realm_id, "admin");
        resources.create(&web).await.unwrap();
        resources
            .create(&role(ResourceScope::realm(realm_id), "admin"))
            .await
            .unwrap();
        resources
            .create(&role(ResourceScope::client(realm_id, web.id), "admin"))
            .await
            .unwrap();

        assert_eq!(store.resource_count(), 3);
    }

    #[tokio::test]
    async fn delete_frees_the_name() {
        let (store, realm_id) = store_with_realm().await;
        let resources = store.resources();

        let first = role(ResourceScope::realm(realm_id), "role-a");
        resources.create(&first).await.unwrap();
        let deleted = resources.delete(realm_id, first.id).await.unwrap();
        assert_eq!(deleted.id, first.id);

        let second = role(ResourceScope::realm(realm_id), "role-a");
        resources.create(&second).await.unwrap();

        let found = resources.get_by_key(&second.key()).await.unwrap().unwrap();
        assert_eq!(found.id, second.id);
        assert_ne!(found.id, first.id);
        assert!(resources.get_by_id(realm_id, first.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_commit_rolls_back_reservation() {
        let (store, realm_id) = store_with_realm().await;
        let resources = store.resources();
        let web = client(realm_id, "web");

        store.fail_next_commits(1);
        let err = resources.create(&web).await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(store.reserved_count(), 0);
        assert!(resources.get_by_key(&web.key()).await.unwrap().is_none());
        assert!(resources.get_by_id(realm_id, web.id).await.unwrap().is_none());

        resources.create(&client(realm_id, "web")).await.unwrap();
    }

    #[tokio::test]
    async fn dropped_create_releases_reservation() {
        let (store, realm_id) = store_with_realm().await;
        let resources = store.resources();
        store.set_commit_delay(Duration::from_millis(200));

        let web = client(realm_id, "web");
        let attempt =
            tokio::time::timeout(Duration::from_millis(20), resources.create(&web)).await;
        assert!(attempt.is_err());
        assert_eq!(store.reserved_count(), 0);
        assert_eq!(store.resource_count(), 0);

        store.clear_faults();
        resources.create(&client(realm_id, "web")).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_writer_waits_for_reservation() {
        let (store, realm_id) = store_with_realm().await;
        store.set_commit_delay(Duration::from_millis(50));

        let a = store.resources();
        let b = store.resources();
        let first = client(realm_id, "shared");
        let second = client(realm_id, "shared");
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { a.create(&first).await }),
            tokio::spawn(async move { b.create(&second).await }),
        );
        let results = [ra.unwrap(), rb.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| r.as_ref().is_err_and(StorageError::is_duplicate))
                .count(),
            1
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn waiter_takes_over_after_rollback() {
        let (store, realm_id) = store_with_realm().await;
        store.set_commit_delay(Duration::from_millis(50));
        store.fail_next_commits(1);

        let a = store.resources();
        let b = store.resources();
        let first = client(realm_id, "shared");
        let second = client(realm_id, "shared");
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { a.create(&first).await }),
            tokio::spawn(async move { b.create(&second).await }),
        );
        let results = [ra.unwrap(), rb.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| r.as_ref().is_err_and(StorageError::is_transient))
                .count(),
            1
        );
        assert_eq!(store.resource_count(), 1);
    }

    #[tokio::test]
    async fn list_is_in_creation_order() {
        let (store, realm_id) = store_with_realm().await;
        let resources = store.resources();

        for name in ["zeta", "alpha", "mid"] {
            resources.create(&client(realm_id, name)).await.unwrap();
        }
        let names: Vec<String> = resources
            .list(&ResourceScope::realm(realm_id), ResourceType::Client)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();

        assert_eq!(names, ["zeta", "alpha", "mid"]);
    }

    #[tokio::test]
    async fn client_delete_cascades_to_roles() {
        let (store, realm_id) = store_with_realm().await;
        let resources = store.resources();

        let web = client(realm_id, "web");
        resources.create(&web).await.unwrap();
        let scope = ResourceScope::client(realm_id, web.id);
        let viewer = role(scope, "viewer");
        resources.create(&viewer).await.unwrap();

        resources.delete(realm_id, web.id).await.unwrap();

        assert!(resources.list(&scope, ResourceType::Role).await.unwrap().is_empty());
        assert!(resources.get_by_key(&viewer.key()).await.unwrap().is_none());
        assert_eq!(store.resource_count(), 0);
    }

    #[tokio::test]
    async fn role_under_missing_client_is_invalid_reference() {
        let (store, realm_id) = store_with_realm().await;
        let orphan = role(ResourceScope::client(realm_id, Uuid::now_v7()), "viewer");

        let err = store.resources().create(&orphan).await.unwrap_err();

        assert!(matches!(err, StorageError::InvalidReference(_)));
        assert_eq!(store.reserved_count(), 0);
    }

    #[tokio::test]
    async fn update_attributes_checks_version() {
        let (store, realm_id) = store_with_realm().await;
        let resources = store.resources();
        let web = client(realm_id, "web");
        resources.create(&web).await.unwrap();

        let attrs = Attributes::from([("team".to_string(), vec!["core".to_string()])]);
        let updated = resources
            .update_attributes(realm_id, web.id, 1, &attrs)
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.first_attribute("team"), Some("core"));

        let err = resources
            .update_attributes(realm_id, web.id, 1, &Attributes::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::VersionConflict { expected: 1, actual: 2, .. }
        ));
    }

    #[tokio::test]
    async fn realm_delete_removes_resources() {
        let (store, realm_id) = store_with_realm().await;
        store.resources().create(&client(realm_id, "web")).await.unwrap();

        let realm = store.realms().delete(realm_id).await.unwrap();
        assert_eq!(realm.name, "test");
        assert_eq!(store.resource_count(), 0);
        assert!(store.realms().get_by_name("test").await.unwrap().is_none());

        let err = store.realms().delete(realm_id).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn duplicate_realm_name_is_rejected() {
        let (store, _) = store_with_realm().await;
        let err = store.realms().create(&Realm::new("test")).await.unwrap_err();
        assert!(err.is_duplicate());
        assert!(store.realms().get_by_name("test").await.unwrap().is_some());
    }
}
