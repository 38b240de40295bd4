//! Shared fixtures.

use std::sync::Arc;

use kc_cache::{InvalidationBus, LocalInvalidationBus};
use kc_core::RegistrySettings;
use kc_model::Realm;
use kc_registry::ResourceRegistry;
use kc_storage::{MemoryRealmProvider, MemoryResourceProvider, MemoryStore};
use uuid::Uuid;

/// Registry over the in-memory store.
pub type MemoryRegistry = ResourceRegistry<MemoryRealmProvider, MemoryResourceProvider>;

/// Installs a test subscriber once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("kc_registry=debug,kc_storage=info")
        .with_test_writer()
        .try_init();
}

/// Builds one node over a shared store and bus.
pub fn node(
    store: &MemoryStore,
    bus: &Arc<LocalInvalidationBus>,
    node_id: &str,
    settings: RegistrySettings,
) -> Arc<MemoryRegistry> {
    let bus: Arc<dyn InvalidationBus> = bus.clone();
    Arc::new(
        ResourceRegistry::new(Arc::new(store.realms()), Arc::new(store.resources()))
            .with_settings(settings)
            .with_node_id(node_id)
            .with_bus(bus),
    )
}

/// A single node with a fresh store and realm.
pub async fn single_node() -> (MemoryStore, Arc<MemoryRegistry>, Uuid) {
    init_tracing();
    let store = MemoryStore::new();
    let bus = Arc::new(LocalInvalidationBus::default());
    let registry = node(&store, &bus, "node-a", RegistrySettings::for_testing());
    let realm = registry
        .create_realm(Realm::new("stress"))
        .await
        .expect("realm");
    (store, registry, realm.id)
}
