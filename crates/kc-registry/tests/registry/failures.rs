//! Failed and slow commits and reads.

use std::sync::Arc;
use std::time::Duration;

use kc_cache::ResourceCacheConfig;
use kc_core::RegistrySettings;
use kc_model::{Attributes, Realm, ResourceScope, ResourceType};
use kc_registry::{RegistryError, ResourceRegistry};
use kc_storage::MemoryStore;

use crate::common::{init_tracing, single_node, MemoryRegistry};

/// Uncached node so every lookup reaches the store.
async fn uncached_node(settings: RegistrySettings) -> (MemoryStore, MemoryRegistry, ResourceScope) {
    init_tracing();
    let store = MemoryStore::new();
    let registry = ResourceRegistry::new(Arc::new(store.realms()), Arc::new(store.resources()))
        .with_settings(settings)
        .with_cache_config(ResourceCacheConfig::disabled());
    let realm = registry
        .create_realm(Realm::new("reads"))
        .await
        .expect("realm");
    (store, registry, ResourceScope::realm(realm.id))
}

fn retrying(read_retries: u32) -> RegistrySettings {
    RegistrySettings {
        read_retries,
        ..RegistrySettings::for_testing()
    }
}

#[tokio::test]
async fn failed_commit_leaves_nothing_behind() -> anyhow::Result<()> {
    let (store, registry, realm_id) = single_node().await;
    let scope = ResourceScope::realm(realm_id);
    store.fail_next_commits(1);

    let err = registry
        .create_resource(scope, ResourceType::Client, "web", Attributes::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Transient { .. }));

    assert_eq!(store.resource_count(), 0);
    assert_eq!(store.reserved_count(), 0);
    assert!(registry
        .get_resource(&scope, ResourceType::Client, &"web".into())
        .await
        .unwrap_err()
        .is_not_found());
    assert!(registry
        .list_resources(&scope, ResourceType::Client)
        .await?
        .is_empty());

    // The name was never taken.
    registry
        .create_resource(scope, ResourceType::Client, "web", Attributes::new())
        .await?;
    Ok(())
}

#[tokio::test]
async fn commit_timeout_is_ambiguous() -> anyhow::Result<()> {
    let (store, registry, realm_id) = single_node().await;
    let scope = ResourceScope::realm(realm_id);
    store.set_commit_delay(Duration::from_secs(2));

    let err = registry
        .create_resource(scope, ResourceType::Client, "slow", Attributes::new())
        .await
        .unwrap_err();
    assert!(err.is_ambiguous());
    assert!(!err.is_retryable());

    // Caller contract: check before retrying the same name.
    store.clear_faults();
    let lookup = registry
        .get_resource(&scope, ResourceType::Client, &"slow".into())
        .await;
    match lookup {
        Ok(existing) => assert_eq!(existing.name, "slow"),
        Err(e) => {
            assert!(e.is_not_found());
            assert_eq!(store.reserved_count(), 0);
            registry
                .create_resource(scope, ResourceType::Client, "slow", Attributes::new())
                .await?;
        }
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reserved_resource_is_never_visible() -> anyhow::Result<()> {
    let (store, registry, realm_id) = single_node().await;
    let scope = ResourceScope::realm(realm_id);
    store.set_commit_delay(Duration::from_millis(200));

    let pending = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            registry
                .create_resource(scope, ResourceType::Role, "pending", Attributes::new())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.reserved_count(), 1);
    assert!(registry
        .get_resource(&scope, ResourceType::Role, &"pending".into())
        .await
        .unwrap_err()
        .is_not_found());
    assert!(registry
        .list_resources(&scope, ResourceType::Role)
        .await?
        .is_empty());

    let created = pending.await??;
    let fetched = registry
        .get_resource(&scope, ResourceType::Role, &"pending".into())
        .await?;
    assert_eq!(fetched.id, created.id);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn waiter_wins_after_the_first_commit_fails() -> anyhow::Result<()> {
    let (store, registry, realm_id) = single_node().await;
    let scope = ResourceScope::realm(realm_id);
    store.fail_next_commits(1);

    let attempts: Vec<_> = (0..2)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry
                    .create_resource(scope, ResourceType::Client, "contested", Attributes::new())
                    .await
            })
        })
        .collect();

    let mut created = 0;
    let mut failed = 0;
    for attempt in attempts {
        match attempt.await? {
            Ok(_) => created += 1,
            Err(RegistryError::Transient { .. }) => failed += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!((created, failed), (1, 1));
    assert_eq!(store.resource_count(), 1);
    Ok(())
}

#[tokio::test]
async fn transient_reads_are_retried() -> anyhow::Result<()> {
    let (store, registry, scope) = uncached_node(retrying(2)).await;
    let client = registry
        .create_resource(scope, ResourceType::Client, "web", Attributes::new())
        .await?;

    store.fail_next_reads(2);
    let fetched = registry
        .get_resource(&scope, ResourceType::Client, &client.id.into())
        .await?;
    assert_eq!(fetched.id, client.id);
    Ok(())
}

#[tokio::test]
async fn reads_give_up_after_the_retry_budget() -> anyhow::Result<()> {
    let (store, registry, scope) = uncached_node(retrying(2)).await;
    let client = registry
        .create_resource(scope, ResourceType::Client, "web", Attributes::new())
        .await?;

    store.fail_next_reads(3);
    let err = registry
        .get_resource(&scope, ResourceType::Client, &client.id.into())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Transient {
            operation: "get_resource",
            ambiguous: false,
            ..
        }
    ));
    assert!(err.is_retryable());

    // The failures are used up; the next read goes through.
    registry
        .get_resource(&scope, ResourceType::Client, &client.id.into())
        .await?;
    Ok(())
}

#[tokio::test]
async fn slow_reads_time_out_as_retryable() -> anyhow::Result<()> {
    let settings = RegistrySettings {
        read_timeout: Duration::from_millis(50),
        ..retrying(1)
    };
    let (store, registry, scope) = uncached_node(settings).await;
    registry
        .create_resource(scope, ResourceType::Role, "admin", Attributes::new())
        .await?;

    store.set_read_delay(Duration::from_millis(500));
    let err = registry
        .list_resources(&scope, ResourceType::Role)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Transient {
            operation: "list_resources",
            ambiguous: false,
            ..
        }
    ));
    assert!(err.is_retryable());

    store.clear_faults();
    assert_eq!(registry.list_resources(&scope, ResourceType::Role).await?.len(), 1);
    Ok(())
}
