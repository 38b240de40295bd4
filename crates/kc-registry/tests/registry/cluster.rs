//! Two nodes sharing one store and one invalidation bus.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use kc_cache::{InvalidationBus, InvalidationEvent, InvalidationMessage, LocalInvalidationBus};
use kc_core::RegistrySettings;
use kc_model::{Attributes, Realm, ResourceScope, ResourceType};
use kc_storage::MemoryStore;
use uuid::Uuid;

use crate::common::{init_tracing, node, MemoryRegistry};

const CONVERGENCE_TIMEOUT: Duration = Duration::from_secs(2);

struct Cluster {
    a: Arc<MemoryRegistry>,
    b: Arc<MemoryRegistry>,
    bus: Arc<LocalInvalidationBus>,
    scope: ResourceScope,
}

async fn cluster(capacity: usize) -> Cluster {
    init_tracing();
    let store = MemoryStore::new();
    let bus = Arc::new(LocalInvalidationBus::new(capacity));
    let a = node(&store, &bus, "node-a", RegistrySettings::for_testing());
    let b = node(&store, &bus, "node-b", RegistrySettings::for_testing());
    a.spawn_invalidation_listener();
    b.spawn_invalidation_listener();

    let realm = a.create_realm(Realm::new("cluster")).await.expect("realm");
    Cluster {
        a,
        b,
        bus,
        scope: ResourceScope::realm(realm.id),
    }
}

async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + CONVERGENCE_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn peer_list_converges_after_create() -> anyhow::Result<()> {
    let c = cluster(1024).await;

    // Node B caches an empty list.
    assert!(c.b.list_resources(&c.scope, ResourceType::Client).await?.is_empty());

    let web = c
        .a
        .create_resource(c.scope, ResourceType::Client, "web", Attributes::new())
        .await?;

    let b = Arc::clone(&c.b);
    let scope = c.scope;
    let web_id = web.id;
    let converged = eventually(|| {
        let b = Arc::clone(&b);
        async move {
            b.list_resources(&scope, ResourceType::Client)
                .await
                .is_ok_and(|listed| listed.iter().any(|r| r.id == web_id))
        }
    })
    .await;
    assert!(converged, "node B never saw the create");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn peer_lookup_miss_reads_the_store() -> anyhow::Result<()> {
    let c = cluster(1024).await;

    let web = c
        .a
        .create_resource(c.scope, ResourceType::Client, "web", Attributes::new())
        .await?;

    // Nothing cached on B, so the store answers directly.
    let fetched = c
        .b
        .get_resource(&c.scope, ResourceType::Client, &"web".into())
        .await?;
    assert_eq!(fetched.id, web.id);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn peer_drops_deleted_resource() -> anyhow::Result<()> {
    let c = cluster(1024).await;

    let web = c
        .a
        .create_resource(c.scope, ResourceType::Client, "web", Attributes::new())
        .await?;
    c.b.get_resource(&c.scope, ResourceType::Client, &web.id.into())
        .await?;

    c.a.delete_resource(&c.scope, web.id).await?;

    let b = Arc::clone(&c.b);
    let scope = c.scope;
    let web_id = web.id;
    let converged = eventually(|| {
        let b = Arc::clone(&b);
        async move {
            b.get_resource(&scope, ResourceType::Client, &web_id.into())
                .await
                .is_err_and(|e| e.is_not_found())
        }
    })
    .await;
    assert!(converged, "node B kept serving a deleted client");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn creates_across_nodes_have_one_winner() -> anyhow::Result<()> {
    let c = cluster(1024).await;

    let attempts = (0..12).map(|i| {
        let registry = if i % 2 == 0 {
            Arc::clone(&c.a)
        } else {
            Arc::clone(&c.b)
        };
        let scope = c.scope;
        tokio::spawn(async move {
            registry
                .create_resource(scope, ResourceType::Client, "shared", Attributes::new())
                .await
        })
    });
    let results = join_all(attempts).await;

    let mut winners = 0;
    for joined in results {
        match joined? {
            Ok(_) => winners += 1,
            Err(e) => assert!(e.is_conflict(), "unexpected error: {e}"),
        }
    }
    assert_eq!(winners, 1);
    Ok(())
}

#[tokio::test]
async fn lagging_listener_clears_the_cache() -> anyhow::Result<()> {
    let c = cluster(2).await;

    let web = c
        .a
        .create_resource(c.scope, ResourceType::Client, "web", Attributes::new())
        .await?;
    // Let B's listener drain the create before warming its cache.
    tokio::task::yield_now().await;
    c.b.get_resource(&c.scope, ResourceType::Client, &web.id.into())
        .await?;
    assert_eq!(c.b.cache().len(), 1);

    // Overflow the channel before B's listener gets to run.
    for _ in 0..8 {
        let unrelated = InvalidationEvent::RealmRemoved {
            realm_id: Uuid::now_v7(),
        };
        c.bus
            .publish(&InvalidationMessage::new("node-x", unrelated))
            .await?;
    }

    let b = Arc::clone(&c.b);
    let cleared = eventually(|| {
        let b = Arc::clone(&b);
        async move { b.cache().is_empty() }
    })
    .await;
    assert!(cleared, "lagged listener kept stale entries");
    Ok(())
}
