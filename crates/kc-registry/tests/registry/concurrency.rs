//! Uniqueness and visibility under concurrent creates.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use kc_core::RegistrySettings;
use kc_model::{Attributes, ResourceScope, ResourceType};
use kc_registry::{
    run_stress, ContendedCreateTask, CreateClientsTask, CreateRolesTask, RegistryError,
    StressConfig, StressTask,
};

use crate::common::single_node;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_names_are_never_lost() -> anyhow::Result<()> {
    let (_store, registry, realm_id) = single_node().await;
    let scope = ResourceScope::realm(realm_id);

    let task = Arc::new(CreateClientsTask::new(Arc::clone(&registry), realm_id));
    let report = run_stress(StressConfig::default(), task).await?;
    assert_eq!(report.completed, 30);

    let clients = registry.list_resources(&scope, ResourceType::Client).await?;
    assert_eq!(clients.len(), 30);

    let ids: HashSet<_> = clients.iter().map(|c| c.id).collect();
    assert_eq!(ids.len(), 30);

    for worker in 0..3 {
        for iteration in 0..10 {
            let name = format!("c-{worker}-{iteration}");
            assert_eq!(clients.iter().filter(|c| c.name == name).count(), 1, "{name}");
            registry
                .get_resource(&scope, ResourceType::Client, &name.as_str().into())
                .await?;
        }
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exactly_one_create_of_a_shared_name_wins() -> anyhow::Result<()> {
    let (_store, registry, realm_id) = single_node().await;
    let scope = ResourceScope::realm(realm_id);

    let attempts = (0..16).map(|_| {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            registry
                .create_resource(scope, ResourceType::Client, "shared", Attributes::new())
                .await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(RegistryError::Conflict { .. })))
        .count();
    assert_eq!(winners.len(), 1);
    assert_eq!(conflicts, 15);

    let listed = registry.list_resources(&scope, ResourceType::Client).await?;
    let shared: Vec<_> = listed.iter().filter(|c| c.name == "shared").collect();
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].id, winners[0].id);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn store_alone_enforces_uniqueness_without_advisory_locks() -> anyhow::Result<()> {
    let (store, _registry, realm_id) = single_node().await;
    let bus = Arc::new(kc_cache::LocalInvalidationBus::default());
    let settings = RegistrySettings {
        advisory_locks: false,
        ..RegistrySettings::for_testing()
    };
    let registry = crate::common::node(&store, &bus, "node-unlocked", settings);

    let task = Arc::new(ContendedCreateTask::new(Arc::clone(&registry), realm_id, "hot"));
    let config = StressConfig {
        workers: 8,
        iterations: 20,
        serialized: false,
    };
    run_stress(config, Arc::clone(&task)).await?;

    assert_eq!(task.created(), 20);
    assert_eq!(task.conflicts(), 7 * 20);
    assert_eq!(store.resource_count(), 20);
    Ok(())
}

#[tokio::test]
async fn deleted_name_can_be_reused_with_a_new_id() -> anyhow::Result<()> {
    let (_store, registry, realm_id) = single_node().await;
    let scope = ResourceScope::realm(realm_id);

    let first = registry
        .create_resource(scope, ResourceType::Role, "role-a", Attributes::new())
        .await?;
    registry.delete_resource(&scope, first.id).await?;
    let second = registry
        .create_resource(scope, ResourceType::Role, "role-a", Attributes::new())
        .await?;

    assert_ne!(first.id, second.id);
    let fetched = registry
        .get_resource(&scope, ResourceType::Role, &"role-a".into())
        .await?;
    assert_eq!(fetched.id, second.id);
    Ok(())
}

#[tokio::test]
async fn own_writes_are_visible_immediately() -> anyhow::Result<()> {
    let (_store, registry, realm_id) = single_node().await;
    let scope = ResourceScope::realm(realm_id);

    for i in 0..25 {
        // Warm the list cache so each create has to invalidate it.
        registry.list_resources(&scope, ResourceType::Role).await?;
        let role = registry
            .create_resource(scope, ResourceType::Role, &format!("role-{i}"), Attributes::new())
            .await?;

        let listed = registry.list_resources(&scope, ResourceType::Role).await?;
        assert_eq!(listed.len(), i + 1);
        assert_eq!(listed.last().map(|r| r.id), Some(role.id), "creation order");
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn realm_and_client_roles_under_stress() -> anyhow::Result<()> {
    let (_store, registry, realm_id) = single_node().await;

    let realm_roles = Arc::new(CreateRolesTask::realm_roles(Arc::clone(&registry), realm_id));
    run_stress(StressConfig::default(), realm_roles).await?;

    let client = registry
        .create_resource(
            ResourceScope::realm(realm_id),
            ResourceType::Client,
            "role-owner",
            Attributes::new(),
        )
        .await?;
    let client_roles = Arc::new(CreateRolesTask::client_roles(
        Arc::clone(&registry),
        realm_id,
        client.id,
    ));
    run_stress(StressConfig::default(), client_roles).await?;

    // Same names, different scopes: both sets exist.
    let realm_listed = registry
        .list_resources(&ResourceScope::realm(realm_id), ResourceType::Role)
        .await?;
    let client_listed = registry
        .list_resources(&ResourceScope::client(realm_id, client.id), ResourceType::Role)
        .await?;
    assert_eq!(realm_listed.len(), 30);
    assert_eq!(client_listed.len(), 30);
    Ok(())
}

/// Wraps a task and records the most iterations seen in flight at once.
struct Overlap<T> {
    inner: Arc<T>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl<T> Overlap<T> {
    fn new(inner: Arc<T>) -> Self {
        Self {
            inner,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    fn max_active(&self) -> usize {
        self.max_active.load(Ordering::Acquire)
    }
}

#[async_trait]
impl<T: StressTask> StressTask for Overlap<T> {
    async fn run(&self, worker: usize, iteration: usize) -> anyhow::Result<()> {
        let now = self.active.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_active.fetch_max(now, Ordering::AcqRel);
        tokio::time::sleep(Duration::from_millis(2)).await;
        let result = self.inner.run(worker, iteration).await;
        self.active.fetch_sub(1, Ordering::AcqRel);
        result
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn serialized_mode_produces_the_same_result() -> anyhow::Result<()> {
    let (_store, registry, realm_id) = single_node().await;

    let task = Arc::new(Overlap::new(Arc::new(CreateClientsTask::new(
        Arc::clone(&registry),
        realm_id,
    ))));
    let config = StressConfig {
        serialized: true,
        ..StressConfig::default()
    };
    let report = run_stress(config, Arc::clone(&task)).await?;

    assert_eq!(report.completed, 30);
    assert_eq!(task.max_active(), 1);
    let listed = registry
        .list_resources(&ResourceScope::realm(realm_id), ResourceType::Client)
        .await?;
    assert_eq!(listed.len(), 30);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_mode_runs_workers_together() -> anyhow::Result<()> {
    let (_store, registry, realm_id) = single_node().await;

    let task = Arc::new(Overlap::new(Arc::new(CreateClientsTask::new(
        Arc::clone(&registry),
        realm_id,
    ))));
    let report = run_stress(StressConfig::default(), Arc::clone(&task)).await?;

    assert_eq!(report.completed, 30);
    assert!(task.max_active() > 1, "workers never overlapped");
    Ok(())
}
