//! PostgreSQL-backed integration tests for the resource registry.
//!
//! Each test starts an ephemeral PostgreSQL container through
//! testcontainers, so Docker must be available. Run with:
//!
//! ```text
//! cargo test -p kc-integration-tests -- --ignored
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use kc_integration_tests::TestEnv;
use kc_model::{Attributes, ResourceLookup, ResourceScope, ResourceType};
use kc_registry::{
    run_stress, ContendedCreateTask, CreateClientsTask, CreateRolesTask, RegistryError,
    StressConfig,
};
use tokio::task::JoinSet;

#[tokio::test]
#[ignore = "requires docker"]
async fn concurrent_distinct_creates_are_all_visible() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let registry = env.node("node-a");
    let realm = env.realm(&registry).await?;

    let task = Arc::new(CreateClientsTask::new(Arc::clone(&registry), realm.id));
    let report = run_stress(StressConfig::default(), task).await?;
    assert_eq!(report.completed, 30);

    let listed = registry
        .list_resources(&ResourceScope::realm(realm.id), ResourceType::Client)
        .await?;
    assert_eq!(listed.len(), 30);

    let names: HashSet<_> = listed.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names.len(), 30);
    let ids: HashSet<_> = listed.iter().map(|c| c.id).collect();
    assert_eq!(ids.len(), 30);
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn concurrent_role_creates_in_both_scopes() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let registry = env.node("node-a");
    let realm = env.realm(&registry).await?;
    let client = registry
        .create_resource(
            ResourceScope::realm(realm.id),
            ResourceType::Client,
            "app",
            Attributes::new(),
        )
        .await?;

    let config = StressConfig {
        workers: 4,
        iterations: 5,
        serialized: false,
    };
    run_stress(
        config,
        Arc::new(CreateRolesTask::realm_roles(Arc::clone(&registry), realm.id)),
    )
    .await?;
    run_stress(
        config,
        Arc::new(CreateRolesTask::client_roles(
            Arc::clone(&registry),
            realm.id,
            client.id,
        )),
    )
    .await?;

    let realm_roles = registry
        .list_resources(&ResourceScope::realm(realm.id), ResourceType::Role)
        .await?;
    let client_roles = registry
        .list_resources(&ResourceScope::client(realm.id, client.id), ResourceType::Role)
        .await?;
    assert_eq!(realm_roles.len(), 20);
    assert_eq!(client_roles.len(), 20);
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn same_name_race_has_one_winner() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    // Two nodes so the race is decided by the database, not a node-local lock.
    let nodes = [env.node("node-a"), env.node("node-b")];
    let realm = env.realm(&nodes[0]).await?;
    let scope = ResourceScope::realm(realm.id);

    let mut racers = JoinSet::new();
    for i in 0..8 {
        let registry = Arc::clone(&nodes[i % 2]);
        racers.spawn(async move {
            registry
                .create_resource(scope, ResourceType::Client, "shared", Attributes::new())
                .await
        });
    }

    let (mut created, mut conflicts) = (0, 0);
    while let Some(result) = racers.join_next().await {
        match result? {
            Ok(_) => created += 1,
            Err(RegistryError::Conflict { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 7);

    let shared: Vec<_> = nodes[1]
        .list_resources(&scope, ResourceType::Client)
        .await?
        .into_iter()
        .filter(|c| c.name == "shared")
        .collect();
    assert_eq!(shared.len(), 1);
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn contended_creates_across_iterations() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let registry = env.node("node-a");
    let realm = env.realm(&registry).await?;

    let task = Arc::new(ContendedCreateTask::new(
        Arc::clone(&registry),
        realm.id,
        "shared",
    ));
    run_stress(StressConfig::default(), Arc::clone(&task)).await?;

    assert_eq!(task.created(), 10);
    assert_eq!(task.conflicts(), 20);
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn deleted_name_is_reusable() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let registry = env.node("node-a");
    let realm = env.realm(&registry).await?;
    let scope = ResourceScope::realm(realm.id);

    let first = registry
        .create_resource(scope, ResourceType::Role, "role-a", Attributes::new())
        .await?;
    registry.delete_resource(&scope, first.id).await?;
    let second = registry
        .create_resource(scope, ResourceType::Role, "role-a", Attributes::new())
        .await?;

    assert_ne!(first.id, second.id);
    let found = registry
        .get_resource(&scope, ResourceType::Role, &ResourceLookup::from("role-a"))
        .await?;
    assert_eq!(found.id, second.id);
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn stale_update_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let registry = env.node("node-a");
    let realm = env.realm(&registry).await?;
    let scope = ResourceScope::realm(realm.id);

    let client = registry
        .create_resource(scope, ResourceType::Client, "app", Attributes::new())
        .await?;
    let mut attributes = Attributes::new();
    attributes.insert("tier".to_string(), vec!["gold".to_string()]);

    let updated = registry
        .update_attributes(&scope, client.id, client.version, &attributes)
        .await?;
    assert_eq!(updated.version, client.version + 1);

    let err = registry
        .update_attributes(&scope, client.id, client.version, &attributes)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistryError::StaleVersion { actual, .. } if actual == updated.version
    ));
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn delete_on_one_node_invalidates_the_other() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let node_a = env.node("node-a");
    let node_b = env.node("node-b");
    let listener_a = node_a.spawn_invalidation_listener();
    let listener_b = node_b.spawn_invalidation_listener();

    let realm = env.realm(&node_a).await?;
    let scope = ResourceScope::realm(realm.id);
    let client = node_b
        .create_resource(scope, ResourceType::Client, "app", Attributes::new())
        .await?;

    // Warm node A's cache.
    let lookup = ResourceLookup::from("app");
    node_a.get_resource(&scope, ResourceType::Client, &lookup).await?;
    node_b.delete_resource(&scope, client.id).await?;

    let gone = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match node_a.get_resource(&scope, ResourceType::Client, &lookup).await {
                Err(RegistryError::NotFound { .. }) => break,
                _ => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
    })
    .await;
    assert!(gone.is_ok(), "node-a still serves the deleted client");

    listener_a.abort();
    listener_b.abort();
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn deletes_cascade_to_owned_resources() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let registry = env.node("node-a");
    let realm = env.realm(&registry).await?;
    let realm_scope = ResourceScope::realm(realm.id);

    let client = registry
        .create_resource(realm_scope, ResourceType::Client, "app", Attributes::new())
        .await?;
    let client_scope = ResourceScope::client(realm.id, client.id);
    registry
        .create_resource(client_scope, ResourceType::Role, "admin", Attributes::new())
        .await?;
    assert_eq!(
        registry.list_resources(&client_scope, ResourceType::Role).await?.len(),
        1
    );

    registry.delete_resource(&realm_scope, client.id).await?;
    assert!(matches!(
        registry.list_resources(&client_scope, ResourceType::Role).await,
        Err(RegistryError::NotFound { .. })
    ));

    registry
        .create_resource(realm_scope, ResourceType::Role, "viewer", Attributes::new())
        .await?;
    registry.delete_realm(realm.id).await?;
    assert!(matches!(
        registry.find_realm(&realm.name).await,
        Err(RegistryError::NotFound { .. })
    ));
    assert!(matches!(
        registry.list_resources(&realm_scope, ResourceType::Role).await,
        Err(RegistryError::NotFound { .. })
    ));
    Ok(())
}
