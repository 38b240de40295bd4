//! # kc-server
//!
//! Assembles a registry node from configuration.
//!
//! A node owns a store (in-memory, or `PostgreSQL` when `DATABASE_URL` is
//! set), an invalidation bus (in-process, or Redis when `REDIS_URL` is set),
//! the resource registry and the admin service on top of it. Running a node
//! keeps its invalidation listener alive until a shutdown signal arrives.
//!
//! ## Usage
//!
//! ```ignore
//! use kc_core::Config;
//! use kc_server::Node;
//!
//! let config = Config::from_env()?;
//! let node = Node::build(&config).await?;
//! node.run().await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod providers;

use std::sync::Arc;

use kc_admin_api::AdminService;
use kc_cache::{InvalidationBus, LocalInvalidationBus, ResourceCacheConfig};
use kc_cache_redis::{RedisConfig, RedisInvalidationBus};
use kc_core::Config;
use kc_federation::MapperRegistry;
use kc_registry::ResourceRegistry;
use kc_storage::MemoryStore;
use kc_storage_sql::{PgStore, PoolConfig};
use tracing::{info, warn};

pub use providers::{NodeRealmProvider, NodeResourceProvider, StorageProviders};

/// Registry over the backend selected at startup.
pub type NodeRegistry = ResourceRegistry<NodeRealmProvider, NodeResourceProvider>;

/// Admin service over the backend selected at startup.
pub type NodeAdminService = AdminService<NodeRealmProvider, NodeResourceProvider>;

/// A fully assembled registry node.
pub struct Node {
    registry: Arc<NodeRegistry>,
    admin: NodeAdminService,
    backend: &'static str,
    redis: Option<Arc<RedisInvalidationBus>>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.registry.node_id())
            .field("backend", &self.backend)
            .field("redis", &self.redis.is_some())
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Connects the store and bus named by `config` and builds the node.
    ///
    /// # Errors
    ///
    /// Returns an error if the database or Redis is unreachable, or if
    /// migrations fail.
    pub async fn build(config: &Config) -> anyhow::Result<Self> {
        let providers = match &config.database.url {
            Some(url) => {
                let pool_config = PoolConfig::new(url.clone())
                    .max_connections(config.database.max_connections)
                    .min_connections(config.database.min_connections);
                let store = PgStore::connect(&pool_config).await?;
                if config.database.run_migrations {
                    kc_storage_sql::run_migrations(store.pool()).await?;
                    info!("Database migrations applied");
                }
                StorageProviders::postgres(&store)
            }
            None => {
                warn!("DATABASE_URL not set, using the in-memory store");
                StorageProviders::memory(&MemoryStore::new())
            }
        };

        let (bus, redis): (Arc<dyn InvalidationBus>, _) = match &config.cache.redis_url {
            Some(url) => {
                let redis_config =
                    RedisConfig::from_url(url.clone()).channel_prefix(config.cache.channel_prefix.clone());
                let bus = Arc::new(RedisInvalidationBus::connect(&redis_config).await?);
                info!(channel = bus.channel(), "Redis invalidation bus connected");
                (Arc::clone(&bus) as Arc<dyn InvalidationBus>, Some(bus))
            }
            None => (Arc::new(LocalInvalidationBus::default()) as Arc<dyn InvalidationBus>, None),
        };

        let backend = providers.backend();
        let registry = Arc::new(
            ResourceRegistry::new(Arc::new(providers.realms), Arc::new(providers.resources))
                .with_settings(config.registry.clone())
                .with_node_id(config.node.node_id.clone())
                .with_cache_config(ResourceCacheConfig {
                    enabled: config.cache.enabled,
                    max_entries: config.cache.max_entries,
                })
                .with_bus(bus),
        );
        let admin = AdminService::new(Arc::clone(&registry), Arc::new(MapperRegistry::with_builtin()));

        info!(node_id = registry.node_id(), backend, "Node assembled");
        Ok(Self {
            registry,
            admin,
            backend,
            redis,
        })
    }

    /// The node's registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// The node's admin service.
    #[must_use]
    pub const fn admin(&self) -> &NodeAdminService {
        &self.admin
    }

    /// Name of the store backend.
    #[must_use]
    pub const fn backend(&self) -> &'static str {
        self.backend
    }

    /// Applies peer invalidations until a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis connection cannot be closed cleanly.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = self.registry.spawn_invalidation_listener();
        info!(node_id = self.registry.node_id(), "Node running");

        shutdown_signal().await;

        listener.abort();
        if let Some(redis) = &self.redis {
            redis.shutdown().await?;
        }
        info!("Node shutdown complete");
        Ok(())
    }
}

/// Waits for a shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
