//! Configuration management.
//!
//! Configuration is loaded from environment variables (with `.env` support)
//! or from a TOML file. Every value has a default so a node can start with
//! an in-memory store and an in-process invalidation bus.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node identity.
    pub node: NodeConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Cache configuration.
    pub cache: CacheConfig,
    /// Registry behaviour.
    pub registry: RegistrySettings,
}

/// Node identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Identifier stamped on outgoing invalidation messages.
    pub node_id: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: format!("node-{}", &Uuid::new_v4().simple().to_string()[..8]),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL. The in-memory store is used when absent.
    pub url: Option<String>,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    pub min_connections: u32,
    /// Run embedded migrations on startup.
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            min_connections: 1,
            run_migrations: true,
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the per-process resource cache.
    pub enabled: bool,
    /// Upper bound on cached resources.
    pub max_entries: usize,
    /// Redis URL for cross-process invalidation. In-process bus when absent.
    pub redis_url: Option<String>,
    /// Prefix for the invalidation channel.
    pub channel_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 100_000,
            redis_url: None,
            channel_prefix: "kc".to_string(),
        }
    }
}

/// Registry timing and locking behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Upper bound on a write transaction, commit included.
    #[serde(with = "humantime_serde")]
    pub commit_timeout: Duration,
    /// Upper bound on a single read.
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    /// How many times a transient read failure is retried.
    pub read_retries: u32,
    /// Serialize colliding creates on this node before they reach the store.
    pub advisory_locks: bool,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            commit_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(2),
            read_retries: 2,
            advisory_locks: true,
        }
    }
}

impl RegistrySettings {
    /// Settings suited to tests: short timeouts, no retries.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            commit_timeout: Duration::from_millis(500),
            read_timeout: Duration::from_millis(500),
            read_retries: 0,
            advisory_locks: true,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a key holds an unparsable value.
    pub fn from_source(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(node_id) = lookup("KC_NODE_ID") {
            config.node.node_id = node_id;
        }

        config.database.url = lookup("DATABASE_URL");
        config.database.max_connections = parse_or(
            &lookup,
            "KC_DB_MAX_CONNECTIONS",
            config.database.max_connections,
        )?;
        config.database.min_connections = parse_or(
            &lookup,
            "KC_DB_MIN_CONNECTIONS",
            config.database.min_connections,
        )?;
        config.database.run_migrations =
            bool_or(&lookup, "KC_DB_RUN_MIGRATIONS", config.database.run_migrations)?;

        config.cache.enabled = bool_or(&lookup, "KC_CACHE_ENABLED", config.cache.enabled)?;
        config.cache.max_entries =
            parse_or(&lookup, "KC_CACHE_MAX_ENTRIES", config.cache.max_entries)?;
        config.cache.redis_url = lookup("REDIS_URL");
        if let Some(prefix) = lookup("KC_CACHE_CHANNEL_PREFIX") {
            config.cache.channel_prefix = prefix;
        }

        config.registry.commit_timeout = millis_or(
            &lookup,
            "KC_COMMIT_TIMEOUT_MS",
            config.registry.commit_timeout,
        )?;
        config.registry.read_timeout =
            millis_or(&lookup, "KC_READ_TIMEOUT_MS", config.registry.read_timeout)?;
        config.registry.read_retries =
            parse_or(&lookup, "KC_READ_RETRIES", config.registry.read_retries)?;
        config.registry.advisory_locks =
            bool_or(&lookup, "KC_ADVISORY_LOCKS", config.registry.advisory_locks)?;

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.node.node_id.trim().is_empty() {
            return Err(Error::Config("node id must not be empty".to_string()));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(Error::Config(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }
        if self.registry.commit_timeout.is_zero() || self.registry.read_timeout.is_zero() {
            return Err(Error::Config("timeouts must be greater than zero".to_string()));
        }
        Ok(())
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| Error::invalid_value(key, raw.clone(), e.to_string())),
        None => Ok(default),
    }
}

fn bool_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool> {
    match lookup(key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(Error::invalid_value(key, raw, "expected a boolean")),
        },
        None => Ok(default),
    }
}

fn millis_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_or(lookup, key, default_ms).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn source(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_use_memory_store_and_local_bus() {
        let config = Config::from_source(source(&[])).unwrap();

        assert!(config.database.url.is_none());
        assert!(config.cache.redis_url.is_none());
        assert!(config.cache.enabled);
        assert!(config.registry.advisory_locks);
        assert_eq!(config.registry.commit_timeout, Duration::from_secs(5));
        assert!(config.node.node_id.starts_with("node-"));
    }

    #[test]
    fn environment_overrides() {
        let config = Config::from_source(source(&[
            ("KC_NODE_ID", "node-a"),
            ("DATABASE_URL", "postgres://localhost/registry"),
            ("KC_COMMIT_TIMEOUT_MS", "250"),
            ("KC_READ_RETRIES", "5"),
            ("KC_CACHE_ENABLED", "false"),
            ("KC_ADVISORY_LOCKS", "0"),
        ]))
        .unwrap();

        assert_eq!(config.node.node_id, "node-a");
        assert_eq!(
            config.database.url.as_deref(),
            Some("postgres://localhost/registry")
        );
        assert_eq!(config.registry.commit_timeout, Duration::from_millis(250));
        assert_eq!(config.registry.read_retries, 5);
        assert!(!config.cache.enabled);
        assert!(!config.registry.advisory_locks);
    }

    #[test]
    fn unparsable_values_are_rejected() {
        let err = Config::from_source(source(&[("KC_READ_RETRIES", "lots")])).unwrap_err();
        assert!(matches!(err, Error::InvalidValue { ref key, .. } if key == "KC_READ_RETRIES"));

        let err = Config::from_source(source(&[("KC_CACHE_ENABLED", "maybe")])).unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = Config::from_source(source(&[("KC_COMMIT_TIMEOUT_MS", "0")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn toml_with_humantime_durations() {
        let config = Config::from_toml(
            r#"
            [node]
            node_id = "node-b"

            [registry]
            commit_timeout = "750ms"
            read_timeout = "1s"
            read_retries = 1

            [cache]
            redis_url = "redis://localhost:6379"
            "#,
        )
        .unwrap();

        assert_eq!(config.node.node_id, "node-b");
        assert_eq!(config.registry.commit_timeout, Duration::from_millis(750));
        assert_eq!(config.registry.read_timeout, Duration::from_secs(1));
        assert_eq!(config.cache.redis_url.as_deref(), Some("redis://localhost:6379"));
        assert!(config.cache.enabled);
    }
}
