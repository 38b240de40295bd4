//! Redis connection configuration.

use serde::{Deserialize, Serialize};

/// Redis connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Full connection URL. Takes precedence over the individual fields.
    pub url: Option<String>,
    /// Redis server host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Redis server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Redis password (optional).
    pub password: Option<String>,
    /// Redis database number.
    #[serde(default)]
    pub database: u8,
    /// Use TLS for connection.
    #[serde(default)]
    pub tls: bool,
    /// Prefix for the invalidation channel name.
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
    /// Capacity of the local fan-out channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: default_host(),
            port: default_port(),
            password: None,
            database: 0,
            tls: false,
            channel_prefix: default_channel_prefix(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl RedisConfig {
    /// Creates a configuration from a connection URL.
    #[must_use]
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Sets the Redis host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the Redis port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the Redis password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the Redis database number.
    #[must_use]
    pub const fn database(mut self, database: u8) -> Self {
        self.database = database;
        self
    }

    /// Enables TLS.
    #[must_use]
    pub const fn tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Sets the channel prefix.
    #[must_use]
    pub fn channel_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.channel_prefix = prefix.into();
        self
    }

    /// Builds the Redis connection URL.
    #[must_use]
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let scheme = if self.tls { "rediss" } else { "redis" };
        let auth = self
            .password
            .as_ref()
            .map(|p| format!(":{p}@"))
            .unwrap_or_default();
        format!(
            "{scheme}://{auth}{host}:{port}/{db}",
            host = self.host,
            port = self.port,
            db = self.database
        )
    }

    /// Name of the pub/sub channel carrying invalidations.
    #[must_use]
    pub fn invalidation_channel(&self) -> String {
        if self.channel_prefix.is_empty() {
            "registry:invalidation".to_string()
        } else {
            format!("{}:registry:invalidation", self.channel_prefix)
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

const fn default_port() -> u16 {
    6379
}

fn default_channel_prefix() -> String {
    "kc".to_string()
}

const fn default_channel_capacity() -> usize {
    kc_cache::DEFAULT_CHANNEL_CAPACITY
}
