//! Redis pub/sub invalidation bus.
//!
//! Two connections are used: pub/sub mode blocks ordinary commands, so
//! publishing goes through a separate client. Incoming payloads are decoded
//! and fanned out to local subscribers over a broadcast channel.

use fred::prelude::*;
use fred::types::Message;
use kc_cache::{
    CacheError, CacheResult, InvalidationBus, InvalidationEvent, InvalidationMessage,
    InvalidationStream,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RedisConfig;
use crate::error::from_redis_error;

/// Origin stamped on resets generated by the bus itself.
pub const BUS_ORIGIN: &str = "redis-bus";

/// Invalidation bus backed by a Redis pub/sub channel.
pub struct RedisInvalidationBus {
    publisher: Client,
    subscriber: Client,
    channel: String,
    sender: broadcast::Sender<InvalidationMessage>,
    tasks: Vec<JoinHandle<()>>,
}

impl RedisInvalidationBus {
    /// Connects both clients and subscribes to the invalidation channel.
    ///
    /// ## Errors
    ///
    /// Returns an error if the URL is invalid or Redis is unreachable.
    pub async fn connect(config: &RedisConfig) -> CacheResult<Self> {
        let publisher = connect_client(config).await?;
        let subscriber = connect_client(config).await?;
        let channel = config.invalidation_channel();
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));

        let tasks = vec![
            tokio::spawn(forward_messages(
                subscriber.message_rx(),
                channel.clone(),
                sender.clone(),
            )),
            tokio::spawn(resubscribe_on_reconnect(
                subscriber.clone(),
                channel.clone(),
                sender.clone(),
            )),
        ];

        subscriber
            .subscribe(channel.clone())
            .await
            .map_err(from_redis_error)?;
        info!(%channel, "subscribed to invalidation channel");

        Ok(Self {
            publisher,
            subscriber,
            channel,
            sender,
            tasks,
        })
    }

    /// Channel this bus publishes to.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Closes both connections.
    ///
    /// ## Errors
    ///
    /// Returns an error if Redis rejects the quit.
    pub async fn shutdown(&self) -> CacheResult<()> {
        for task in &self.tasks {
            task.abort();
        }
        self.subscriber.quit().await.map_err(from_redis_error)?;
        self.publisher.quit().await.map_err(from_redis_error)
    }
}

impl Drop for RedisInvalidationBus {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl std::fmt::Debug for RedisInvalidationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisInvalidationBus")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl InvalidationBus for RedisInvalidationBus {
    async fn publish(&self, message: &InvalidationMessage) -> CacheResult<()> {
        let payload = message.to_json()?;
        let receivers: i64 = self
            .publisher
            .publish(self.channel.clone(), payload)
            .await
            .map_err(from_redis_error)?;
        debug!(receivers, event = ?message.event, "published invalidation");
        Ok(())
    }

    fn subscribe(&self) -> InvalidationStream {
        self.sender.subscribe()
    }
}

async fn connect_client(config: &RedisConfig) -> CacheResult<Client> {
    let redis_config = Config::from_url(&config.connection_url())
        .map_err(|e| CacheError::Configuration(e.to_string()))?;

    let client = Client::new(
        redis_config,
        None,
        None,
        Some(ReconnectPolicy::new_exponential(0, 1000, 30_000, 2)),
    );
    client.init().await.map_err(from_redis_error)?;
    Ok(client)
}

fn reset() -> InvalidationMessage {
    InvalidationMessage::new(BUS_ORIGIN, InvalidationEvent::Reset)
}

async fn forward_messages(
    mut messages: broadcast::Receiver<Message>,
    channel: String,
    sender: broadcast::Sender<InvalidationMessage>,
) {
    loop {
        match messages.recv().await {
            Ok(message) => {
                if &*message.channel != channel.as_str() {
                    continue;
                }
                let Some(payload) = message.value.as_string() else {
                    warn!("ignoring non-text invalidation payload");
                    continue;
                };
                match InvalidationMessage::from_json(&payload) {
                    Ok(decoded) => {
                        let _ = sender.send(decoded);
                    }
                    Err(e) => warn!(error = %e, "ignoring malformed invalidation payload"),
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "invalidation listener lagged; resetting caches");
                let _ = sender.send(reset());
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn resubscribe_on_reconnect(
    subscriber: Client,
    channel: String,
    sender: broadcast::Sender<InvalidationMessage>,
) {
    let mut reconnects = subscriber.reconnect_rx();
    loop {
        match reconnects.recv().await {
            Ok(server) => {
                info!(?server, "redis reconnected; resubscribing");
                if let Err(e) = subscriber.subscribe(channel.clone()).await {
                    warn!(error = %e, "resubscribe failed");
                }
                // Anything published while disconnected is lost.
                let _ = sender.send(reset());
            }
            Err(RecvError::Lagged(_)) => {
                let _ = sender.send(reset());
            }
            Err(RecvError::Closed) => break,
        }
    }
}
