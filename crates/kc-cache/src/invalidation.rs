//! Cross-process cache invalidation.
//!
//! A node that commits a write publishes an [`InvalidationMessage`]; every
//! other node evicts the affected entries when the message arrives. Until
//! then a peer may serve the pre-write state.

use async_trait::async_trait;
use kc_model::{ResourceScope, ResourceType, UniquenessKey};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::CacheResult;

/// Default capacity of the in-process broadcast channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// What changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvalidationEvent {
    /// A resource was created or its attributes changed.
    Upserted {
        /// Resource ID.
        id: Uuid,
        /// Resource key.
        key: UniquenessKey,
    },
    /// A resource was deleted.
    Deleted {
        /// Resource ID.
        id: Uuid,
        /// Resource key.
        key: UniquenessKey,
    },
    /// A realm and everything in it is gone.
    RealmRemoved {
        /// Realm ID.
        realm_id: Uuid,
    },
    /// Messages may have been lost; drop every cached entry.
    Reset,
}

impl InvalidationEvent {
    /// Realm the event applies to, `None` for a reset.
    #[must_use]
    pub const fn realm_id(&self) -> Option<Uuid> {
        match self {
            Self::Upserted { key, .. } | Self::Deleted { key, .. } => Some(key.scope.realm_id),
            Self::RealmRemoved { realm_id } => Some(*realm_id),
            Self::Reset => None,
        }
    }

    /// Client scope removed along with this event, if any.
    #[must_use]
    pub fn removes_client_scope(&self) -> Option<ResourceScope> {
        match self {
            Self::Deleted { id, key } if key.resource_type == ResourceType::Client => {
                Some(ResourceScope::client(key.scope.realm_id, *id))
            }
            _ => None,
        }
    }
}

/// An invalidation broadcast between nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationMessage {
    /// Node that committed the write.
    pub origin: String,
    /// What changed.
    pub event: InvalidationEvent,
}

impl InvalidationMessage {
    /// Creates a message.
    #[must_use]
    pub fn new(origin: impl Into<String>, event: InvalidationEvent) -> Self {
        Self {
            origin: origin.into(),
            event,
        }
    }

    /// Encodes the message as JSON.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Serialization` if encoding fails.
    pub fn to_json(&self) -> CacheResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a message from JSON.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Serialization` if the payload is malformed.
    pub fn from_json(payload: &str) -> CacheResult<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// Receiving side of an invalidation bus.
pub type InvalidationStream = broadcast::Receiver<InvalidationMessage>;

/// Transport for invalidation messages between nodes.
#[async_trait]
pub trait InvalidationBus: Send + Sync {
    /// Publishes a message to every subscriber, including other nodes.
    async fn publish(&self, message: &InvalidationMessage) -> CacheResult<()>;

    /// Subscribes to messages published after this call.
    fn subscribe(&self) -> InvalidationStream;
}

/// In-process bus.
///
/// Registries sharing one instance behave like nodes of a cluster, which is
/// how multi-node behaviour is exercised without external infrastructure.
#[derive(Debug, Clone)]
pub struct LocalInvalidationBus {
    sender: broadcast::Sender<InvalidationMessage>,
}

impl LocalInvalidationBus {
    /// Creates a bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }
}

impl Default for LocalInvalidationBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

#[async_trait]
impl InvalidationBus for LocalInvalidationBus {
    async fn publish(&self, message: &InvalidationMessage) -> CacheResult<()> {
        // No subscribers is not an error: there is nobody to invalidate.
        let _ = self.sender.send(message.clone());
        Ok(())
    }

    fn subscribe(&self) -> InvalidationStream {
        self.sender.subscribe()
    }
}
