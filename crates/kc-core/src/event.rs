//! Admin event model.
//!
//! Every successful or failed administrative write produces an [`Event`]
//! carrying the realm, the affected resource and the outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Realm created.
    RealmCreated,
    /// Realm deleted.
    RealmDeleted,
    /// Client created.
    ClientCreated,
    /// Client attributes updated.
    ClientUpdated,
    /// Client deleted.
    ClientDeleted,
    /// Role created.
    RoleCreated,
    /// Role deleted.
    RoleDeleted,
    /// Attribute mapper registered.
    MapperRegistered,
    /// Attributes synchronized through a mapper.
    AttributesSynced,
}

/// Outcome of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOutcome {
    /// The operation succeeded.
    Success,
    /// The operation failed.
    Failure,
}

/// An administrative event for audit logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier.
    pub id: Uuid,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub event_type: EventType,
    /// Whether it succeeded.
    pub outcome: EventOutcome,
    /// Realm context.
    pub realm_id: Option<Uuid>,
    /// Affected resource.
    pub resource_id: Option<Uuid>,
    /// Affected resource name.
    pub resource_name: Option<String>,
    /// Node that served the operation.
    pub node_id: Option<String>,
    /// Error description for failures.
    pub error: Option<String>,
    /// Additional key-value details.
    pub details: Vec<(String, String)>,
}

impl Event {
    /// Starts building an event.
    #[must_use]
    pub const fn builder(event_type: EventType) -> EventBuilder {
        EventBuilder::new(event_type)
    }

    /// Looks up a detail value.
    #[must_use]
    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Builder for creating events.
pub struct EventBuilder {
    event_type: EventType,
    outcome: EventOutcome,
    realm_id: Option<Uuid>,
    resource_id: Option<Uuid>,
    resource_name: Option<String>,
    node_id: Option<String>,
    error: Option<String>,
    details: Vec<(String, String)>,
}

impl EventBuilder {
    /// Creates a builder for a successful event.
    #[must_use]
    pub const fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            outcome: EventOutcome::Success,
            realm_id: None,
            resource_id: None,
            resource_name: None,
            node_id: None,
            error: None,
            details: Vec::new(),
        }
    }

    /// Marks the event as successful.
    #[must_use]
    pub const fn success(mut self) -> Self {
        self.outcome = EventOutcome::Success;
        self
    }

    /// Marks the event as failed.
    #[must_use]
    pub fn failure(mut self, error: impl Into<String>) -> Self {
        self.outcome = EventOutcome::Failure;
        self.error = Some(error.into());
        self
    }

    /// Sets the realm.
    #[must_use]
    pub const fn realm(mut self, realm_id: Uuid) -> Self {
        self.realm_id = Some(realm_id);
        self
    }

    /// Sets the affected resource.
    #[must_use]
    pub fn resource(mut self, id: Uuid, name: impl Into<String>) -> Self {
        self.resource_id = Some(id);
        self.resource_name = Some(name.into());
        self
    }

    /// Sets the serving node.
    #[must_use]
    pub fn node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Adds a detail.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.push((key.into(), value.into()));
        self
    }

    /// Builds the event.
    #[must_use]
    pub fn build(self) -> Event {
        Event {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            event_type: self.event_type,
            outcome: self.outcome,
            realm_id: self.realm_id,
            resource_id: self.resource_id,
            resource_name: self.resource_name,
            node_id: self.node_id,
            error: self.error,
            details: self.details,
        }
    }
}
