//! Admin event logging.
//!
//! Successful administrative writes are recorded as [`Event`]s.

use kc_core::event::Event;
use parking_lot::RwLock;

// ============================================================================
// Event Logger Trait
// ============================================================================

/// Trait for logging admin events.
///
/// Implementations can write to various destinations, such as a database
/// table, a log pipeline or a message queue.
#[allow(async_fn_in_trait)]
pub trait AdminEventLogger: Send + Sync {
    /// Logs an admin event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event could not be logged.
    async fn log(&self, event: Event) -> Result<(), EventLogError>;
}

/// Errors that can occur during event logging.
#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ============================================================================
// In-Memory Logger (for testing)
// ============================================================================

/// In-memory event logger for testing.
#[derive(Debug, Default)]
pub struct InMemoryEventLogger {
    events: RwLock<Vec<Event>>,
}

impl InMemoryEventLogger {
    /// Creates a new in-memory logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all logged events.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Clears all logged events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl AdminEventLogger for InMemoryEventLogger {
    async fn log(&self, event: Event) -> Result<(), EventLogError> {
        self.events.write().push(event);
        Ok(())
    }
}

impl<L: AdminEventLogger> AdminEventLogger for std::sync::Arc<L> {
    async fn log(&self, event: Event) -> Result<(), EventLogError> {
        (**self).log(event).await
    }
}

// ============================================================================
// Tracing Logger
// ============================================================================

/// Event logger that writes to the tracing framework.
///
/// Events are logged at the INFO level, with details as a JSON string.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventLogger;

impl TracingEventLogger {
    /// Creates a new tracing logger.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl AdminEventLogger for TracingEventLogger {
    async fn log(&self, event: Event) -> Result<(), EventLogError> {
        let details = serde_json::to_string(&event.details)?;
        tracing::info!(
            event_id = %event.id,
            event_type = ?event.event_type,
            outcome = ?event.outcome,
            realm_id = ?event.realm_id,
            resource_id = ?event.resource_id,
            resource_name = ?event.resource_name,
            node_id = ?event.node_id,
            error = ?event.error,
            details,
            "admin_event"
        );
        Ok(())
    }
}
