//! Domain event system — decoupled communication between bounded contexts.
//!
//! Events are published when something interesting happens in the system.
//! The presentation shell subscribes to react (status badges, notifications,
//! archive persistence) without tight coupling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::layer::LayerId;
use crate::worker::WorkerRole;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A worker reached `running`
    WorkerStarted {
        role: WorkerRole,
        timestamp: DateTime<Utc>,
    },

    /// A worker produced a reply
    WorkerOutput {
        role: WorkerRole,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// A worker's remote call failed
    WorkerError {
        role: WorkerRole,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A worker exhausted its restart budget
    WorkerPermanentlyFailed {
        role: WorkerRole,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// An AI-origin conversational layer was archived; an external store may
    /// persist the payload
    LayerArchived {
        layer_id: LayerId,
        scope: String,
        reason: String,
        content: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Components can subscribe to receive all events and filter for what they care about.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
