//! Visibility lifecycle events

use serde::{Deserialize, Serialize};

/// Stable entity identifier (allocation order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Entity became visible
    EnterView,
    /// Entity left the view volume
    ExitView,
    /// Entity was moved to a new off-screen placement
    Respawned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityEvent {
    pub entity: EntityId,
    pub kind: EventKind,
}

/// Receiver for events, dispatched synchronously in causal order
pub trait EventSink {
    fn emit(&mut self, event: EntityEvent);
}

impl EventSink for Vec<EntityEvent> {
    fn emit(&mut self, event: EntityEvent) {
        self.push(event);
    }
}

impl<F: FnMut(EntityEvent)> EventSink for F {
    fn emit(&mut self, event: EntityEvent) {
        self(event)
    }
}
