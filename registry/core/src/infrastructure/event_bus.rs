// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Registry Events
//
// In-memory event streaming over a tokio broadcast channel. The CLI and tests
// subscribe to watch stores, registrations and assemblies as they happen.
// Events are not persisted; a slow subscriber loses the oldest ones.

use crate::domain::events::{AssemblyEvent, ComponentEvent, WorkflowEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum DomainEvent {
    Component(ComponentEvent),
    Workflow(WorkflowEvent),
    Assembly(AssemblyEvent),
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::Component(event) => event.event_type(),
            DomainEvent::Workflow(event) => event.event_type(),
            DomainEvent::Assembly(event) => event.event_type(),
        }
    }
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity.
    /// Capacity is how many events are buffered before the oldest are dropped.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_component_event(&self, event: ComponentEvent) {
        self.publish(DomainEvent::Component(event));
    }

    pub fn publish_workflow_event(&self, event: WorkflowEvent) {
        self.publish(DomainEvent::Workflow(event));
    }

    pub fn publish_assembly_event(&self, event: AssemblyEvent) {
        self.publish(DomainEvent::Assembly(event));
    }

    fn publish(&self, event: DomainEvent) {
        debug!(event_type = event.event_type(), "Publishing event");

        // send() only fails when nobody is subscribed
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all domain events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

fn map_recv_error(error: broadcast::error::RecvError) -> EventBusError {
    match error {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::assembly::AssemblyId;
    use crate::domain::component::ComponentId;
    use chrono::Utc;

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let component_id = ComponentId::for_source("print('hi')");
        event_bus.publish_component_event(ComponentEvent::ComponentStored {
            component_id: component_id.clone(),
            name: "greet".to_string(),
            language: "python".to_string(),
            stored_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            DomainEvent::Component(ComponentEvent::ComponentStored { component_id: id, .. }) => {
                assert_eq!(id, component_id);
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();

        event_bus.publish_assembly_event(AssemblyEvent::AssemblyFailed {
            assembly_id: AssemblyId::new(),
            reason: "no generator".to_string(),
            failed_at: Utc::now(),
        });

        assert_eq!(receiver1.recv().await.unwrap().event_type(), "assembly_failed");
        assert_eq!(receiver2.recv().await.unwrap().event_type(), "assembly_failed");
    }

    #[test]
    fn test_try_recv_empty() {
        let event_bus = EventBus::new(4);
        let mut receiver = event_bus.subscribe();
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }
}
