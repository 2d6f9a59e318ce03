//! Domain event system: the session's injected logging collaborator.
//!
//! The orchestration loop publishes an event whenever something worth
//! recording happens. Sinks (the CLI's log writer, tests) subscribe to the
//! bus they were handed; there is no process-wide instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A user message was appended and a turn began
    TurnStarted {
        conversation_id: String,
        content_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// One backend call finished
    BackendCalled {
        conversation_id: String,
        model: String,
        iteration: u32,
        tool_calls: usize,
        tokens_used: Option<u32>,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The turn reached a final answer
    TurnCompleted {
        conversation_id: String,
        iterations: u32,
        tool_calls_made: usize,
        timestamp: DateTime<Utc>,
    },

    /// An error aborted a turn
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
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
        // No subscribers is fine
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::ToolExecuted {
            tool_name: "addNumbers".into(),
            success: true,
            duration_ms: 3,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ToolExecuted { tool_name, success, .. } => {
                assert_eq!(tool_name, "addNumbers");
                assert!(success);
            }
            _ => panic!("Expected ToolExecuted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::ErrorOccurred {
            context: "test".into(),
            error_message: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_string(&DomainEvent::TurnCompleted {
            conversation_id: "c1".into(),
            iterations: 2,
            tool_calls_made: 1,
            timestamp: Utc::now(),
        })
        .unwrap();
        assert!(json.contains(r#""event":"turn_completed""#));
    }
}
