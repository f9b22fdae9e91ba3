//! Message Bus for pipeline progress events
//!
//! The MessageBus provides a pub/sub pattern so that front ends (the CLI,
//! dashboards, tests) can follow workflows without coupling to the
//! orchestrator. Channels are bounded, and publishing never waits: when a
//! subscriber's channel is full the event is dropped for that subscriber.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Channel buffer size for bounded channels
const CHANNEL_BUFFER_SIZE: usize = 100;

/// Event types that can be published on the message bus
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventType {
    StageStarted,
    StageCompleted,
    HitlRequested,
    WorkflowCompleted,
    WorkflowFailed,
    /// Subscribe to all event types
    All,
}

/// Events that can be published on the message bus
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    StageStarted {
        workflow_id: String,
        stage: String,
        agent: String,
        task: String,
    },
    StageCompleted {
        workflow_id: String,
        stage: String,
        confidence: f64,
        hitl_triggered: bool,
    },
    HitlRequested {
        workflow_id: String,
        stage: String,
        confidence: f64,
    },
    WorkflowCompleted {
        workflow_id: String,
        request_id: String,
    },
    WorkflowFailed {
        workflow_id: String,
        error: String,
    },
}

impl Event {
    /// Get the event type for this event
    pub fn event_type(&self) -> EventType {
        match self {
            Event::StageStarted { .. } => EventType::StageStarted,
            Event::StageCompleted { .. } => EventType::StageCompleted,
            Event::HitlRequested { .. } => EventType::HitlRequested,
            Event::WorkflowCompleted { .. } => EventType::WorkflowCompleted,
            Event::WorkflowFailed { .. } => EventType::WorkflowFailed,
        }
    }

    pub fn workflow_id(&self) -> &str {
        match self {
            Event::StageStarted { workflow_id, .. }
            | Event::StageCompleted { workflow_id, .. }
            | Event::HitlRequested { workflow_id, .. }
            | Event::WorkflowCompleted { workflow_id, .. }
            | Event::WorkflowFailed { workflow_id, .. } => workflow_id,
        }
    }
}

/// Message bus for pub/sub communication between components
///
/// Subscribers get a bounded channel with `CHANNEL_BUFFER_SIZE` capacity,
/// either for one event type or for `EventType::All`.
pub struct MessageBus {
    channels: Arc<Mutex<HashMap<EventType, Vec<mpsc::Sender<Event>>>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to a specific event type, or `EventType::All`
    pub async fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let mut channels = self.channels.lock().await;
        channels.entry(event_type).or_default().push(tx);
        rx
    }

    /// Publish an event to all subscribers of its type and of `All`
    ///
    /// Full channels drop the event; closed channels are pruned.
    pub async fn publish(&self, event: Event) {
        let mut channels = self.channels.lock().await;
        let event_type = event.event_type();

        for key in [event_type, EventType::All] {
            if let Some(subscribers) = channels.get_mut(&key) {
                subscribers.retain(|tx| match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::debug!("Subscriber channel full, dropping {:?}", event_type);
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                });
            }
        }
    }

    /// Number of live subscriptions
    pub async fn subscriber_count(&self) -> usize {
        self.channels.lock().await.values().map(Vec::len).sum()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(id: &str) -> Event {
        Event::WorkflowCompleted {
            workflow_id: id.to_string(),
            request_id: "R-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_subscribe_and_publish() {
        let bus = MessageBus::new();
        let mut rx = bus.subscribe(EventType::StageStarted).await;

        let event = Event::StageStarted {
            workflow_id: "wf-1".to_string(),
            stage: "extraction".to_string(),
            agent: "data_extraction".to_string(),
            task: "extract_data".to_string(),
        };
        bus.publish(event.clone()).await;

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_all_event_type() {
        let bus = MessageBus::new();
        let mut rx_all = bus.subscribe(EventType::All).await;
        let mut rx_specific = bus.subscribe(EventType::WorkflowCompleted).await;
        let mut rx_other = bus.subscribe(EventType::WorkflowFailed).await;

        bus.publish(completed("wf-3")).await;

        assert_eq!(rx_all.recv().await.unwrap().workflow_id(), "wf-3");
        assert_eq!(rx_specific.recv().await.unwrap().workflow_id(), "wf-3");
        assert!(rx_other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_channel_does_not_block() {
        let bus = MessageBus::new();
        let mut rx = bus.subscribe(EventType::WorkflowCompleted).await;

        for i in 0..CHANNEL_BUFFER_SIZE + 10 {
            bus.publish(completed(&format!("wf-{}", i))).await;
        }

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, CHANNEL_BUFFER_SIZE);
    }

    #[tokio::test]
    async fn test_closed_subscribers_are_pruned() {
        let bus = MessageBus::new();
        let rx = bus.subscribe(EventType::All).await;
        drop(rx);
        assert_eq!(bus.subscriber_count().await, 1);

        bus.publish(completed("wf-1")).await;
        assert_eq!(bus.subscriber_count().await, 0);
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(completed("wf-1")).unwrap();
        assert_eq!(json["event"], "workflow_completed");
        assert_eq!(json["request_id"], "R-1");
    }
}
