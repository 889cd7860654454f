// Event system for notifying playout devices, UIs and automation

//! # Event System
//!
//! The engine publishes an [`EngineEvent`] whenever something downstream may
//! need to react: a new action catalog, a structural update, a freshly
//! persisted timeline, a take. Subscribers either hold a broadcast receiver
//! or register a callback that runs synchronously on publish.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Action, PartId, RundownId};

/// What happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// The action catalog was regenerated
    ActionsUpdated {
        actions: Vec<Action>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rundown_id: Option<RundownId>,
    },
    /// Rundown structure or lifecycle changed
    RundownUpdated { rundown_id: RundownId, reason: String },
    RundownDeleted { rundown_id: RundownId },
    /// A new timeline was persisted
    TimelineUpdated { rundown_id: RundownId, object_count: usize },
    /// A part went on air
    PartTaken {
        rundown_id: RundownId,
        part_id: PartId,
        taken_at: DateTime<Utc>,
        /// When the following part should be taken automatically
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auto_next_at: Option<DateTime<Utc>>,
    },
}

impl EngineEvent {
    pub fn rundown_id(&self) -> Option<&RundownId> {
        match self {
            EngineEvent::ActionsUpdated { rundown_id, .. } => rundown_id.as_ref(),
            EngineEvent::RundownUpdated { rundown_id, .. }
            | EngineEvent::RundownDeleted { rundown_id }
            | EngineEvent::TimelineUpdated { rundown_id, .. }
            | EngineEvent::PartTaken { rundown_id, .. } => Some(rundown_id),
        }
    }
}

/// An event with its delivery metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: EngineEvent,
}

type Callback = Arc<dyn Fn(&EventEnvelope) + Send + Sync>;

/// Fan-out bus for engine events
///
/// Cloning the bus shares the channel and the callback list.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    callbacks: Arc<RwLock<Vec<Callback>>>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per slow receiver
    pub fn new(capacity: usize) -> Self {
        // broadcast::channel panics on zero
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            callbacks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Publish an event to all subscribers and callbacks
    pub fn publish(&self, event: EngineEvent) -> EventEnvelope {
        let envelope = EventEnvelope {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        };
        debug!(event = ?envelope.event, "Event published");

        let callbacks = self
            .callbacks
            .read()
            .map(|c| c.clone())
            .unwrap_or_else(|e| e.into_inner().clone());
        for callback in callbacks {
            callback(&envelope);
        }

        // Only fails when nobody is subscribed
        let _ = self.sender.send(envelope.clone());
        envelope
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Invoke `callback` for every event published from now on
    pub fn register_callback<F>(&self, callback: F)
    where
        F: Fn(&EventEnvelope) + Send + Sync + 'static,
    {
        match self.callbacks.write() {
            Ok(mut callbacks) => callbacks.push(Arc::new(callback)),
            Err(poisoned) => poisoned.into_inner().push(Arc::new(callback)),
        }
    }

    /// Announce a regenerated action catalog
    pub fn emit_actions_updated_event(&self, actions: Vec<Action>, rundown_id: Option<RundownId>) {
        self.publish(EngineEvent::ActionsUpdated { actions, rundown_id });
    }

    pub fn emit_rundown_updated(&self, rundown_id: &RundownId, reason: impl Into<String>) {
        self.publish(EngineEvent::RundownUpdated {
            rundown_id: rundown_id.clone(),
            reason: reason.into(),
        });
    }

    pub fn emit_timeline_updated(&self, rundown_id: &RundownId, object_count: usize) {
        self.publish(EngineEvent::TimelineUpdated {
            rundown_id: rundown_id.clone(),
            object_count,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_zero_capacity_still_delivers() {
        let bus = EventBus::new(0);
        let mut rx = bus.subscribe();
        bus.emit_actions_updated_event(vec![], None);
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit_actions_updated_event(vec![], Some(RundownId::from("R1")));

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.id, e2.id);
        assert_eq!(e1.event.rundown_id(), Some(&RundownId::from("R1")));
        assert!(matches!(e1.event, EngineEvent::ActionsUpdated { .. }));
    }

    #[test]
    fn test_callbacks_run_on_publish() {
        let bus = EventBus::default();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        bus.register_callback(move |envelope| {
            if matches!(envelope.event, EngineEvent::TimelineUpdated { .. }) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        bus.emit_timeline_updated(&RundownId::from("R1"), 3);
        bus.emit_rundown_updated(&RundownId::from("R1"), "test");
        bus.emit_timeline_updated(&RundownId::from("R1"), 4);

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.emit_rundown_updated(&RundownId::from("R1"), "orphan");
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let value = serde_json::to_value(EngineEvent::RundownDeleted {
            rundown_id: RundownId::from("R1"),
        })
        .unwrap();
        assert_eq!(value["type"], "rundown_deleted");
        assert_eq!(value["rundown_id"], "R1");
    }
}
