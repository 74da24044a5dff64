//! Per-event fan-out of change messages to live subscribers.
//!
//! Every candidate replace, registration creation and conversion publishes a
//! [`ChangeMessage`] here after the triggering write has committed, never
//! before. Subscribers pick an event and receive every subsequent matching
//! message over a bounded `tokio::sync::broadcast` channel: a slow receiver
//! loses its oldest messages rather than blocking the publisher or its
//! peers, and dropping the receiver unsubscribes it.
//!
//! The registry is in-process. Fan-out across multiple server instances
//! needs a shared transport plugged in behind this same interface.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::models::EventId;

/// Per-event channel capacity before lagging subscribers lose messages.
const CHANNEL_CAPACITY: usize = 100;

/// What changed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    /// The event's candidate set was atomically replaced.
    CandidatesReplaced,
    /// A registration was created (quick-add or conversion).
    RegistrationCreated,
    /// A candidate was converted into a registration.
    CandidateConverted,
}

/// A state change delivered to live subscribers.
///
/// Wire shape: `{type, eventId, payload}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeMessage {
    /// What changed.
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    /// Event the change belongs to.
    #[serde(rename = "eventId")]
    pub event_id: EventId,
    /// Change-specific detail.
    pub payload: Value,
}

impl ChangeMessage {
    pub fn new(kind: ChangeKind, event_id: impl Into<EventId>, payload: Value) -> Self {
        Self {
            kind,
            event_id: event_id.into(),
            payload,
        }
    }
}

/// Broadcasts change messages to all subscribers of an event.
pub struct ChangeBroadcaster {
    topics: RwLock<HashMap<EventId, broadcast::Sender<ChangeMessage>>>,
    capacity: usize,
}

impl ChangeBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    /// Create a broadcaster with a custom per-subscriber buffer size.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Subscribe to every subsequent change for `event_id`.
    ///
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self, event_id: &str) -> broadcast::Receiver<ChangeMessage> {
        let mut topics = self.topics.write().expect("broadcaster lock poisoned");
        topics
            .entry(event_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Deliver a message to all current subscribers of its event.
    ///
    /// Returns how many subscribers were reached; zero subscribers is not
    /// an error. Topics without subscribers are pruned.
    pub fn publish(&self, message: ChangeMessage) -> usize {
        let mut topics = self.topics.write().expect("broadcaster lock poisoned");

        let delivered = match topics.get(&message.event_id) {
            Some(sender) => sender.send(message.clone()).unwrap_or(0),
            None => 0,
        };

        if delivered == 0 {
            // Either no topic or the last receiver went away
            if let Some(sender) = topics.get(&message.event_id) {
                if sender.receiver_count() == 0 {
                    topics.remove(&message.event_id);
                }
            }
        }

        delivered
    }

    /// Number of live subscribers for an event.
    pub fn subscriber_count(&self, event_id: &str) -> usize {
        let topics = self.topics.read().expect("broadcaster lock poisoned");
        topics
            .get(event_id)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for ChangeBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
