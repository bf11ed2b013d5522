//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>` across the application.
//! Handlers publish after their database write commits; nothing on the
//! request path waits for subscribers.

use chrono::{DateTime, Utc};
use muse_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Dot-separated names of the events the platform publishes.
pub mod event_types {
    pub const USER_REGISTERED: &str = "user.registered";
    pub const IMAGE_COMPLETED: &str = "image.completed";
    pub const IMAGE_FAILED: &str = "image.failed";
    pub const VIDEO_COMPLETED: &str = "video.completed";
    pub const VIDEO_FAILED: &str = "video.failed";
    pub const SUBSCRIPTION_ACTIVATED: &str = "subscription.activated";
    pub const SUBSCRIPTION_CANCELED: &str = "subscription.canceled";
    pub const SUBSCRIPTION_EXPIRED: &str = "subscription.expired";
    pub const CONTENT_MODERATED: &str = "content.moderated";
    pub const NUTS_ADJUSTED: &str = "nuts.adjusted";
}

// ---------------------------------------------------------------------------
// PlatformEvent
// ---------------------------------------------------------------------------

/// A domain event that occurred on the platform.
///
/// Built with [`PlatformEvent::new`] and the `with_*` methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    /// Dot-separated event name, e.g. `"image.completed"`.
    pub event_type: String,
    /// Source entity kind (`"image"`, `"subscription"`, ...).
    pub source_entity_type: Option<String>,
    pub source_entity_id: Option<DbId>,
    /// The user that triggered the event, if any.
    pub actor_user_id: Option<DbId>,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl PlatformEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source_entity_type: None,
            source_entity_id: None,
            actor_user_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_source(mut self, entity_type: impl Into<String>, entity_id: DbId) -> Self {
        self.source_entity_type = Some(entity_type.into());
        self.source_entity_id = Some(entity_id);
        self
    }

    pub fn with_actor(mut self, user_id: DbId) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// When the buffer is full the oldest unconsumed events are dropped and slow
/// receivers observe `RecvError::Lagged`.
pub struct EventBus {
    sender: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers. Dropped silently when
    /// nobody is subscribed.
    pub fn publish(&self, event: PlatformEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_enriched_event() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(
            PlatformEvent::new(event_types::IMAGE_COMPLETED)
                .with_source("image", 42)
                .with_actor(7)
                .with_payload(serde_json::json!({"image_url": "https://cdn/x.png"})),
        );

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type, "image.completed");
        assert_eq!(received.source_entity_type.as_deref(), Some("image"));
        assert_eq!(received.source_entity_id, Some(42));
        assert_eq!(received.actor_user_id, Some(7));
        assert_eq!(received.payload["image_url"], "https://cdn/x.png");
    }

    #[tokio::test]
    async fn every_subscriber_gets_a_copy() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(PlatformEvent::new(event_types::NUTS_ADJUSTED));

        assert_eq!(rx1.recv().await.unwrap().event_type, "nuts.adjusted");
        assert_eq!(rx2.recv().await.unwrap().event_type, "nuts.adjusted");
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.publish(PlatformEvent::new(event_types::USER_REGISTERED));
    }

    #[test]
    fn new_event_has_empty_payload_object() {
        let event = PlatformEvent::new("bare.event");
        assert!(event.source_entity_type.is_none());
        assert!(event.actor_user_id.is_none());
        assert!(event.payload.is_object());
    }
}
