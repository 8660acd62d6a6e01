//! Event types for the live-update channel and the in-process update bus
//!
//! `ServerEvent` is the wire contract shared by every transport (SSE frame
//! payloads, socket lines, and polling response bodies all decode to it).
//! `CacheUpdate` is the client-internal notification emitted after the
//! batcher applies a flush to the item cache.

use crate::types::{EnrichmentStats, LibraryItem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Message received from the server over any live-update transport
///
/// Serialized as JSON with a `type` discriminator. Unrecognized payload
/// shapes are protocol errors handled by the transport layer; they never
/// tear down the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// One or more catalogue entries changed
    ItemsUpdated {
        /// Changed entities, full replacement copies
        items: Vec<LibraryItem>,
        /// Aggregate enrichment statistics, when the server includes them
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stats: Option<EnrichmentStats>,
    },

    /// Keep-alive; refreshes liveness, no payload action
    Heartbeat,

    /// Server-reported error, surfaced as a non-fatal notice without retry
    Error {
        /// Human-readable message
        message: String,
    },
}

impl ServerEvent {
    /// Get event type as string for filtering and logging
    pub fn event_type(&self) -> &str {
        match self {
            ServerEvent::ItemsUpdated { .. } => "items_updated",
            ServerEvent::Heartbeat => "heartbeat",
            ServerEvent::Error { .. } => "error",
        }
    }
}

/// Client-internal notification fanned out after cache changes
#[derive(Debug, Clone)]
pub enum CacheUpdate {
    /// A batch flush applied these item ids to the cache
    ItemsApplied {
        /// Ids whose cached value changed in this flush
        item_ids: Vec<Uuid>,
        /// Aggregate stats from the most recent payload in the batch
        stats: Option<EnrichmentStats>,
        /// When the flush was applied
        timestamp: DateTime<Utc>,
    },

    /// An optimistic patch was applied locally (not yet confirmed)
    OptimisticApplied { item_id: Uuid },

    /// An optimistic patch was rolled back after a failed mutation
    OptimisticRolledBack { item_id: Uuid },

    /// Server-sent error message, for presentation as a notice
    ServerNotice { message: String },
}

/// Broadcast bus carrying `CacheUpdate` notifications to UI subscribers
///
/// Uses tokio::broadcast internally: non-blocking publish, multiple
/// concurrent subscribers, automatic cleanup when subscribers drop, and
/// lagged-message detection for slow consumers.
#[derive(Clone)]
pub struct UpdateBus {
    tx: broadcast::Sender<CacheUpdate>,
    capacity: usize,
}

impl UpdateBus {
    /// Create a bus with the given channel capacity.
    ///
    /// Old notifications are dropped for lagging subscribers once the buffer
    /// fills; the cache itself is always authoritative, so a lagged
    /// subscriber re-reads it rather than replaying notifications.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future updates.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheUpdate> {
        self.tx.subscribe()
    }

    /// Emit an update to all subscribers.
    ///
    /// Returns the subscriber count, or an error if nobody is listening.
    pub fn emit(
        &self,
        update: CacheUpdate,
    ) -> std::result::Result<usize, broadcast::error::SendError<CacheUpdate>> {
        self.tx.send(update)
    }

    /// Emit without caring whether anyone is subscribed.
    ///
    /// UI notifications are advisory; a headless client with no subscribers
    /// is a normal state, not an error.
    pub fn emit_lossy(&self, update: CacheUpdate) {
        let _ = self.tx.send(update);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EnrichmentStatus;

    fn item(title: &str) -> LibraryItem {
        LibraryItem {
            id: Uuid::new_v4(),
            title: title.to_string(),
            display_title: None,
            section_name: None,
            group_name: None,
            content_type: None,
            enrichment_status: EnrichmentStatus::Enriched,
            enrichment_confidence: 0.9,
            enrichment_error: None,
            wiki_url: Some("https://tardis.fandom.com/wiki/Blink".to_string()),
            wiki_summary: None,
            wiki_image_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_items_updated_roundtrip() {
        let event = ServerEvent::ItemsUpdated {
            items: vec![item("Blink")],
            stats: Some(EnrichmentStats {
                pending: 1,
                enriched: 2,
                failed: 0,
                skipped: 0,
                avg_confidence: 0.9,
            }),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"items_updated\""));

        let decoded: ServerEvent = serde_json::from_str(&json).unwrap();
        match decoded {
            ServerEvent::ItemsUpdated { items, stats } => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].title, "Blink");
                assert_eq!(stats.unwrap().enriched, 2);
            }
            other => panic!("wrong event type: {}", other.event_type()),
        }
    }

    #[test]
    fn test_heartbeat_has_no_payload() {
        let json = r#"{"type":"heartbeat"}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type(), "heartbeat");
    }

    #[test]
    fn test_error_event_carries_message() {
        let json = r#"{"type":"error","message":"scrape backlog full"}"#;
        match serde_json::from_str::<ServerEvent>(json).unwrap() {
            ServerEvent::Error { message } => assert_eq!(message, "scrape backlog full"),
            other => panic!("wrong event type: {}", other.event_type()),
        }
    }

    #[test]
    fn test_unknown_event_type_is_rejected() {
        let json = r#"{"type":"shutdown"}"#;
        assert!(serde_json::from_str::<ServerEvent>(json).is_err());
    }

    #[test]
    fn test_update_bus_new() {
        let bus = UpdateBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_update_bus_emit_and_receive() {
        let bus = UpdateBus::new(10);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let id = Uuid::new_v4();
        bus.emit(CacheUpdate::ItemsApplied {
            item_ids: vec![id],
            stats: None,
            timestamp: Utc::now(),
        })
        .expect("emit should succeed");

        match rx.try_recv().expect("should receive update") {
            CacheUpdate::ItemsApplied { item_ids, .. } => assert_eq!(item_ids, vec![id]),
            _ => panic!("wrong update kind"),
        }
    }

    #[test]
    fn test_update_bus_emit_lossy_without_subscribers() {
        let bus = UpdateBus::new(2);
        // No subscribers; must not panic or error.
        for _ in 0..5 {
            bus.emit_lossy(CacheUpdate::ServerNotice {
                message: "notice".to_string(),
            });
        }
        assert!(bus
            .emit(CacheUpdate::ServerNotice {
                message: "notice".to_string(),
            })
            .is_err());
    }

    #[test]
    fn test_update_bus_multiple_subscribers() {
        let bus = UpdateBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit_lossy(CacheUpdate::OptimisticApplied {
            item_id: Uuid::new_v4(),
        });

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }
}
