//! Update batcher
//!
//! A reconnect replay or a busy scrape run can deliver hundreds of item
//! notifications in a burst. Applying each one individually would re-render
//! the UI per item, so incoming changes are buffered for a short debounce
//! window, coalesced by item id (last-enqueued wins), and applied to the
//! cache as a single update with one subscriber notification.
//!
//! No ordering guarantee exists across different ids. Items the user acted
//! on directly (priority re-scrape) bypass the window entirely so the UI
//! reflects the user's own action without waiting for the next batch tick.

use crate::cache::ItemCache;
use crate::optimistic::OptimisticTracker;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;
use wholib_common::events::{CacheUpdate, UpdateBus};
use wholib_common::types::{EnrichmentStats, LibraryItem};

/// A queued, not-yet-flushed change to one catalogue item.
///
/// Queue order is enqueue order; the id dedupe at flush time keeps the last
/// entry per id.
struct PendingUpdate {
    item: LibraryItem,
}

struct BatchQueue {
    pending: Vec<PendingUpdate>,
    /// Most recent aggregate stats seen within the window
    stats: Option<EnrichmentStats>,
    /// Handle of the scheduled flush timer, if one is armed
    flush_timer: Option<JoinHandle<()>>,
}

/// Coalesces incoming item updates into debounced cache flushes.
pub struct UpdateBatcher {
    cache: Arc<ItemCache>,
    tracker: Arc<OptimisticTracker>,
    bus: UpdateBus,
    debounce: Duration,
    queue: Mutex<BatchQueue>,
}

impl UpdateBatcher {
    pub fn new(
        cache: Arc<ItemCache>,
        tracker: Arc<OptimisticTracker>,
        bus: UpdateBus,
        debounce: Duration,
    ) -> Self {
        Self {
            cache,
            tracker,
            bus,
            debounce,
            queue: Mutex::new(BatchQueue {
                pending: Vec::new(),
                stats: None,
                flush_timer: None,
            }),
        }
    }

    /// Append incoming changed items; arm the flush timer if idle.
    pub fn enqueue(
        self: &Arc<Self>,
        items: Vec<LibraryItem>,
        stats: Option<EnrichmentStats>,
    ) {
        if items.is_empty() && stats.is_none() {
            return;
        }

        let mut queue = self.queue.lock().expect("batch lock poisoned");
        queue
            .pending
            .extend(items.into_iter().map(|item| PendingUpdate { item }));
        if stats.is_some() {
            queue.stats = stats;
        }

        if queue.flush_timer.is_none() {
            let batcher = Arc::clone(self);
            let debounce = self.debounce;
            queue.flush_timer = Some(tokio::spawn(async move {
                tokio::time::sleep(debounce).await;
                batcher.flush();
            }));
        }
    }

    /// Apply high-priority items immediately, skipping the debounce window.
    ///
    /// Used for updates the user explicitly requested (priority re-scrape);
    /// any older queued version of the same ids is dropped so a later flush
    /// cannot overwrite the fresher value with a staler one.
    pub fn enqueue_priority(&self, items: Vec<LibraryItem>) {
        if items.is_empty() {
            return;
        }

        {
            let mut queue = self.queue.lock().expect("batch lock poisoned");
            queue
                .pending
                .retain(|p| !items.iter().any(|i| i.id == p.item.id));
        }

        let applied = self.cache.apply_batch(items);
        self.tracker.on_server_update(&applied);
        debug!("Priority-applied {} item(s)", applied.len());
        self.bus.emit_lossy(CacheUpdate::ItemsApplied {
            item_ids: applied,
            stats: None,
            timestamp: Utc::now(),
        });
    }

    /// Drain the queue: dedupe by id keeping the most recently enqueued
    /// version, apply survivors as one cache update, notify subscribers
    /// once.
    pub fn flush(&self) {
        let (pending, stats) = {
            let mut queue = self.queue.lock().expect("batch lock poisoned");
            queue.flush_timer = None;
            (std::mem::take(&mut queue.pending), queue.stats.take())
        };

        if pending.is_empty() && stats.is_none() {
            return;
        }

        // Later entries overwrite earlier ones: last-enqueued wins per id.
        let mut latest: HashMap<Uuid, LibraryItem> = HashMap::with_capacity(pending.len());
        let total = pending.len();
        for update in pending {
            latest.insert(update.item.id, update.item);
        }

        let applied = self.cache.apply_batch(latest.into_values().collect());
        self.tracker.on_server_update(&applied);
        debug!("Flushed {} update(s) coalesced from {}", applied.len(), total);
        self.bus.emit_lossy(CacheUpdate::ItemsApplied {
            item_ids: applied,
            stats,
            timestamp: Utc::now(),
        });
    }

    /// Tear down: cancel any armed flush timer, then drain synchronously so
    /// already-received updates still reach the cache exactly once.
    pub fn shutdown(&self) {
        let timer = {
            let mut queue = self.queue.lock().expect("batch lock poisoned");
            queue.flush_timer.take()
        };
        if let Some(timer) = timer {
            timer.abort();
        }
        self.flush();
    }

    /// Number of queued, unflushed updates (pre-coalescing).
    pub fn pending_len(&self) -> usize {
        self.queue.lock().expect("batch lock poisoned").pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wholib_common::types::EnrichmentStatus;

    fn item(id: Uuid, status: EnrichmentStatus) -> LibraryItem {
        LibraryItem {
            id,
            title: "Genesis of the Daleks".to_string(),
            display_title: None,
            section_name: None,
            group_name: None,
            content_type: None,
            enrichment_status: status,
            enrichment_confidence: 0.0,
            enrichment_error: None,
            wiki_url: None,
            wiki_summary: None,
            wiki_image_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn build() -> (Arc<ItemCache>, Arc<UpdateBatcher>, UpdateBus) {
        let cache = Arc::new(ItemCache::new());
        let bus = UpdateBus::new(64);
        let tracker = Arc::new(OptimisticTracker::new(
            cache.clone(),
            bus.clone(),
            Duration::from_secs(5),
        ));
        let batcher = Arc::new(UpdateBatcher::new(
            cache.clone(),
            tracker,
            bus.clone(),
            Duration::from_millis(100),
        ));
        (cache, batcher, bus)
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_enqueues_one_flush_second_wins() {
        let (cache, batcher, bus) = build();
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();

        batcher.enqueue(vec![item(id, EnrichmentStatus::Pending)], None);
        batcher.enqueue(vec![item(id, EnrichmentStatus::Enriched)], None);

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(
            cache.get(&id).unwrap().enrichment_status,
            EnrichmentStatus::Enriched
        );

        // Exactly one notification, covering exactly one id.
        match rx.try_recv().unwrap() {
            CacheUpdate::ItemsApplied { item_ids, .. } => assert_eq!(item_ids, vec![id]),
            _ => panic!("wrong update kind"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_three_coalesces_to_last_status() {
        let (cache, batcher, bus) = build();
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();

        batcher.enqueue(vec![item(id, EnrichmentStatus::Pending)], None);
        batcher.enqueue(vec![item(id, EnrichmentStatus::Pending)], None);
        batcher.enqueue(vec![item(id, EnrichmentStatus::Enriched)], None);

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(
            cache.get(&id).unwrap().enrichment_status,
            EnrichmentStatus::Enriched
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            CacheUpdate::ItemsApplied { item_ids, .. } if item_ids.len() == 1
        ));
        assert!(rx.try_recv().is_err(), "expected exactly one flush event");
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_bypasses_debounce_window() {
        let (cache, batcher, _bus) = build();
        let id = Uuid::new_v4();

        batcher.enqueue_priority(vec![item(id, EnrichmentStatus::Enriched)]);

        // No timer advance needed; the value is already visible.
        assert_eq!(
            cache.get(&id).unwrap().enrichment_status,
            EnrichmentStatus::Enriched
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_drops_stale_queued_version() {
        let (cache, batcher, _bus) = build();
        let id = Uuid::new_v4();

        batcher.enqueue(vec![item(id, EnrichmentStatus::Pending)], None);
        batcher.enqueue_priority(vec![item(id, EnrichmentStatus::Enriched)]);

        tokio::time::sleep(Duration::from_millis(150)).await;

        // The later flush must not regress the priority-applied value.
        assert_eq!(
            cache.get(&id).unwrap().enrichment_status,
            EnrichmentStatus::Enriched
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_ids_flush_together() {
        let (cache, batcher, bus) = build();
        let mut rx = bus.subscribe();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        batcher.enqueue(vec![item(a, EnrichmentStatus::Enriched)], None);
        batcher.enqueue(
            vec![item(b, EnrichmentStatus::Failed)],
            Some(EnrichmentStats {
                pending: 0,
                enriched: 1,
                failed: 1,
                skipped: 0,
                avg_confidence: 0.5,
            }),
        );

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(cache.len(), 2);
        match rx.try_recv().unwrap() {
            CacheUpdate::ItemsApplied { item_ids, stats, .. } => {
                assert_eq!(item_ids.len(), 2);
                assert_eq!(stats.unwrap().failed, 1);
            }
            _ => panic!("wrong update kind"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drains_queue() {
        let (cache, batcher, _bus) = build();
        let id = Uuid::new_v4();

        batcher.enqueue(vec![item(id, EnrichmentStatus::Enriched)], None);
        assert_eq!(batcher.pending_len(), 1);

        // Disconnect mid-window: queued update still reaches the cache.
        batcher.shutdown();
        assert_eq!(batcher.pending_len(), 0);
        assert_eq!(
            cache.get(&id).unwrap().enrichment_status,
            EnrichmentStatus::Enriched
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_enqueue_is_noop() {
        let (_cache, batcher, bus) = build();
        let mut rx = bus.subscribe();

        batcher.enqueue(vec![], None);
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(rx.try_recv().is_err());
    }
}
