//! Optimistic mutation tracker
//!
//! Lets the UI show a mutation's expected effect before the server confirms
//! it. The current cached value is snapshotted and the patch applied
//! synchronously before the network call starts; on failure (or timeout)
//! the snapshot is restored before the error reaches the caller, so no
//! intermediate inconsistent state is ever observable.
//!
//! Policy for concurrent mutations on one item: the second request is
//! rejected with `Error::MutationInProgress`. Queueing would need a second
//! rollback snapshot whose "before" value is itself provisional.

use crate::cache::ItemCache;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;
use wholib_common::events::{CacheUpdate, UpdateBus};
use wholib_common::types::LibraryItem;
use wholib_common::{Error, Result};

/// A client-authored provisional mutation awaiting server confirmation.
///
/// Kept until the mutation fails (rollback) or a genuine server update for
/// the id arrives, whichever comes first.
struct OptimisticPatch {
    /// Cached value captured before the patch was applied
    rollback: Option<LibraryItem>,
}

/// Tracks at most one outstanding optimistic patch per item id.
pub struct OptimisticTracker {
    cache: Arc<ItemCache>,
    bus: UpdateBus,
    patches: Mutex<HashMap<Uuid, OptimisticPatch>>,
    timeout: Duration,
}

impl OptimisticTracker {
    pub fn new(cache: Arc<ItemCache>, bus: UpdateBus, timeout: Duration) -> Self {
        Self {
            cache,
            bus,
            patches: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Apply `patch` to the cached item immediately, then run `request`.
    ///
    /// On success the patched value stays visible until the authoritative
    /// server update for this id flows through the batcher. On failure or
    /// timeout the pre-patch value is restored to the cache *before* the
    /// error is returned.
    ///
    /// Returns `Error::MutationInProgress` if a patch for this id is
    /// already outstanding.
    pub async fn request_mutation<F, Fut, T>(
        &self,
        item_id: Uuid,
        patch: F,
        request: Fut,
    ) -> Result<T>
    where
        F: FnOnce(&mut LibraryItem),
        Fut: Future<Output = Result<T>>,
    {
        // Snapshot + apply, atomically with the in-progress check.
        {
            let mut patches = self.patches.lock().expect("patch lock poisoned");
            if patches.contains_key(&item_id) {
                return Err(Error::MutationInProgress(item_id));
            }

            let rollback = self.cache.get(&item_id);
            if let Some(mut item) = rollback.clone() {
                patch(&mut item);
                self.cache.insert(item);
            }
            patches.insert(item_id, OptimisticPatch { rollback });
        }
        self.bus.emit_lossy(CacheUpdate::OptimisticApplied { item_id });

        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(value)) => {
                // Entry stays until the authoritative update for this id
                // arrives, blocking further mutations in the interim.
                Ok(value)
            }
            Ok(Err(e)) => {
                self.rollback(item_id);
                Err(e)
            }
            Err(_) => {
                warn!("Mutation for item {} timed out after {:?}", item_id, self.timeout);
                self.rollback(item_id);
                Err(Error::MutationTimeout(item_id))
            }
        }
    }

    /// True if an unresolved or unconfirmed patch exists for this id.
    pub fn has_pending(&self, item_id: &Uuid) -> bool {
        self.patches
            .lock()
            .expect("patch lock poisoned")
            .contains_key(item_id)
    }

    /// Server-sourced updates are authoritative: drop any patch for the
    /// ids they cover. Called by the batcher at flush time.
    pub fn on_server_update(&self, item_ids: &[Uuid]) {
        let mut patches = self.patches.lock().expect("patch lock poisoned");
        for id in item_ids {
            if patches.remove(id).is_some() {
                debug!("Optimistic patch for {} superseded by server update", id);
            }
        }
    }

    /// Restore the rollback snapshot synchronously and drop the entry.
    fn rollback(&self, item_id: Uuid) {
        let entry = self
            .patches
            .lock()
            .expect("patch lock poisoned")
            .remove(&item_id);
        if let Some(patch) = entry {
            match patch.rollback {
                Some(item) => self.cache.insert(item),
                // Item wasn't cached before the patch; remove the phantom.
                None => {
                    self.cache.remove(&item_id);
                }
            }
            self.bus
                .emit_lossy(CacheUpdate::OptimisticRolledBack { item_id });
        }
    }
}
