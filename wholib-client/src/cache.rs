//! Read-through item cache
//!
//! The cache is the only shared mutable resource in the client. It is
//! written from exactly two places: the update batcher's flush and the
//! optimistic mutation tracker's apply/rollback. Both run on the same
//! runtime as short, non-blocking critical sections, so a std RwLock is
//! sufficient; nothing holds the lock across an await point.

use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;
use wholib_common::types::LibraryItem;

/// In-memory map of server-owned catalogue entries, keyed by item id.
#[derive(Default)]
pub struct ItemCache {
    items: RwLock<HashMap<Uuid, LibraryItem>>,
}

impl ItemCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached copy of an item, if any.
    pub fn get(&self, id: &Uuid) -> Option<LibraryItem> {
        self.items.read().expect("cache lock poisoned").get(id).cloned()
    }

    /// Insert or replace a single item.
    pub fn insert(&self, item: LibraryItem) {
        self.items
            .write()
            .expect("cache lock poisoned")
            .insert(item.id, item);
    }

    /// Apply a deduplicated batch in one write-lock acquisition.
    ///
    /// Returns the ids actually written, in batch order.
    pub fn apply_batch(&self, items: Vec<LibraryItem>) -> Vec<Uuid> {
        let mut map = self.items.write().expect("cache lock poisoned");
        let mut applied = Vec::with_capacity(items.len());
        for item in items {
            applied.push(item.id);
            map.insert(item.id, item);
        }
        applied
    }

    /// Remove an item (e.g. server deleted it).
    pub fn remove(&self, id: &Uuid) -> Option<LibraryItem> {
        self.items.write().expect("cache lock poisoned").remove(id)
    }

    pub fn len(&self) -> usize {
        self.items.read().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all cached items, for grid/list rendering.
    pub fn snapshot(&self) -> Vec<LibraryItem> {
        self.items
            .read()
            .expect("cache lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}
