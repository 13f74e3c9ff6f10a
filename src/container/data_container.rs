//! Data Container
//!
//! Concurrent key → entry map backing a cache. Uses DashMap for sharded,
//! lock-free reads. Expired entries are treated as absent and dropped when
//! they are encountered.

use dashmap::DashMap;
use tracing::trace;

use super::entries::{now_millis, InternalCacheEntry};
use crate::marshall::Object;

/// In-memory store of internal cache entries
#[derive(Default)]
pub struct DataContainer {
    entries: DashMap<Object, InternalCacheEntry>,
}

impl DataContainer {
    /// Create an empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an entry, recording the access
    pub fn get(&self, key: &Object) -> Option<InternalCacheEntry> {
        let now = now_millis();
        {
            let mut entry = self.entries.get_mut(key)?;
            if !entry.is_expired(now) {
                entry.touch(now);
                return Some(entry.clone());
            }
        }
        self.remove_expired(key, now);
        None
    }

    /// Look up an entry without touching it or checking expiry
    pub fn peek(&self, key: &Object) -> Option<InternalCacheEntry> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    /// Look up a live entry without recording the access
    pub fn peek_live(&self, key: &Object) -> Option<InternalCacheEntry> {
        let now = now_millis();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.clone())
    }

    /// Whether a live entry exists for `key`
    pub fn contains_key(&self, key: &Object) -> bool {
        let now = now_millis();
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => return false,
        };
        if expired {
            self.remove_expired(key, now);
        }
        !expired
    }

    /// Store a value created at `created`, returning the live entry it replaced
    pub fn put(
        &self,
        key: Object,
        value: Object,
        lifespan: i64,
        max_idle: i64,
        created: i64,
    ) -> Option<InternalCacheEntry> {
        let now = now_millis();
        let entry = InternalCacheEntry::new(key.clone(), value, lifespan, max_idle, created);
        self.entries
            .insert(key, entry)
            .filter(|previous| !previous.is_expired(now))
    }

    /// Store a fully formed entry, e.g. one fetched from a peer
    pub fn put_entry(&self, entry: InternalCacheEntry) -> Option<InternalCacheEntry> {
        let now = now_millis();
        self.entries
            .insert(entry.key().clone(), entry)
            .filter(|previous| !previous.is_expired(now))
    }

    /// Remove an entry, returning it if it was live
    pub fn remove(&self, key: &Object) -> Option<InternalCacheEntry> {
        let now = now_millis();
        self.entries
            .remove(key)
            .map(|(_, entry)| entry)
            .filter(|entry| !entry.is_expired(now))
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, expired ones included until purged
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of live keys
    pub fn keys(&self) -> Vec<Object> {
        let now = now_millis();
        self.entries
            .iter()
            .filter(|e| !e.is_expired(now))
            .map(|e| e.key().clone())
            .collect()
    }

    /// Snapshot of live values
    pub fn values(&self) -> Vec<Object> {
        let now = now_millis();
        self.entries
            .iter()
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value().value().clone())
            .collect()
    }

    /// Snapshot of live entries
    pub fn entries(&self) -> Vec<InternalCacheEntry> {
        let now = now_millis();
        self.entries
            .iter()
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value().clone())
            .collect()
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = now_millis();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            trace!(purged, "purged expired entries");
        }
        purged
    }

    fn remove_expired(&self, key: &Object, now: i64) {
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
    }
}

impl std::fmt::Debug for DataContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataContainer")
            .field("size", &self.size())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
