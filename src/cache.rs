//! Bounded "already seen" cache
//!
//! Remembers the most recent keys up to a fixed capacity. The transfer feed
//! uses it to avoid emitting the same transfer twice, and trackers use it to
//! ignore late re-reports of items they already finalized.
//!
//! Strategy:
//! - Marking a key refreshes its position
//! - When full, the least recently marked key is forgotten

use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// Bounded set of recently seen keys.
pub struct SeenCache<K: Hash + Eq> {
    seen: LruCache<K, ()>,
}

impl<K: Hash + Eq> SeenCache<K> {
    /// Create a cache holding at most `capacity` keys (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            seen: LruCache::new(capacity),
        }
    }

    /// Check if a key is currently remembered.
    pub fn is_seen(&self, key: &K) -> bool {
        self.seen.contains(key)
    }

    /// Mark a key as seen.
    ///
    /// Returns true if the key was not remembered before this call.
    pub fn mark_seen(&mut self, key: K) -> bool {
        self.seen.put(key, ()).is_none()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.seen.cap().get()
    }
}
