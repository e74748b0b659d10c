//! Cost-bounded LRU cache of resolved images, keyed by item key.
//!
//! Every entry carries a cost (1 per image unless stated otherwise). When an
//! insert pushes the total over `max_cost`, least-recently-used entries are
//! evicted until the total fits again. The entry just inserted is the most
//! recent one, so it only goes if it alone exceeds the budget.
//!
//! Lowering the capacity never evicts by itself: the next insert trims the
//! overshoot. Both `get` and `insert` count as a use.
//!
//! The cache is owned by the control thread; it has no internal locking.

use log::trace;
use lru::LruCache;

use crate::decode::Image;

/// Outcome of a load that finished: either pixels or a recorded failure.
///
/// Failures are cached too, so a broken file is not decoded again on every
/// scroll. They are retried only after the cache is cleared.
#[derive(Debug, Clone)]
pub enum Resolved {
    Loaded(Image),
    Failed(String),
}

/// What the paint path should draw for a key.
#[derive(Debug, Clone, Copy)]
pub enum TileState<'a> {
    /// No resolved entry: draw a placeholder.
    NotLoaded,
    Loaded(&'a Image),
    Failed,
}

impl TileState<'_> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, TileState::Loaded(_))
    }
}

struct Slot {
    value: Resolved,
    cost: usize,
}

pub struct ImageCache {
    entries: LruCache<String, Slot>,
    total_cost: usize,
    max_cost: usize,
}

impl ImageCache {
    pub fn new(max_cost: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            total_cost: 0,
            max_cost,
        }
    }

    /// Look up `key`, marking it most recently used.
    pub fn get(&mut self, key: &str) -> Option<&Resolved> {
        self.entries.get(key).map(|slot| &slot.value)
    }

    /// Look up `key` without touching its recency.
    pub fn peek(&self, key: &str) -> Option<&Resolved> {
        self.entries.peek(key).map(|slot| &slot.value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    /// Paint-path probe.
    pub fn state(&mut self, key: &str) -> TileState<'_> {
        match self.get(key) {
            None => TileState::NotLoaded,
            Some(Resolved::Loaded(image)) => TileState::Loaded(image),
            Some(Resolved::Failed(_)) => TileState::Failed,
        }
    }

    /// Remove `key` and hand its value to the caller.
    pub fn take(&mut self, key: &str) -> Option<Resolved> {
        let slot = self.entries.pop(key)?;
        self.total_cost -= slot.cost;
        Some(slot.value)
    }

    pub fn insert(&mut self, key: String, value: Resolved) {
        self.insert_with_cost(key, value, 1);
    }

    pub fn insert_with_cost(&mut self, key: String, value: Resolved, cost: usize) {
        if let Some(old) = self.entries.put(key, Slot { value, cost }) {
            self.total_cost -= old.cost;
        }
        self.total_cost += cost;
        self.trim();
    }

    fn trim(&mut self) {
        while self.total_cost > self.max_cost {
            let Some((key, slot)) = self.entries.pop_lru() else {
                break;
            };
            self.total_cost -= slot.cost;
            trace!("cache: evict {key} (cost {})", slot.cost);
        }
    }

    pub fn set_capacity(&mut self, max_cost: usize) {
        self.max_cost = max_cost;
    }

    pub fn capacity(&self) -> usize {
        self.max_cost
    }

    pub fn total_cost(&self) -> usize {
        self.total_cost
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_cost = 0;
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbaImage};

    fn loaded() -> Resolved {
        Resolved::Loaded(Image::new(DynamicImage::ImageRgba8(RgbaImage::new(2, 2))))
    }

    #[test]
    fn evicts_first_inserted_when_over_capacity() {
        let mut cache = ImageCache::new(3);
        for key in ["a", "b", "c", "d"] {
            cache.insert(key.into(), loaded());
        }
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("a"));
        for key in ["b", "c", "d"] {
            assert!(cache.contains(key), "{key} should survive");
        }
    }

    #[test]
    fn get_refreshes_recency() {
        let mut cache = ImageCache::new(3);
        for key in ["a", "b", "c"] {
            cache.insert(key.into(), loaded());
        }
        assert!(cache.get("a").is_some());
        cache.insert("d".into(), loaded());
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
    }

    #[test]
    fn peek_does_not_refresh_recency() {
        let mut cache = ImageCache::new(2);
        cache.insert("a".into(), loaded());
        cache.insert("b".into(), loaded());
        assert!(cache.peek("a").is_some());
        cache.insert("c".into(), loaded());
        assert!(!cache.contains("a"));
    }

    #[test]
    fn take_removes_and_releases_cost() {
        let mut cache = ImageCache::new(5);
        cache.insert("a".into(), loaded());
        cache.insert("b".into(), loaded());
        assert!(cache.take("a").is_some());
        assert!(cache.take("a").is_none());
        assert_eq!(cache.total_cost(), 1);
        assert!(matches!(cache.state("a"), TileState::NotLoaded));
    }

    #[test]
    fn oversized_entry_is_not_retained() {
        let mut cache = ImageCache::new(2);
        cache.insert("a".into(), loaded());
        cache.insert_with_cost("huge".into(), loaded(), 3);
        assert!(cache.is_empty());
        assert_eq!(cache.total_cost(), 0);

        let mut zero = ImageCache::new(0);
        zero.insert("a".into(), loaded());
        assert!(zero.is_empty());
    }

    #[test]
    fn replacing_a_key_does_not_double_count() {
        let mut cache = ImageCache::new(2);
        cache.insert("a".into(), loaded());
        cache.insert("a".into(), Resolved::Failed("boom".into()));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_cost(), 1);
        assert!(matches!(cache.state("a"), TileState::Failed));
    }

    #[test]
    fn shrinking_capacity_trims_on_next_insert() {
        let mut cache = ImageCache::new(5);
        for key in ["a", "b", "c", "d", "e"] {
            cache.insert(key.into(), loaded());
        }
        cache.set_capacity(2);
        assert_eq!(cache.len(), 5, "no bulk eviction on shrink");
        cache.insert("f".into(), loaded());
        assert_eq!(cache.len(), 2);
        assert!(cache.contains("e") && cache.contains("f"));
    }

    #[test]
    fn total_cost_stays_within_budget_after_inserts() {
        let mut cache = ImageCache::new(4);
        let costs = [1, 2, 1, 3, 1, 1, 2, 4, 1];
        for (i, cost) in costs.into_iter().enumerate() {
            if i == 5 {
                cache.set_capacity(3);
            }
            cache.insert_with_cost(format!("k{i}"), loaded(), cost);
            assert!(cache.total_cost() <= cache.capacity(), "after insert {i}");
        }
    }

    #[test]
    fn keys_are_most_recent_first() {
        let mut cache = ImageCache::new(3);
        for key in ["a", "b", "c"] {
            cache.insert(key.into(), loaded());
        }
        cache.get("a");
        assert_eq!(cache.keys().collect::<Vec<_>>(), ["a", "c", "b"]);
    }

    #[test]
    fn clear_resets_cost() {
        let mut cache = ImageCache::new(3);
        cache.insert("a".into(), loaded());
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_cost(), 0);
    }
}
