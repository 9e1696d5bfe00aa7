//! Bounded dedup cache every message consumer checks before acting on a
//! [`ControlMessage`](crate::ControlMessage). At-least-once delivery plus a
//! bounded cache means a sufficiently old duplicate can still slip through
//! after eviction — acceptable per the Non-goals (no exactly-once guarantee).

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use uuid::Uuid;

pub const DEFAULT_DEDUP_CAPACITY: usize = 100_000;

pub struct DedupLru {
    seen: Mutex<LruCache<Uuid, ()>>,
}

impl DedupLru {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            seen: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns `true` if this is the first time `event_id` has been seen
    /// (caller should act on it), `false` if it's a duplicate (caller should
    /// drop it).
    pub fn check_and_insert(&self, event_id: Uuid) -> bool {
        let mut seen = self.seen.lock();
        if seen.contains(&event_id) {
            false
        } else {
            seen.put(event_id, ());
            true
        }
    }
}

impl Default for DedupLru {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sighting_is_accepted_repeat_is_rejected() {
        let dedup = DedupLru::new(16);
        let id = Uuid::new_v4();
        assert!(dedup.check_and_insert(id));
        assert!(!dedup.check_and_insert(id));
    }

    #[test]
    fn eviction_lets_a_sufficiently_old_duplicate_back_in() {
        let dedup = DedupLru::new(2);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        assert!(dedup.check_and_insert(a));
        assert!(dedup.check_and_insert(b));
        assert!(dedup.check_and_insert(c)); // evicts `a`
        assert!(dedup.check_and_insert(a)); // `a` is gone, treated as new
    }
}
