//! Keyed memoization of expensive aggregations for one session.
//!
//! Each key owns a slot with its own lock. The map lock is held only long
//! enough to find or create the slot, so a slow factory for one key never
//! blocks callers of another key. Callers racing on the same empty slot wait
//! for the first factory to finish and then share its result.
//!
//! A failed (or panicking) factory leaves the slot empty; the next caller
//! runs the factory again. Nothing is evicted until [`AggregationCache::clear`].

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::Result;

/// Opaque cache key: every parameter that changes the cached result, joined by `|`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey(String);

impl StateKey {
    pub fn new(kind: &str) -> Self {
        Self(kind.to_string())
    }

    pub fn with(mut self, part: impl fmt::Display) -> Self {
        use fmt::Write;
        self.0.push('|');
        let _ = write!(self.0, "{part}");
        self
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StateKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

type Slot<V> = Arc<Mutex<Option<Arc<V>>>>;

pub struct AggregationCache<V> {
    slots: Mutex<HashMap<String, Slot<V>>>,
    builds: AtomicUsize,
}

impl<V> Default for AggregationCache<V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            builds: AtomicUsize::new(0),
        }
    }
}

impl<V> AggregationCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the value for `key`, running `factory` only if no value exists yet.
    pub fn get_or_compute<F>(&self, key: impl AsRef<str>, factory: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        let key = key.as_ref();
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key.to_string()).or_default())
        };

        let mut guard = slot.lock();
        if let Some(value) = guard.as_ref() {
            return Ok(Arc::clone(value));
        }

        debug!(key, "cache miss, building aggregation");
        self.builds.fetch_add(1, Ordering::Relaxed);
        let value = Arc::new(factory()?);
        *guard = Some(Arc::clone(&value));
        Ok(value)
    }

    /// Cached value for `key`, if one has been built.
    pub fn get(&self, key: impl AsRef<str>) -> Option<Arc<V>> {
        let slot = self.slots.lock().get(key.as_ref()).cloned()?;
        let guard = slot.lock();
        guard.as_ref().map(Arc::clone)
    }

    pub fn contains(&self, key: impl AsRef<str>) -> bool {
        self.get(key).is_some()
    }

    /// Number of keys holding a built value.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot<V>> = self.slots.lock().values().cloned().collect();
        slots.iter().filter(|slot| slot.lock().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of factory invocations so far, failed ones included.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    /// Drop every entry. Values stay alive while callers still hold them.
    pub fn clear(&self) {
        self.slots.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatError;
    use std::sync::mpsc;
    use std::sync::Barrier;
    use std::time::Duration;

    #[test]
    fn state_key_joins_parts() {
        let key = StateKey::new("hist").with("ES").with(4);
        assert_eq!(key.as_str(), "hist|ES|4");
        assert_eq!(key.to_string(), "hist|ES|4");
    }

    #[test]
    fn second_call_reuses_first_value() {
        let cache = AggregationCache::new();
        let mut compute_count = 0;
        let a = cache
            .get_or_compute("A", || {
                compute_count += 1;
                Ok(compute_count)
            })
            .unwrap();
        let b = cache
            .get_or_compute("A", || {
                compute_count += 1;
                Ok(compute_count)
            })
            .unwrap();
        assert_eq!(*a, 1);
        assert_eq!(*b, 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(compute_count, 1);
        assert_eq!(cache.builds(), 1);
    }

    #[test]
    fn failure_is_not_cached() {
        let cache: AggregationCache<u32> = AggregationCache::new();
        let err = cache
            .get_or_compute("A", || Err(StatError::failure("boom")))
            .unwrap_err();
        assert_eq!(err, StatError::ComputationFailure("boom".into()));
        assert!(!cache.contains("A"));

        let v = cache.get_or_compute("A", || Ok(7)).unwrap();
        assert_eq!(*v, 7);
        assert_eq!(cache.builds(), 2);
    }

    #[test]
    fn failure_leaves_other_keys_alone() {
        let cache: AggregationCache<u32> = AggregationCache::new();
        cache.get_or_compute("good", || Ok(1)).unwrap();
        let _ = cache.get_or_compute("bad", || Err(StatError::failure("x")));
        assert_eq!(*cache.get("good").unwrap(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_same_key_builds_once() {
        let cache: AggregationCache<usize> = AggregationCache::new();
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(8);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    barrier.wait();
                    let v = cache
                        .get_or_compute("shared", || {
                            std::thread::sleep(Duration::from_millis(20));
                            Ok(calls.fetch_add(1, Ordering::SeqCst) + 1)
                        })
                        .unwrap();
                    assert_eq!(*v, 1);
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.builds(), 1);
    }

    #[test]
    fn distinct_keys_do_not_block_each_other() {
        let cache: AggregationCache<&'static str> = AggregationCache::new();
        let (tx, rx) = mpsc::channel::<()>();

        let cache_ref = &cache;
        std::thread::scope(|s| {
            let slow = s.spawn(move || {
                cache_ref.get_or_compute("slow", move || {
                    // Finishes only once "fast" has been built by the other thread.
                    rx.recv_timeout(Duration::from_secs(5))
                        .map_err(|_| StatError::failure("blocked by another key"))?;
                    Ok("slow")
                })
            });
            std::thread::sleep(Duration::from_millis(20));
            let fast = cache.get_or_compute("fast", || Ok("fast")).unwrap();
            tx.send(()).unwrap();
            assert_eq!(*fast, "fast");
            assert_eq!(*slow.join().unwrap().unwrap(), "slow");
        });

        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn clear_empties_cache() {
        let cache = AggregationCache::new();
        let held = cache.get_or_compute("A", || Ok(1)).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(*held, 1);
        cache.get_or_compute("A", || Ok(2)).unwrap();
        assert_eq!(*cache.get("A").unwrap(), 2);
    }
}
