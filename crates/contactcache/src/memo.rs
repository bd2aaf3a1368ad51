//! Memo store: compute-once cache keyed by lookup arguments
//!
//! A slot is either a stored value or a marker for a load in progress.
//! The map lock is never held while a value is being computed; callers
//! that find a load in progress park on a condvar until it settles.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use ahash::RandomState;
use contactdb::{Error, Result};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::stats::CacheStats;

/// Memo store configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoConfig {
    /// How long a caller waits on another caller's load. `None` waits forever.
    pub wait_timeout: Option<Duration>,
}

impl MemoConfig {
    /// Check the config for values the store cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.wait_timeout == Some(Duration::ZERO) {
            return Err(Error::InvalidConfig(
                "wait timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

enum Slot<V> {
    Ready(V),
    Loading,
}

type SlotMap<K, V> = HashMap<K, Slot<V>, RandomState>;

/// Unbounded memoizing store with at most one load in flight per key
pub struct MemoStore<K, V> {
    slots: Mutex<SlotMap<K, V>>,
    settled: Condvar,
    stats: CacheStats,
    config: MemoConfig,
}

impl<K, V> Default for MemoStore<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MemoStore<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create an empty store that waits forever on in-flight loads
    pub fn new() -> Self {
        Self::build(MemoConfig::default())
    }

    /// Create an empty store with the given config
    pub fn with_config(config: MemoConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: MemoConfig) -> Self {
        Self {
            slots: Mutex::new(HashMap::with_hasher(RandomState::new())),
            settled: Condvar::new(),
            stats: CacheStats::new(),
            config,
        }
    }

    /// Return the stored value for `key`, computing and storing it on a miss
    ///
    /// `compute` runs at most once per miss and never under the map lock.
    /// Callers arriving while it runs wait for its outcome. An `Err` from
    /// `compute` is returned to its caller only and nothing is stored, so
    /// the next lookup for `key` computes again.
    ///
    /// # Arguments
    /// * `key` - Lookup key
    /// * `compute` - Slow producer of the value for `key`
    ///
    /// # Returns
    /// * `Result<V>` - Stored or freshly computed value
    pub fn get_or_compute<F>(&self, key: K, compute: F) -> Result<V>
    where
        F: FnOnce(&K) -> Result<V>,
    {
        let mut slots = self.slots.lock();
        let mut deadline = None;
        let mut waited = false;
        let mut timed_out = None;

        loop {
            match slots.get(&key) {
                Some(Slot::Ready(value)) => {
                    self.stats.record_hit();
                    return Ok(value.clone());
                }
                Some(Slot::Loading) => {
                    if let Some(after) = timed_out {
                        self.stats.record_timeout();
                        return Err(Error::Timeout(after));
                    }
                }
                None => break,
            }

            if !waited {
                self.stats.record_coalesced();
                waited = true;
            }
            timed_out = self.wait_for_load(&mut slots, &mut deadline);
        }

        self.stats.record_miss();
        slots.insert(key.clone(), Slot::Loading);
        drop(slots);

        let guard = LoadGuard {
            store: self,
            key: &key,
            armed: true,
        };
        let value = compute(&key)?;

        self.slots
            .lock()
            .insert(key.clone(), Slot::Ready(value.clone()));
        guard.disarm();
        self.stats.record_load();
        self.settled.notify_all();

        Ok(value)
    }

    /// Park until some load settles. Returns the configured timeout once
    /// the deadline has passed.
    fn wait_for_load(
        &self,
        slots: &mut MutexGuard<'_, SlotMap<K, V>>,
        deadline: &mut Option<Instant>,
    ) -> Option<Duration> {
        match self.config.wait_timeout {
            None => {
                self.settled.wait(slots);
                None
            }
            Some(timeout) => {
                let until = *deadline.get_or_insert_with(|| Instant::now() + timeout);
                if self.settled.wait_until(slots, until).timed_out() {
                    Some(timeout)
                } else {
                    None
                }
            }
        }
    }

    /// Stored value for `key`, without computing
    pub fn get(&self, key: &K) -> Option<V> {
        match self.slots.lock().get(key) {
            Some(Slot::Ready(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Check whether a value is stored for `key`
    pub fn contains(&self, key: &K) -> bool {
        matches!(self.slots.lock().get(key), Some(Slot::Ready(_)))
    }

    /// Number of stored values (in-flight loads excluded)
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    /// Check whether no value is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Get the store config
    pub fn config(&self) -> MemoConfig {
        self.config
    }
}

/// Clears a `Loading` slot and wakes waiters if the load does not complete
struct LoadGuard<'a, K, V>
where
    K: Hash + Eq,
{
    store: &'a MemoStore<K, V>,
    key: &'a K,
    armed: bool,
}

impl<K, V> LoadGuard<'_, K, V>
where
    K: Hash + Eq,
{
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<K, V> Drop for LoadGuard<'_, K, V>
where
    K: Hash + Eq,
{
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.store.slots.lock().remove(self.key);
        self.store.stats.record_failure();
        self.store.settled.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;

    #[test]
    fn test_miss_then_hit() {
        let store = MemoStore::new();
        let calls = AtomicUsize::new(0);

        let compute = |k: &u32| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(k * 10)
        };

        assert_eq!(store.get_or_compute(4, compute).unwrap(), 40);
        assert_eq!(store.get_or_compute(4, compute).unwrap(), 40);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.stats().misses(), 1);
        assert_eq!(store.stats().hits(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_hit_skips_compute() {
        let store = MemoStore::new();
        store.get_or_compute("a", |_| Ok(1)).unwrap();

        let value = store
            .get_or_compute("a", |_| -> Result<i32> { panic!("must not recompute") })
            .unwrap();

        assert_eq!(value, 1);
    }

    #[test]
    fn test_keys_are_independent() {
        let store = MemoStore::new();

        store.get_or_compute(1, |_| Ok("one")).unwrap();
        store.get_or_compute(2, |_| Ok("two")).unwrap();

        assert_eq!(store.get(&1), Some("one"));
        assert_eq!(store.get(&2), Some("two"));
        assert_eq!(store.get(&3), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_failure_not_cached() {
        let store: MemoStore<u32, u32> = MemoStore::new();

        let result = store.get_or_compute(7, |_| Err(Error::Interrupted));
        assert_eq!(result, Err(Error::Interrupted));
        assert!(!store.contains(&7));
        assert!(store.is_empty());
        assert_eq!(store.stats().failures(), 1);

        assert_eq!(store.get_or_compute(7, |k| Ok(*k)).unwrap(), 7);
        assert_eq!(store.stats().misses(), 2);
        assert_eq!(store.stats().loads(), 1);
    }

    #[test]
    fn test_panic_clears_loading_slot() {
        let store: MemoStore<u32, u32> = MemoStore::new();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            store.get_or_compute(1, |_| -> Result<u32> { panic!("loader blew up") })
        }));
        assert!(outcome.is_err());

        assert_eq!(store.get_or_compute(1, |_| Ok(11)).unwrap(), 11);
        assert_eq!(store.stats().failures(), 1);
    }

    #[test]
    fn test_concurrent_misses_share_one_load() {
        let store = Arc::new(MemoStore::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let (started_tx, started_rx) = mpsc::channel();

        let loader = {
            let store = Arc::clone(&store);
            let calls = Arc::clone(&calls);
            thread::spawn(move || {
                store.get_or_compute(1u32, |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    started_tx.send(()).unwrap();
                    thread::sleep(Duration::from_millis(100));
                    Ok("loaded".to_string())
                })
            })
        };
        started_rx.recv().unwrap();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    store.get_or_compute(1u32, |_| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok("duplicate".to_string())
                    })
                })
            })
            .collect();

        assert_eq!(loader.join().unwrap().unwrap(), "loaded");
        for waiter in waiters {
            assert_eq!(waiter.join().unwrap().unwrap(), "loaded");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.stats().loads(), 1);
        assert_eq!(store.stats().hits(), 4);
    }

    #[test]
    fn test_load_does_not_block_other_keys() {
        let store = Arc::new(MemoStore::new());
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let slow = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                store.get_or_compute(1u32, |_| {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok(1u32)
                })
            })
        };
        started_rx.recv().unwrap();

        assert_eq!(store.get_or_compute(2, |_| Ok(2)).unwrap(), 2);
        assert!(!store.contains(&1));

        release_tx.send(()).unwrap();
        assert_eq!(slow.join().unwrap().unwrap(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_waiter_takes_over_after_failure() {
        let store = Arc::new(MemoStore::new());
        let (started_tx, started_rx) = mpsc::channel();

        let failing = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                store.get_or_compute(9u32, |_| {
                    started_tx.send(()).unwrap();
                    thread::sleep(Duration::from_millis(50));
                    Err(Error::Interrupted)
                })
            })
        };
        started_rx.recv().unwrap();

        let value = store.get_or_compute(9, |_| Ok(99u32)).unwrap();

        assert_eq!(failing.join().unwrap(), Err(Error::Interrupted));
        assert_eq!(value, 99);
        assert_eq!(store.get(&9), Some(99));
    }

    #[test]
    fn test_waiter_timeout() {
        let config = MemoConfig {
            wait_timeout: Some(Duration::from_millis(20)),
        };
        let store = Arc::new(MemoStore::with_config(config).unwrap());
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let slow = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                store.get_or_compute(1u32, |_| {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok(1u32)
                })
            })
        };
        started_rx.recv().unwrap();

        let result = store.get_or_compute(1, |_| Ok(2));
        assert_eq!(result, Err(Error::Timeout(Duration::from_millis(20))));
        assert_eq!(store.stats().timeouts(), 1);

        release_tx.send(()).unwrap();
        assert_eq!(slow.join().unwrap().unwrap(), 1);
        assert_eq!(store.get(&1), Some(1));
    }

    #[test]
    fn test_zero_wait_timeout_rejected() {
        let config = MemoConfig {
            wait_timeout: Some(Duration::ZERO),
        };

        assert!(matches!(
            MemoStore::<u32, u32>::with_config(config),
            Err(Error::InvalidConfig(_))
        ));
    }
}
