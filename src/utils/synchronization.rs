//! Reader-preferring shared collections used across concurrent transform calls.
//!
//! Class loads arrive from independent loader threads. The state they share is small and read
//! far more often than it is written, so every collection here follows the same discipline:
//! point lookups take a shared lock, and a miss promotes to the exclusive lock, which re-checks
//! presence before inserting.
//!
//! # Key Components
//!
//! - [`Locker`] - A value behind a [`std::sync::RwLock`], accessed through closures
//! - [`ConcurrentMap`] - Insert-only map with `compute_if_absent` / `put_if_absent`
//! - [`DedupGuard`] - Insert-only set of class names that have been claimed
//!
//! # Guarantees
//!
//! - Once a key is visible to any reader it stays visible; there is no removal path.
//! - `compute_if_absent` may run more than one factory under a genuine race, but every caller
//!   gets the value that was stored first.

use std::{
    borrow::Borrow,
    collections::{HashMap, HashSet},
    hash::Hash,
    sync::RwLock,
};

/// A value guarded by a reader-writer lock.
///
/// Access is scoped to a closure, so a guard never outlives the operation that needed it.
#[derive(Debug, Default)]
pub struct Locker<M> {
    inner: RwLock<M>,
}

impl<M> Locker<M> {
    /// Wrap `value`
    pub fn new(value: M) -> Self {
        Locker {
            inner: RwLock::new(value),
        }
    }

    /// Run `action` with shared access
    pub fn read<R, F>(&self, action: F) -> R
    where
        F: FnOnce(&M) -> R,
    {
        with_read!(self.inner, action)
    }

    /// Run `action` with exclusive access
    pub fn write<R, F>(&self, action: F) -> R
    where
        F: FnOnce(&mut M) -> R,
    {
        with_write!(self.inner, action)
    }

    /// Consume the locker and return the value
    pub fn into_inner(self) -> M {
        self.inner
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Insert-only concurrent map.
///
/// Values are handed out by clone; store an [`std::sync::Arc`] to share one instance between
/// callers.
#[derive(Debug)]
pub struct ConcurrentMap<K, V> {
    locker: Locker<HashMap<K, V>>,
}

impl<K, V> Default for ConcurrentMap<K, V> {
    fn default() -> Self {
        ConcurrentMap {
            locker: Locker::new(HashMap::new()),
        }
    }
}

impl<K, V> ConcurrentMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored for `key`
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.locker.read(|map| map.get(key).cloned())
    }

    /// Returns `true` if a value is stored for `key`
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.locker.read(|map| map.contains_key(key))
    }

    /// Value stored for `key`, creating it with `factory` if absent.
    ///
    /// The returned value is always the one held by the map. Under contention `factory` may
    /// run on several threads, but only the first result to reach the exclusive lock is kept.
    pub fn compute_if_absent<F>(&self, key: K, factory: F) -> V
    where
        F: FnOnce(&K) -> V,
    {
        if let Some(value) = self.get(&key) {
            return value;
        }

        self.locker
            .write(|map| map.entry(key).or_insert_with_key(factory).clone())
    }

    /// Store `value` unless `key` is present; returns the value held by the map afterwards.
    pub fn put_if_absent(&self, key: K, value: V) -> V {
        if let Some(existing) = self.get(&key) {
            return existing;
        }

        self.locker
            .write(|map| map.entry(key).or_insert(value).clone())
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.locker.read(HashMap::len)
    }

    /// Returns `true` if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.locker.read(HashMap::is_empty)
    }
}

/// Set of class names handed to the pipeline during this process lifetime.
///
/// Names are only ever added. [`DedupGuard::claim`] succeeds for exactly one caller per name,
/// no matter how many threads race on it.
#[derive(Debug, Default)]
pub struct DedupGuard {
    seen: Locker<HashSet<String>>,
}

impl DedupGuard {
    /// Create an empty guard
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `name` has already been claimed
    pub fn contains(&self, name: &str) -> bool {
        self.seen.read(|set| set.contains(name))
    }

    /// Claim `name`. Returns `true` only for the caller that inserted it.
    pub fn claim(&self, name: &str) -> bool {
        if self.contains(name) {
            return false;
        }

        self.seen.write(|set| set.insert(name.to_string()))
    }

    /// Number of claimed names
    pub fn len(&self) -> usize {
        self.seen.read(HashSet::len)
    }

    /// Returns `true` if no name has been claimed
    pub fn is_empty(&self) -> bool {
        self.seen.read(HashSet::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Barrier,
    };

    #[test]
    fn locker_scopes_access() {
        let locker = Locker::new(vec![1, 2]);
        locker.write(|v| v.push(3));
        assert_eq!(locker.read(Vec::len), 3);
        assert_eq!(locker.into_inner(), vec![1, 2, 3]);
    }

    #[test]
    fn compute_if_absent_keeps_first() {
        let map = ConcurrentMap::new();
        assert_eq!(map.compute_if_absent("a", |_| 1), 1);
        assert_eq!(map.compute_if_absent("a", |_| 2), 1);
        assert_eq!(map.put_if_absent("a", 3), 1);
        assert_eq!(map.put_if_absent("b", 4), 4);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("b"), Some(4));
        assert!(!map.contains_key("c"));
    }

    #[test]
    fn compute_if_absent_single_value_under_contention() {
        const THREADS: usize = 16;
        let map: Arc<ConcurrentMap<String, Arc<usize>>> = Arc::new(ConcurrentMap::new());
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let map = Arc::clone(&map);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    map.compute_if_absent("key".to_string(), |_| Arc::new(i))
                })
            })
            .collect();

        let results: Vec<Arc<usize>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let stored = map.get("key").unwrap();
        assert_eq!(map.len(), 1);
        assert!(results.iter().all(|value| Arc::ptr_eq(value, &stored)));
    }

    #[test]
    fn dedup_claims_once() {
        let guard = DedupGuard::new();
        assert!(!guard.contains("a.B"));
        assert!(guard.claim("a.B"));
        assert!(!guard.claim("a.B"));
        assert!(guard.contains("a.B"));
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn dedup_single_winner_under_contention() {
        const THREADS: usize = 12;
        let guard = Arc::new(DedupGuard::new());
        let winners = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let guard = Arc::clone(&guard);
                let winners = Arc::clone(&winners);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    if guard.claim("com.example.Contended") {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
