use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// A map whose entries disappear once they are older than a fixed TTL.
///
/// Stale entries are never returned; they are dropped lazily on access and in
/// bulk by [`ExpiringMap::purge_expired`].
#[derive(Debug)]
pub struct ExpiringMap<K, V> {
    entries: Mutex<HashMap<K, (V, Instant)>>,
    ttl: Duration,
}

impl<K: Eq + Hash, V: Clone> ExpiringMap<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, (V, Instant)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_fresh(&self, inserted_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(inserted_at) < self.ttl
    }

    /// Inserts or replaces the value for `key`, restarting its lifetime.
    pub fn insert(&self, key: K, value: V) {
        self.lock().insert(key, (value, Instant::now()));
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.lock();
        let found = entries
            .get(key)
            .map(|(value, inserted_at)| (value.clone(), self.is_fresh(*inserted_at, now)));
        match found {
            Some((value, true)) => Some(value),
            Some((_, false)) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Removes and returns the value for `key` if it has not expired.
    pub fn take(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let (value, inserted_at) = self.lock().remove(key)?;
        self.is_fresh(inserted_at, now).then_some(value)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, (_, inserted_at)| now.saturating_duration_since(*inserted_at) < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
