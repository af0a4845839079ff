use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<()>>;
type Slots<K> = Arc<Mutex<HashMap<K, Slot>>>;

fn lock_slots<K>(slots: &Mutex<HashMap<K, Slot>>) -> MutexGuard<'_, HashMap<K, Slot>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drops the slot for `key` once nobody but the map refers to it.
fn release_slot<K: Eq + Hash>(slots: &Mutex<HashMap<K, Slot>>, key: &K) {
    let mut slots = lock_slots(slots);
    if let Some(slot) = slots.get(key)
        && Arc::strong_count(slot) == 1
    {
        slots.remove(key);
    }
}

/// Cleans up the slot if an `acquire` is cancelled while waiting.
struct Waiter<'a, K: Eq + Hash> {
    key: &'a K,
    slots: &'a Mutex<HashMap<K, Slot>>,
    armed: bool,
}

impl<K: Eq + Hash> Waiter<'_, K> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<K: Eq + Hash> Drop for Waiter<'_, K> {
    fn drop(&mut self) {
        if self.armed {
            release_slot(self.slots, self.key);
        }
    }
}

/// One async mutex per key, created on demand.
///
/// Holders of different keys never contend with each other. A key's slot is
/// dropped from the map once its last holder or waiter lets go, so the map only
/// grows with the number of keys in use at the same time.
pub struct LockMap<K> {
    slots: Slots<K>,
}

impl<K> Default for LockMap<K> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K: Eq + Hash + Clone> LockMap<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no one else holds `key`, then returns a guard that releases it on drop.
    pub async fn acquire(&self, key: K) -> KeyGuard<K> {
        let slot = {
            let mut slots = lock_slots(&self.slots);
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        let waiter = Waiter {
            key: &key,
            slots: &self.slots,
            armed: true,
        };
        // The pending lock future holds the slot and is dropped before the waiter.
        let guard = slot.lock_owned().await;
        waiter.disarm();
        KeyGuard {
            key,
            guard: Some(guard),
            slots: Arc::clone(&self.slots),
        }
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        lock_slots(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct KeyGuard<K: Eq + Hash + Clone> {
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
    slots: Slots<K>,
}

impl<K: Eq + Hash + Clone> KeyGuard<K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash + Clone> Drop for KeyGuard<K> {
    fn drop(&mut self) {
        // Release first so the strong count below only sees the map and waiters.
        drop(self.guard.take());
        release_slot(&self.slots, &self.key);
    }
}
