use crate::domain::case::{Case, CorrelationKey, Stage};
use crate::error::{AdapterError, Result};
use crate::infrastructure::lock_map::{KeyGuard, LockMap};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Proof that the holder owns the per-key lock of a correlation key.
///
/// Mutating methods of [`CorrelationStore`] take a guard so a case can only be
/// changed by the stage currently holding its lock. Dropping the guard releases it.
pub struct CaseGuard {
    inner: KeyGuard<CorrelationKey>,
}

impl CaseGuard {
    pub fn key(&self) -> &CorrelationKey {
        self.inner.key()
    }
}

/// Bounded-lifetime mapping from correlation key to live case.
///
/// Reads are lock-free with respect to the per-key locks; writes require a
/// [`CaseGuard`]. Each case carries its creation time and becomes eligible for
/// eviction once it is older than `ttl`.
pub struct CorrelationStore {
    cases: RwLock<HashMap<CorrelationKey, Case>>,
    locks: LockMap<CorrelationKey>,
    ttl: Duration,
}

impl CorrelationStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cases: RwLock::new(HashMap::new()),
            locks: LockMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Blocks until no other stage holds `key`.
    pub async fn acquire(&self, key: &CorrelationKey) -> CaseGuard {
        CaseGuard {
            inner: self.locks.acquire(key.clone()).await,
        }
    }

    pub async fn get(&self, key: &CorrelationKey) -> Option<Case> {
        let cases = self.cases.read().await;
        cases.get(key).cloned()
    }

    /// Registers a new case, rejecting a key that already has a live one.
    pub async fn register(&self, guard: &CaseGuard, case: Case) -> Result<()> {
        debug_assert_eq!(guard.key(), &case.key);
        let mut cases = self.cases.write().await;
        if cases.contains_key(guard.key()) {
            return Err(AdapterError::DuplicateCase(guard.key().clone()));
        }
        cases.insert(guard.key().clone(), case);
        Ok(())
    }

    /// Registers or replaces the case held by `guard`.
    pub async fn put(&self, guard: &CaseGuard, case: Case) {
        debug_assert_eq!(guard.key(), &case.key);
        let mut cases = self.cases.write().await;
        cases.insert(guard.key().clone(), case);
    }

    /// Removes the case held by `guard`. Removing an absent key is a no-op.
    pub async fn remove(&self, guard: &CaseGuard) -> Option<Case> {
        let mut cases = self.cases.write().await;
        cases.remove(guard.key())
    }

    /// Keys whose case is older than the TTL at `now`, with the stage observed.
    pub async fn expired(&self, now: Instant) -> Vec<(CorrelationKey, Stage)> {
        let cases = self.cases.read().await;
        cases
            .values()
            .filter(|case| case.is_expired(self.ttl, now))
            .map(|case| (case.key.clone(), case.stage))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.cases.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cases.read().await.is_empty()
    }
}
