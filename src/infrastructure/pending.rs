use crate::domain::case::CorrelationKey;
use crate::domain::protocol::{ContractId, ContractOffer, NegotiationId};
use crate::error::{AdapterError, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Negotiation data written by the initial stage and consumed by the confirmation stage.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    pub offer: ContractOffer,
    pub negotiation_id: NegotiationId,
}

#[derive(Debug)]
struct ParkedConfirmation {
    contract_id: ContractId,
    parked_at: Instant,
}

/// Where a negotiation confirmation should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The negotiation belongs to a pending case.
    Pending(CorrelationKey),
    /// The negotiation is not known yet; the confirmation was parked.
    Parked,
    /// The negotiation's record was already consumed; the confirmation is stale.
    Closed,
}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<CorrelationKey, PendingRecord>,
    by_negotiation: HashMap<NegotiationId, CorrelationKey>,
    parked: HashMap<NegotiationId, ParkedConfirmation>,
    closed: HashMap<NegotiationId, Instant>,
}

/// Holds pending negotiation records keyed by correlation key.
///
/// Records are write-once and remove-on-read. The registry also indexes
/// negotiation ids back to correlation keys so negotiation callbacks, which
/// only carry protocol ids, can be correlated. A confirmation that arrives
/// before its negotiation id is indexed is parked and handed to the stage that
/// stores the matching record. Negotiation ids whose record was taken are
/// remembered as closed, so redelivered confirmations are not mistaken for
/// early ones.
///
/// All operations are short critical sections on a plain mutex; they never
/// await.
#[derive(Debug, Default)]
pub struct PendingCaseRegistry {
    inner: Mutex<Inner>,
}

impl PendingCaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores the record for `key` and claims a confirmation parked for its negotiation.
    ///
    /// Storing twice for the same key is a logic error and is reported, not ignored.
    pub fn store(&self, key: CorrelationKey, record: PendingRecord) -> Result<Option<ContractId>> {
        let mut inner = self.lock();
        if inner.records.contains_key(&key) {
            return Err(AdapterError::DuplicatePending(key));
        }
        let parked = inner
            .parked
            .remove(&record.negotiation_id)
            .map(|parked| parked.contract_id);
        inner.closed.remove(&record.negotiation_id);
        inner
            .by_negotiation
            .insert(record.negotiation_id.clone(), key.clone());
        inner.records.insert(key, record);
        Ok(parked)
    }

    /// Atomically reads and removes the record for `key`, closing its negotiation.
    pub fn take_for(&self, key: &CorrelationKey) -> Option<PendingRecord> {
        let mut inner = self.lock();
        let record = inner.records.remove(key)?;
        inner.by_negotiation.remove(&record.negotiation_id);
        inner
            .closed
            .insert(record.negotiation_id.clone(), Instant::now());
        Some(record)
    }

    pub fn contains(&self, key: &CorrelationKey) -> bool {
        self.lock().records.contains_key(key)
    }

    pub fn key_for(&self, negotiation_id: &NegotiationId) -> Option<CorrelationKey> {
        self.lock().by_negotiation.get(negotiation_id).cloned()
    }

    /// Resolves the key of a confirmed negotiation, or parks the confirmation if the
    /// negotiation is neither indexed nor closed.
    pub fn resolve_or_park(
        &self,
        negotiation_id: &NegotiationId,
        contract_id: &ContractId,
    ) -> Resolution {
        let mut inner = self.lock();
        if let Some(key) = inner.by_negotiation.get(negotiation_id) {
            return Resolution::Pending(key.clone());
        }
        if inner.closed.contains_key(negotiation_id) {
            return Resolution::Closed;
        }
        inner.parked.insert(
            negotiation_id.clone(),
            ParkedConfirmation {
                contract_id: contract_id.clone(),
                parked_at: Instant::now(),
            },
        );
        Resolution::Parked
    }

    /// Drops parked confirmations older than `ttl`, returning how many were dropped.
    pub fn purge_parked(&self, now: Instant, ttl: Duration) -> usize {
        let mut inner = self.lock();
        let before = inner.parked.len();
        inner
            .parked
            .retain(|_, parked| now.saturating_duration_since(parked.parked_at) < ttl);
        before - inner.parked.len()
    }

    /// Forgets closed negotiations older than `ttl`, returning how many were forgotten.
    pub fn purge_closed(&self, now: Instant, ttl: Duration) -> usize {
        let mut inner = self.lock();
        let before = inner.closed.len();
        inner
            .closed
            .retain(|_, closed_at| now.saturating_duration_since(*closed_at) < ttl);
        before - inner.closed.len()
    }

    pub fn parked_len(&self) -> usize {
        self.lock().parked.len()
    }

    pub fn closed_len(&self) -> usize {
        self.lock().closed.len()
    }
}
