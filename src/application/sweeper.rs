use crate::application::handlers::initial::OfferCache;
use crate::application::results::OutcomeBoard;
use crate::domain::message::{FailureReason, Message};
use crate::infrastructure::correlation_store::CorrelationStore;
use crate::infrastructure::pending::PendingCaseRegistry;
use crate::messaging::Publisher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Periodically evicts cases that outlived their TTL and routes them to the
/// dead-letter channel as timeouts.
///
/// Each eviction happens under the per-key lock and only if the case is still
/// in the stage it was observed in, so a transition that wins the race for the
/// lock is never undone by the same sweep.
pub struct Sweeper {
    store: Arc<CorrelationStore>,
    registry: Arc<PendingCaseRegistry>,
    board: Arc<OutcomeBoard>,
    offers: Arc<OfferCache>,
    publisher: Publisher,
    parked_ttl: Duration,
}

impl Sweeper {
    pub fn new(
        store: Arc<CorrelationStore>,
        registry: Arc<PendingCaseRegistry>,
        board: Arc<OutcomeBoard>,
        offers: Arc<OfferCache>,
        publisher: Publisher,
        parked_ttl: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            board,
            offers,
            publisher,
            parked_ttl,
        }
    }

    /// Runs one sweep and returns the number of cases timed out.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut evicted = 0;

        for (key, observed) in self.store.expired(now).await {
            let guard = self.store.acquire(&key).await;
            match self.store.get(&key).await {
                Some(case) if case.stage == observed && case.is_expired(self.store.ttl(), now) => {}
                _ => {
                    debug!(key = %key, "case changed before eviction, skipping");
                    continue;
                }
            }
            self.store.remove(&guard).await;
            self.registry.take_for(&key);
            drop(guard);

            warn!(key = %key, stage = ?observed, "case timed out");
            if let Err(err) = self
                .publisher
                .publish(Message::failed(key.clone(), FailureReason::Timeout))
            {
                warn!(key = %key, error = %err, "could not route timeout");
            }
            evicted += 1;
        }

        let parked = self.registry.purge_parked(now, self.parked_ttl);
        let closed = self.registry.purge_closed(now, self.store.ttl());
        let results = self.board.purge_expired();
        let offers = self.offers.purge_expired();
        if parked + closed + results + offers > 0 {
            debug!(parked, closed, results, offers, "purged expired entries");
        }
        evicted
    }

    pub fn spawn(self, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = interval.as_millis() as u64, "sweeper started");
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                }
            }
            debug!("sweeper stopped");
        })
    }
}
