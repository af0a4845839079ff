use crate::domain::case::CorrelationKey;
use crate::domain::message::{FailureReason, Message, Payload};
use crate::domain::protocol::DataReference;
use crate::error::Result;
use crate::infrastructure::correlation_store::CorrelationStore;
use crate::infrastructure::expiring_map::ExpiringMap;
use crate::infrastructure::pending::PendingCaseRegistry;
use crate::messaging::MessageHandler;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Terminal outcome of a case.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(DataReference),
    Error(FailureReason),
}

/// What the caller sees when polling for a key.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultStatus {
    Pending,
    Success(DataReference),
    Error(FailureReason),
}

impl From<Option<Outcome>> for ResultStatus {
    fn from(outcome: Option<Outcome>) -> Self {
        match outcome {
            Some(Outcome::Success(reference)) => ResultStatus::Success(reference),
            Some(Outcome::Error(reason)) => ResultStatus::Error(reason),
            None => ResultStatus::Pending,
        }
    }
}

/// Terminal outcomes keyed by correlation key, retrievable until consumed or expired.
///
/// Reading an outcome with [`OutcomeBoard::take`] consumes it. Waiters are
/// woken whenever any outcome is recorded and re-check their own key.
pub struct OutcomeBoard {
    outcomes: ExpiringMap<CorrelationKey, Outcome>,
    recorded: Notify,
}

impl OutcomeBoard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            outcomes: ExpiringMap::new(ttl),
            recorded: Notify::new(),
        }
    }

    pub fn record(&self, key: CorrelationKey, outcome: Outcome) {
        self.outcomes.insert(key, outcome);
        self.recorded.notify_waiters();
    }

    pub fn take(&self, key: &CorrelationKey) -> Option<Outcome> {
        self.outcomes.take(key)
    }

    pub fn peek(&self, key: &CorrelationKey) -> Option<Outcome> {
        self.outcomes.get(key)
    }

    /// Waits up to `timeout` for the outcome of `key` and consumes it.
    pub async fn wait_for(&self, key: &CorrelationKey, timeout: Duration) -> Option<Outcome> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.recorded.notified();
            tokio::pin!(notified);
            // Register before checking so a record between the check and the await is not missed.
            notified.as_mut().enable();

            if let Some(outcome) = self.take(key) {
                return Some(outcome);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.take(key);
            }
        }
    }

    pub fn purge_expired(&self) -> usize {
        self.outcomes.purge_expired()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Handler of the `Result` channel: records successful outcomes.
pub struct ResultService {
    board: Arc<OutcomeBoard>,
}

impl ResultService {
    pub fn new(board: Arc<OutcomeBoard>) -> Self {
        Self { board }
    }
}

#[async_trait]
impl MessageHandler for ResultService {
    async fn handle(&self, message: Message) -> Result<()> {
        match message.payload {
            Payload::Completed(reference) => {
                info!(key = %message.key, endpoint = %reference.endpoint, "case completed");
                self.board.record(message.key, Outcome::Success(reference));
            }
            other => warn!(key = %message.key, payload = ?other, "unexpected payload on result channel"),
        }
        Ok(())
    }
}

/// Handler of the dead-letter channel: records failed outcomes and reports them.
///
/// A `Fault` means the stage that produced it could not close the case, so the
/// case and its pending record are removed here under the per-key lock.
pub struct ErrorResultService {
    board: Arc<OutcomeBoard>,
    store: Arc<CorrelationStore>,
    registry: Arc<PendingCaseRegistry>,
}

impl ErrorResultService {
    pub fn new(
        board: Arc<OutcomeBoard>,
        store: Arc<CorrelationStore>,
        registry: Arc<PendingCaseRegistry>,
    ) -> Self {
        Self {
            board,
            store,
            registry,
        }
    }
}

#[async_trait]
impl MessageHandler for ErrorResultService {
    async fn handle(&self, message: Message) -> Result<()> {
        let key = message.key;
        let reason = match message.payload {
            Payload::Failed(reason) => reason,
            Payload::Fault(fault) => {
                let guard = self.store.acquire(&key).await;
                let stage = self.store.remove(&guard).await.map(|case| case.stage);
                self.registry.take_for(&key);
                warn!(key = %key, stage = ?stage, "closed case after handler fault");
                FailureReason::Internal(fault)
            }
            other => FailureReason::Internal(format!("unexpected dead letter: {other:?}")),
        };
        error!(key = %key, reason = %reason, "case failed");
        self.board.record(key, Outcome::Error(reason));
        Ok(())
    }
}
