//! Stage handlers, one per inbound channel.
//!
//! Every handler follows the same shape: take the per-key lock, check that the
//! case is in a stage the event may follow, perform at most one collaborator
//! call, update or remove the case, release the lock and publish the follow-up.
//! Events that do not fit the current stage are logged and dropped.

pub mod confirmation;
pub mod data_reference;
pub mod initial;
pub mod negotiation;

pub use confirmation::ConfirmationHandler;
pub use data_reference::DataReferenceHandler;
pub use initial::InitialHandler;
pub use negotiation::NegotiationHandler;

use crate::domain::case::{Case, CorrelationKey, Stage};
use crate::domain::message::{FailureReason, Message};
use crate::error::Result;
use crate::infrastructure::correlation_store::{CaseGuard, CorrelationStore};
use crate::infrastructure::pending::PendingCaseRegistry;
use crate::messaging::Publisher;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared state every stage handler works against.
#[derive(Clone)]
pub struct StageContext {
    pub store: Arc<CorrelationStore>,
    pub registry: Arc<PendingCaseRegistry>,
    pub publisher: Publisher,
}

impl StageContext {
    pub fn new(
        store: Arc<CorrelationStore>,
        registry: Arc<PendingCaseRegistry>,
        publisher: Publisher,
    ) -> Self {
        Self {
            store,
            registry,
            publisher,
        }
    }

    /// Returns the live case for the guarded key, or logs and returns `None`.
    pub(crate) async fn live_case(&self, guard: &CaseGuard, event: &str) -> Option<Case> {
        match self.store.get(guard.key()).await {
            Some(case) if !case.stage.is_terminal() => Some(case),
            Some(case) => {
                warn!(key = %guard.key(), stage = ?case.stage, event, "event for terminal case, discarding");
                None
            }
            None => {
                warn!(key = %guard.key(), event, "event for unknown case, discarding");
                None
            }
        }
    }

    /// Closes the guarded case as failed and routes the reason to the dead-letter channel.
    pub(crate) async fn fail(&self, guard: CaseGuard, reason: FailureReason) -> Result<()> {
        let key = guard.key().clone();
        if let Some(mut case) = self.store.remove(&guard).await {
            case.fail(reason.clone());
            debug!(key = %key, case = ?case, "closed failed case");
        }
        self.registry.take_for(&key);
        drop(guard);
        self.publisher.publish(Message::failed(key, reason))
    }

    pub(crate) fn discard_stale(key: &CorrelationKey, stage: Stage, event: &str) {
        warn!(key = %key, stage = ?stage, event, "out-of-order event, discarding");
    }
}
