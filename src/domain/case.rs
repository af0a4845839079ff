use crate::domain::message::FailureReason;
use crate::domain::protocol::{AssetId, ContractId, NegotiationId, TransferProcessId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Opaque identifier chosen by whoever starts a case.
///
/// It ties together every message and callback that belongs to one logical
/// request, from the initial submission to the terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationKey(String);

impl CorrelationKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Started,
    Negotiating,
    Confirmed,
    Transferring,
    Completed,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }
}

/// Protocol data accumulated by a case as it moves through the stages.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CaseData {
    pub asset_id: Option<AssetId>,
    pub provider: Option<String>,
    pub negotiation_id: Option<NegotiationId>,
    pub contract_id: Option<ContractId>,
    pub transfer_process_id: Option<TransferProcessId>,
}

/// Live state of one correlation key.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub key: CorrelationKey,
    pub stage: Stage,
    pub data: CaseData,
    pub created_at: Instant,
    pub error: Option<FailureReason>,
}

impl Case {
    pub fn new(key: CorrelationKey, data: CaseData) -> Self {
        Self {
            key,
            stage: Stage::Started,
            data,
            created_at: Instant::now(),
            error: None,
        }
    }

    pub fn advance(&mut self, stage: Stage) {
        self.stage = stage;
    }

    /// Marks the case failed; the caller is expected to remove it from the store.
    pub fn fail(&mut self, reason: FailureReason) {
        self.stage = Stage::Failed;
        self.error = Some(reason);
    }

    pub fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= ttl
    }
}
