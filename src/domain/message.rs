use crate::domain::case::CorrelationKey;
use crate::domain::protocol::{AssetId, ContractId, DataReference, NegotiationId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The closed set of topics on the internal bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Initial,
    ContractNegotiation,
    ContractConfirmation,
    DataReference,
    Result,
    Dlq,
}

impl Channel {
    pub const ALL: [Channel; 6] = [
        Channel::Initial,
        Channel::ContractNegotiation,
        Channel::ContractConfirmation,
        Channel::DataReference,
        Channel::Result,
        Channel::Dlq,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Initial => "initial",
            Channel::ContractNegotiation => "contract-negotiation",
            Channel::ContractConfirmation => "contract-confirmation",
            Channel::DataReference => "data-reference",
            Channel::Result => "result",
            Channel::Dlq => "dlq",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a case ended without a data reference.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    #[error("timeout")]
    Timeout,
    #[error("offer unavailable: {0}")]
    OfferUnavailable(String),
    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),
    #[error("transfer failed: {0}")]
    TransferFailed(String),
    #[error("internal: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Request {
        asset_id: AssetId,
        provider: String,
    },
    NegotiationAccepted {
        negotiation_id: NegotiationId,
    },
    NegotiationFailed {
        negotiation_id: NegotiationId,
        reason: String,
    },
    ContractConfirmed {
        negotiation_id: NegotiationId,
        contract_id: ContractId,
    },
    TransferStarted,
    DataReference(DataReference),
    TransferFailed {
        reason: String,
    },
    Completed(DataReference),
    /// The case was already closed by the stage that failed it.
    Failed(FailureReason),
    /// A handler faulted; the case may still be live.
    Fault(String),
}

impl Payload {
    fn status(&self) -> MessageStatus {
        match self {
            Payload::NegotiationFailed { .. }
            | Payload::TransferFailed { .. }
            | Payload::Failed(_)
            | Payload::Fault(_) => MessageStatus::Error,
            _ => MessageStatus::Ok,
        }
    }
}

/// Unit of transport on the bus, consumed once by the handler bound to `channel`.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub key: CorrelationKey,
    pub channel: Channel,
    pub payload: Payload,
    pub status: MessageStatus,
}

impl Message {
    pub fn new(channel: Channel, key: CorrelationKey, payload: Payload) -> Self {
        let status = payload.status();
        Self {
            key,
            channel,
            payload,
            status,
        }
    }

    pub fn failed(key: CorrelationKey, reason: FailureReason) -> Self {
        Self::new(Channel::Dlq, key, Payload::Failed(reason))
    }

    pub fn fault(key: CorrelationKey, error: impl Into<String>) -> Self {
        Self::new(Channel::Dlq, key, Payload::Fault(error.into()))
    }
}
