use crate::domain::case::CorrelationKey;
use crate::domain::message::{Channel, Message, Payload};
use crate::domain::ports::{DataReferenceReceiver, NegotiationListener};
use crate::domain::protocol::{ContractId, DataReference, NegotiationId};
use crate::error::Result;
use crate::infrastructure::pending::{PendingCaseRegistry, Resolution};
use crate::messaging::Publisher;
use std::sync::Arc;
use tracing::{debug, warn};

/// Inbound side of the adapter: turns collaborator callbacks into bus messages.
///
/// Callbacks that only carry a negotiation id are correlated through the
/// pending registry. Delivery may be duplicated or reordered; the stage
/// handlers sort that out.
#[derive(Clone)]
pub struct ProtocolEvents {
    registry: Arc<PendingCaseRegistry>,
    publisher: Publisher,
}

impl ProtocolEvents {
    pub fn new(registry: Arc<PendingCaseRegistry>, publisher: Publisher) -> Self {
        Self {
            registry,
            publisher,
        }
    }

    fn route(&self, channel: Channel, key: CorrelationKey, payload: Payload) -> Result<()> {
        self.publisher.publish(Message::new(channel, key, payload))
    }
}

impl NegotiationListener for ProtocolEvents {
    fn on_accepted(&self, negotiation_id: &NegotiationId) -> Result<()> {
        let Some(key) = self.registry.key_for(negotiation_id) else {
            warn!(negotiation = %negotiation_id, "acceptance for unknown negotiation, discarding");
            return Ok(());
        };
        self.route(
            Channel::ContractNegotiation,
            key,
            Payload::NegotiationAccepted {
                negotiation_id: negotiation_id.clone(),
            },
        )
    }

    fn on_confirmed(&self, negotiation_id: &NegotiationId, contract_id: &ContractId) -> Result<()> {
        let key = match self.registry.resolve_or_park(negotiation_id, contract_id) {
            Resolution::Pending(key) => key,
            Resolution::Parked => {
                debug!(negotiation = %negotiation_id, "confirmation ahead of its negotiation, parked");
                return Ok(());
            }
            Resolution::Closed => {
                warn!(negotiation = %negotiation_id, "confirmation for closed negotiation, discarding");
                return Ok(());
            }
        };
        self.route(
            Channel::ContractConfirmation,
            key,
            Payload::ContractConfirmed {
                negotiation_id: negotiation_id.clone(),
                contract_id: contract_id.clone(),
            },
        )
    }

    fn on_failed(&self, negotiation_id: &NegotiationId, reason: &str) -> Result<()> {
        let Some(key) = self.registry.key_for(negotiation_id) else {
            warn!(negotiation = %negotiation_id, reason, "failure for unknown negotiation, discarding");
            return Ok(());
        };
        self.route(
            Channel::ContractNegotiation,
            key,
            Payload::NegotiationFailed {
                negotiation_id: negotiation_id.clone(),
                reason: reason.to_string(),
            },
        )
    }
}

impl DataReferenceReceiver for ProtocolEvents {
    fn on_transfer_started(&self, key: &CorrelationKey) -> Result<()> {
        self.route(Channel::DataReference, key.clone(), Payload::TransferStarted)
    }

    fn on_data_reference(&self, key: &CorrelationKey, reference: DataReference) -> Result<()> {
        self.route(
            Channel::DataReference,
            key.clone(),
            Payload::DataReference(reference),
        )
    }

    fn on_transfer_failed(&self, key: &CorrelationKey, reason: &str) -> Result<()> {
        self.route(
            Channel::DataReference,
            key.clone(),
            Payload::TransferFailed {
                reason: reason.to_string(),
            },
        )
    }
}
