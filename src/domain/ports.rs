use super::case::CorrelationKey;
use super::protocol::{
    AssetId, ContractId, ContractOffer, DataReference, NegotiationId, TransferProcessId,
    TransferRequest,
};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn resolve_offer(&self, provider: &str, asset_id: &AssetId) -> Result<ContractOffer>;
}

#[async_trait]
pub trait NegotiationService: Send + Sync {
    async fn initiate(&self, offer: &ContractOffer) -> Result<NegotiationId>;
}

#[async_trait]
pub trait TransferService: Send + Sync {
    async fn initiate(&self, request: &TransferRequest) -> Result<TransferProcessId>;
}

/// Out-of-band notifications about negotiations, delivered at least once and in no
/// particular order.
pub trait NegotiationListener: Send + Sync {
    fn on_accepted(&self, negotiation_id: &NegotiationId) -> Result<()>;
    fn on_confirmed(&self, negotiation_id: &NegotiationId, contract_id: &ContractId) -> Result<()>;
    fn on_failed(&self, negotiation_id: &NegotiationId, reason: &str) -> Result<()>;
}

/// Callbacks about transfers, correlated by the key carried in the transfer destination.
pub trait DataReferenceReceiver: Send + Sync {
    fn on_transfer_started(&self, key: &CorrelationKey) -> Result<()>;
    fn on_data_reference(&self, key: &CorrelationKey, reference: DataReference) -> Result<()>;
    fn on_transfer_failed(&self, key: &CorrelationKey, reason: &str) -> Result<()>;
}

pub trait NegotiationObservable: Send + Sync {
    fn register_listener(&self, listener: Arc<dyn NegotiationListener>);
}

pub trait DataReferenceReceiverRegistry: Send + Sync {
    fn register_receiver(&self, receiver: Arc<dyn DataReferenceReceiver>);
}

pub type CatalogServiceArc = Arc<dyn CatalogService>;
pub type NegotiationServiceArc = Arc<dyn NegotiationService>;
pub type TransferServiceArc = Arc<dyn TransferService>;
pub type NegotiationObservableArc = Arc<dyn NegotiationObservable>;
pub type ReceiverRegistryArc = Arc<dyn DataReferenceReceiverRegistry>;
