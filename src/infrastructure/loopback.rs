use crate::domain::ports::{
    CatalogService, DataReferenceReceiver, DataReferenceReceiverRegistry, NegotiationListener,
    NegotiationObservable, NegotiationService, TransferService,
};
use crate::domain::protocol::{
    AssetId, CORRELATION_PROPERTY, ContractId, ContractOffer, DataReference, NegotiationId,
    TransferProcessId, TransferRequest,
};
use crate::error::{AdapterError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

/// In-process stand-in for a remote provider connector.
///
/// It answers every collaborator port the adapter needs and replays the
/// provider's side of the protocol through the registered listeners after a
/// fixed latency. Assets can be marked as declined (the negotiation fails) or
/// silent (the negotiation is never answered).
pub struct LoopbackProvider {
    catalog: Option<HashSet<AssetId>>,
    declined: HashSet<AssetId>,
    silent: HashSet<AssetId>,
    latency: Duration,
    sequence: AtomicU64,
    negotiations: OnceLock<Arc<dyn NegotiationListener>>,
    receivers: OnceLock<Arc<dyn DataReferenceReceiver>>,
}

impl LoopbackProvider {
    /// A provider that offers every asset it is asked about.
    pub fn new(latency: Duration) -> Self {
        Self {
            catalog: None,
            declined: HashSet::new(),
            silent: HashSet::new(),
            latency,
            sequence: AtomicU64::new(0),
            negotiations: OnceLock::new(),
            receivers: OnceLock::new(),
        }
    }

    /// Restricts the catalog to the given assets.
    pub fn with_catalog(mut self, assets: impl IntoIterator<Item = AssetId>) -> Self {
        self.catalog = Some(assets.into_iter().collect());
        self
    }

    pub fn with_declined(mut self, assets: impl IntoIterator<Item = AssetId>) -> Self {
        self.declined.extend(assets);
        self
    }

    pub fn with_silent(mut self, assets: impl IntoIterator<Item = AssetId>) -> Self {
        self.silent.extend(assets);
        self
    }

    fn next_id(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn offers(&self, asset_id: &AssetId) -> bool {
        self.catalog
            .as_ref()
            .is_none_or(|catalog| catalog.contains(asset_id))
    }
}

#[async_trait]
impl CatalogService for LoopbackProvider {
    async fn resolve_offer(&self, provider: &str, asset_id: &AssetId) -> Result<ContractOffer> {
        if !self.offers(asset_id) {
            return Err(AdapterError::Collaborator(format!(
                "asset {asset_id} not offered by {provider}"
            )));
        }
        Ok(ContractOffer {
            id: format!("offer-{asset_id}"),
            asset_id: asset_id.clone(),
            provider: provider.to_string(),
        })
    }
}

#[async_trait]
impl NegotiationService for LoopbackProvider {
    async fn initiate(&self, offer: &ContractOffer) -> Result<NegotiationId> {
        let n = self.next_id();
        let negotiation_id = NegotiationId::new(format!("neg-{n}"));
        if self.silent.contains(&offer.asset_id) {
            debug!(negotiation = %negotiation_id, "silent asset, never answering");
            return Ok(negotiation_id);
        }
        let Some(listener) = self.negotiations.get().cloned() else {
            warn!(negotiation = %negotiation_id, "no negotiation listener registered");
            return Ok(negotiation_id);
        };

        let declined = self.declined.contains(&offer.asset_id);
        let latency = self.latency;
        let id = negotiation_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            let delivered = if declined {
                listener.on_failed(&id, "provider declined the offer")
            } else {
                listener
                    .on_accepted(&id)
                    .and_then(|()| listener.on_confirmed(&id, &ContractId::new(format!("contract-{n}"))))
            };
            if let Err(err) = delivered {
                warn!(negotiation = %id, error = %err, "negotiation callback not delivered");
            }
        });
        Ok(negotiation_id)
    }
}

#[async_trait]
impl TransferService for LoopbackProvider {
    async fn initiate(&self, request: &TransferRequest) -> Result<TransferProcessId> {
        let key = request
            .destination
            .correlation_key()
            .ok_or_else(|| AdapterError::Collaborator("destination carries no cid".to_string()))?;
        let n = self.next_id();
        let transfer_id = TransferProcessId::new(format!("tp-{n}"));
        let Some(receiver) = self.receivers.get().cloned() else {
            warn!(transfer = %transfer_id, "no data reference receiver registered");
            return Ok(transfer_id);
        };

        let reference = DataReference {
            id: format!("edr-{n}"),
            endpoint: format!("{}/public/{}", request.provider, request.asset_id),
            auth_key: "Authorization".to_string(),
            auth_code: format!("token-{n}"),
            properties: BTreeMap::from([(CORRELATION_PROPERTY.to_string(), key.to_string())]),
        };
        let latency = self.latency;
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            let delivered = receiver
                .on_transfer_started(&key)
                .and_then(|()| receiver.on_data_reference(&key, reference));
            if let Err(err) = delivered {
                warn!(key = %key, error = %err, "transfer callback not delivered");
            }
        });
        Ok(transfer_id)
    }
}

impl NegotiationObservable for LoopbackProvider {
    fn register_listener(&self, listener: Arc<dyn NegotiationListener>) {
        if self.negotiations.set(listener).is_err() {
            warn!("negotiation listener already registered");
        }
    }
}

impl DataReferenceReceiverRegistry for LoopbackProvider {
    fn register_receiver(&self, receiver: Arc<dyn DataReferenceReceiver>) {
        if self.receivers.set(receiver).is_err() {
            warn!("data reference receiver already registered");
        }
    }
}
