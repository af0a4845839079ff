use super::StageContext;
use crate::domain::case::{Case, CaseData, CorrelationKey};
use crate::domain::message::{Channel, FailureReason, Message, Payload};
use crate::domain::ports::{CatalogServiceArc, NegotiationServiceArc};
use crate::domain::protocol::{AssetId, ContractOffer};
use crate::error::Result;
use crate::infrastructure::expiring_map::ExpiringMap;
use crate::infrastructure::pending::PendingRecord;
use crate::messaging::MessageHandler;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

pub type OfferCache = ExpiringMap<(String, AssetId), ContractOffer>;

/// Starts a case: resolves the offer, initiates the negotiation and registers
/// the case together with its pending record.
pub struct InitialHandler {
    ctx: StageContext,
    catalog: CatalogServiceArc,
    negotiation: NegotiationServiceArc,
    offers: Arc<OfferCache>,
}

impl InitialHandler {
    pub fn new(
        ctx: StageContext,
        catalog: CatalogServiceArc,
        negotiation: NegotiationServiceArc,
        offers: Arc<OfferCache>,
    ) -> Self {
        Self {
            ctx,
            catalog,
            negotiation,
            offers,
        }
    }

    async fn offer_for(&self, provider: &str, asset_id: &AssetId) -> Result<ContractOffer> {
        let cache_key = (provider.to_string(), asset_id.clone());
        if let Some(offer) = self.offers.get(&cache_key) {
            debug!(asset = %asset_id, provider, "offer served from cache");
            return Ok(offer);
        }
        let offer = self.catalog.resolve_offer(provider, asset_id).await?;
        self.offers.insert(cache_key, offer.clone());
        Ok(offer)
    }

    fn reject(&self, key: CorrelationKey, reason: FailureReason) -> Result<()> {
        self.ctx.publisher.publish(Message::failed(key, reason))
    }
}

#[async_trait]
impl MessageHandler for InitialHandler {
    async fn handle(&self, message: Message) -> Result<()> {
        let Payload::Request { asset_id, provider } = message.payload else {
            warn!(key = %message.key, "unexpected payload on initial channel");
            return Ok(());
        };
        let key = message.key;
        let guard = self.ctx.store.acquire(&key).await;

        if let Some(existing) = self.ctx.store.get(&key).await {
            warn!(key = %key, stage = ?existing.stage, "key already has a live case, rejecting request");
            return Ok(());
        }

        let offer = match self.offer_for(&provider, &asset_id).await {
            Ok(offer) => offer,
            Err(err) => {
                drop(guard);
                return self.reject(key, FailureReason::OfferUnavailable(err.to_string()));
            }
        };

        let negotiation_id = match self.negotiation.initiate(&offer).await {
            Ok(negotiation_id) => negotiation_id,
            Err(err) => {
                drop(guard);
                return self.reject(key, FailureReason::NegotiationFailed(err.to_string()));
            }
        };

        let parked = self.ctx.registry.store(
            key.clone(),
            PendingRecord {
                offer,
                negotiation_id: negotiation_id.clone(),
            },
        )?;
        let data = CaseData {
            asset_id: Some(asset_id),
            provider: Some(provider),
            negotiation_id: Some(negotiation_id.clone()),
            ..CaseData::default()
        };
        self.ctx
            .store
            .register(&guard, Case::new(key.clone(), data))
            .await?;
        drop(guard);
        debug!(key = %key, negotiation = %negotiation_id, "case started");

        if let Some(contract_id) = parked {
            debug!(key = %key, negotiation = %negotiation_id, "replaying parked confirmation");
            self.ctx.publisher.publish(Message::new(
                Channel::ContractConfirmation,
                key,
                Payload::ContractConfirmed {
                    negotiation_id,
                    contract_id,
                },
            ))?;
        }
        Ok(())
    }
}
