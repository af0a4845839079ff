use super::StageContext;
use crate::domain::case::Stage;
use crate::domain::message::{FailureReason, Message, Payload};
use crate::domain::ports::TransferServiceArc;
use crate::domain::protocol::{CORRELATION_PROPERTY, TransferDestination, TransferRequest};
use crate::error::{AdapterError, Result};
use crate::messaging::MessageHandler;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Turns a confirmed negotiation into a transfer request.
pub struct ConfirmationHandler {
    ctx: StageContext,
    transfer: TransferServiceArc,
    destination_type: String,
}

impl ConfirmationHandler {
    pub fn new(
        ctx: StageContext,
        transfer: TransferServiceArc,
        destination_type: impl Into<String>,
    ) -> Self {
        Self {
            ctx,
            transfer,
            destination_type: destination_type.into(),
        }
    }
}

#[async_trait]
impl MessageHandler for ConfirmationHandler {
    async fn handle(&self, message: Message) -> Result<()> {
        let Payload::ContractConfirmed {
            negotiation_id,
            contract_id,
        } = message.payload
        else {
            warn!(key = %message.key, "unexpected payload on confirmation channel");
            return Ok(());
        };
        let key = message.key;
        let guard = self.ctx.store.acquire(&key).await;

        let Some(mut case) = self.ctx.live_case(&guard, "contract confirmed").await else {
            return Ok(());
        };
        // The accepted notification is bookkeeping only, so it may never have arrived.
        if !matches!(case.stage, Stage::Started | Stage::Negotiating)
            || case.data.negotiation_id.as_ref() != Some(&negotiation_id)
        {
            StageContext::discard_stale(&key, case.stage, "contract confirmed");
            return Ok(());
        }

        let record = self
            .ctx
            .registry
            .take_for(&key)
            .ok_or_else(|| AdapterError::PendingNotFound(key.clone()))?;

        let request = TransferRequest {
            contract_id: contract_id.clone(),
            asset_id: record.offer.asset_id,
            provider: record.offer.provider,
            destination: TransferDestination::new(&self.destination_type)
                .with_property(CORRELATION_PROPERTY, key.as_str()),
        };

        match self.transfer.initiate(&request).await {
            Ok(transfer_process_id) => {
                debug!(key = %key, contract = %contract_id, transfer = %transfer_process_id, "transfer initiated");
                case.data.contract_id = Some(contract_id);
                case.data.transfer_process_id = Some(transfer_process_id);
                case.advance(Stage::Confirmed);
                self.ctx.store.put(&guard, case).await;
                Ok(())
            }
            Err(err) => {
                self.ctx
                    .fail(guard, FailureReason::TransferFailed(err.to_string()))
                    .await
            }
        }
    }
}
