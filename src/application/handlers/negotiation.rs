use super::StageContext;
use crate::domain::case::Stage;
use crate::domain::message::{FailureReason, Message, Payload};
use crate::error::Result;
use crate::messaging::MessageHandler;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Tracks the remote party's answer to a started negotiation.
pub struct NegotiationHandler {
    ctx: StageContext,
}

impl NegotiationHandler {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl MessageHandler for NegotiationHandler {
    async fn handle(&self, message: Message) -> Result<()> {
        let key = message.key;
        let guard = self.ctx.store.acquire(&key).await;

        match message.payload {
            Payload::NegotiationAccepted { negotiation_id } => {
                let Some(mut case) = self.ctx.live_case(&guard, "negotiation accepted").await else {
                    return Ok(());
                };
                if case.stage != Stage::Started
                    || case.data.negotiation_id.as_ref() != Some(&negotiation_id)
                {
                    StageContext::discard_stale(&key, case.stage, "negotiation accepted");
                    return Ok(());
                }
                case.advance(Stage::Negotiating);
                self.ctx.store.put(&guard, case).await;
                debug!(key = %key, negotiation = %negotiation_id, "negotiation accepted");
                Ok(())
            }
            Payload::NegotiationFailed {
                negotiation_id,
                reason,
            } => {
                let Some(case) = self.ctx.live_case(&guard, "negotiation failed").await else {
                    return Ok(());
                };
                if case.data.negotiation_id.as_ref() != Some(&negotiation_id) {
                    StageContext::discard_stale(&key, case.stage, "negotiation failed");
                    return Ok(());
                }
                self.ctx
                    .fail(guard, FailureReason::NegotiationFailed(reason))
                    .await
            }
            other => {
                warn!(key = %key, payload = ?other, "unexpected payload on negotiation channel");
                Ok(())
            }
        }
    }
}
