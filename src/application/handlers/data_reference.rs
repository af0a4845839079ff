use super::StageContext;
use crate::domain::case::Stage;
use crate::domain::message::{Channel, FailureReason, Message, Payload};
use crate::error::Result;
use crate::messaging::MessageHandler;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Closes a case once the provider reports on its transfer.
pub struct DataReferenceHandler {
    ctx: StageContext,
}

impl DataReferenceHandler {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl MessageHandler for DataReferenceHandler {
    async fn handle(&self, message: Message) -> Result<()> {
        let key = message.key;
        let guard = self.ctx.store.acquire(&key).await;

        match message.payload {
            Payload::TransferStarted => {
                let Some(mut case) = self.ctx.live_case(&guard, "transfer started").await else {
                    return Ok(());
                };
                if case.stage != Stage::Confirmed {
                    StageContext::discard_stale(&key, case.stage, "transfer started");
                    return Ok(());
                }
                case.advance(Stage::Transferring);
                self.ctx.store.put(&guard, case).await;
                Ok(())
            }
            Payload::DataReference(reference) => {
                let Some(case) = self.ctx.live_case(&guard, "data reference").await else {
                    return Ok(());
                };
                if !matches!(case.stage, Stage::Confirmed | Stage::Transferring) {
                    StageContext::discard_stale(&key, case.stage, "data reference");
                    return Ok(());
                }
                self.ctx.store.remove(&guard).await;
                drop(guard);
                debug!(key = %key, reference = %reference.id, "data reference received");
                self.ctx.publisher.publish(Message::new(
                    Channel::Result,
                    key,
                    Payload::Completed(reference),
                ))
            }
            Payload::TransferFailed { reason } => {
                if self.ctx.live_case(&guard, "transfer failed").await.is_none() {
                    return Ok(());
                }
                self.ctx
                    .fail(guard, FailureReason::TransferFailed(reason))
                    .await
            }
            other => {
                warn!(key = %key, payload = ?other, "unexpected payload on data reference channel");
                Ok(())
            }
        }
    }
}
