use crate::application::events::ProtocolEvents;
use crate::application::handlers::initial::OfferCache;
use crate::application::handlers::{
    ConfirmationHandler, DataReferenceHandler, InitialHandler, NegotiationHandler, StageContext,
};
use crate::application::results::{ErrorResultService, OutcomeBoard, ResultService, ResultStatus};
use crate::application::sweeper::Sweeper;
use crate::config::AdapterConfig;
use crate::domain::case::CorrelationKey;
use crate::domain::message::{Channel, Message, Payload};
use crate::domain::ports::{
    CatalogServiceArc, NegotiationObservableArc, NegotiationServiceArc, ReceiverRegistryArc,
    TransferServiceArc,
};
use crate::domain::protocol::DataRequest;
use crate::error::Result;
use crate::infrastructure::correlation_store::CorrelationStore;
use crate::infrastructure::pending::PendingCaseRegistry;
use crate::messaging::{ChannelBusBuilder, Publisher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// External services the adapter drives.
///
/// The observable and the receiver registry are optional: without them the
/// host delivers callbacks itself through [`Adapter::events`].
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: CatalogServiceArc,
    pub negotiation: NegotiationServiceArc,
    pub transfer: TransferServiceArc,
    pub negotiation_observable: Option<NegotiationObservableArc>,
    pub receiver_registry: Option<ReceiverRegistryArc>,
}

/// The main entry point of the crate.
///
/// `Adapter` owns the correlation store, the pending registry, the result sinks
/// and the bus for as long as it runs. A caller submits a [`DataRequest`] and
/// later polls or waits for its outcome by correlation key; everything in
/// between is driven by collaborator callbacks.
pub struct Adapter {
    store: Arc<CorrelationStore>,
    registry: Arc<PendingCaseRegistry>,
    board: Arc<OutcomeBoard>,
    publisher: Publisher,
    events: ProtocolEvents,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Adapter {
    /// Builds and validates the channel bindings, then starts the bus and the sweeper.
    ///
    /// Must be called from within a Tokio runtime. A binding error aborts startup.
    pub fn start(config: &AdapterConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(CorrelationStore::new(config.case_ttl()));
        let registry = Arc::new(PendingCaseRegistry::new());
        let board = Arc::new(OutcomeBoard::new(config.result_ttl()));
        let offers = Arc::new(OfferCache::new(config.offer_cache_ttl()));

        let mut builder = ChannelBusBuilder::new();
        let publisher = builder.publisher();
        let ctx = StageContext::new(store.clone(), registry.clone(), publisher.clone());

        builder.register(
            Channel::Initial,
            Arc::new(InitialHandler::new(
                ctx.clone(),
                collaborators.catalog.clone(),
                collaborators.negotiation.clone(),
                offers.clone(),
            )),
        )?;
        builder.register(
            Channel::ContractNegotiation,
            Arc::new(NegotiationHandler::new(ctx.clone())),
        )?;
        builder.register(
            Channel::ContractConfirmation,
            Arc::new(ConfirmationHandler::new(
                ctx.clone(),
                collaborators.transfer.clone(),
                config.transfer.destination_type.clone(),
            )),
        )?;
        builder.register(
            Channel::DataReference,
            Arc::new(DataReferenceHandler::new(ctx)),
        )?;
        builder.register(Channel::Result, Arc::new(ResultService::new(board.clone())))?;
        builder.register(
            Channel::Dlq,
            Arc::new(ErrorResultService::new(
                board.clone(),
                store.clone(),
                registry.clone(),
            )),
        )?;
        let bus = builder.build()?;

        let events = ProtocolEvents::new(registry.clone(), publisher.clone());
        if let Some(observable) = &collaborators.negotiation_observable {
            observable.register_listener(Arc::new(events.clone()));
        }
        if let Some(receivers) = &collaborators.receiver_registry {
            receivers.register_receiver(Arc::new(events.clone()));
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let sweeper = Sweeper::new(
            store.clone(),
            registry.clone(),
            board.clone(),
            offers,
            publisher.clone(),
            config.parked_event_ttl(),
        );
        let tasks = vec![
            bus.spawn(shutdown_rx.clone()),
            sweeper.spawn(config.sweep_interval(), shutdown_rx),
        ];

        info!(
            case_ttl_secs = config.case_ttl_secs,
            destination = %config.transfer.destination_type,
            "adapter started"
        );
        Ok(Self {
            store,
            registry,
            board,
            publisher,
            events,
            shutdown,
            tasks,
        })
    }

    /// Publishes the request on the initial channel and returns immediately.
    pub fn submit(&self, request: DataRequest) -> Result<()> {
        debug!(key = %request.key, asset = %request.asset_id, "request submitted");
        self.publisher.publish(Message::new(
            Channel::Initial,
            request.key,
            Payload::Request {
                asset_id: request.asset_id,
                provider: request.provider,
            },
        ))
    }

    /// Returns the outcome for `key`, consuming it if it is terminal.
    pub fn get_result(&self, key: &CorrelationKey) -> ResultStatus {
        self.board.take(key).into()
    }

    /// Waits up to `timeout` for the outcome of `key`.
    pub async fn wait_for(&self, key: &CorrelationKey, timeout: Duration) -> ResultStatus {
        self.board.wait_for(key, timeout).await.into()
    }

    /// Submits `request` and waits up to `timeout` for its outcome.
    pub async fn fetch(&self, request: DataRequest, timeout: Duration) -> Result<ResultStatus> {
        let key = request.key.clone();
        self.submit(request)?;
        Ok(self.wait_for(&key, timeout).await)
    }

    /// Handle for delivering collaborator callbacks by hand.
    pub fn events(&self) -> ProtocolEvents {
        self.events.clone()
    }

    pub fn store(&self) -> &CorrelationStore {
        &self.store
    }

    pub fn registry(&self) -> &PendingCaseRegistry {
        &self.registry
    }

    /// Stops the bus and the sweeper. Cases still in flight are dropped.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        join_tasks(self.tasks).await;
        info!("adapter stopped");
    }
}

/// Waits for every task, logging the ones that panicked or were cancelled.
/// Returns how many did not finish cleanly.
async fn join_tasks(tasks: Vec<JoinHandle<()>>) -> usize {
    let mut failed = 0;
    for task in tasks {
        if let Err(err) = task.await {
            error!(error = %err, "background task ended abnormally");
            failed += 1;
        }
    }
    failed
}
