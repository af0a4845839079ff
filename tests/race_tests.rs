mod common;

use common::*;
use cp_adapter::application::events::ProtocolEvents;
use cp_adapter::application::handlers::initial::OfferCache;
use cp_adapter::application::handlers::{
    ConfirmationHandler, DataReferenceHandler, InitialHandler, NegotiationHandler, StageContext,
};
use cp_adapter::application::results::OutcomeBoard;
use cp_adapter::application::sweeper::Sweeper;
use cp_adapter::domain::case::{CorrelationKey, Stage};
use cp_adapter::domain::message::{Channel, Message, Payload};
use cp_adapter::domain::ports::{DataReferenceReceiver, NegotiationListener};
use cp_adapter::domain::protocol::{AssetId, ContractId, NegotiationId};
use cp_adapter::infrastructure::correlation_store::CorrelationStore;
use cp_adapter::infrastructure::pending::PendingCaseRegistry;
use cp_adapter::messaging::{ChannelBusBuilder, Publisher};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// The stage handlers on a real bus, with recording sinks in place of the result services.
struct Rig {
    store: Arc<CorrelationStore>,
    registry: Arc<PendingCaseRegistry>,
    sweeper: Arc<Sweeper>,
    publisher: Publisher,
    events: ProtocolEvents,
    transfer: Arc<RecordingTransfer>,
    results: Arc<RecordingSink>,
    dlq: Arc<RecordingSink>,
    _shutdown: watch::Sender<bool>,
}

impl Rig {
    fn new(case_ttl: Duration) -> Self {
        let store = Arc::new(CorrelationStore::new(case_ttl));
        let registry = Arc::new(PendingCaseRegistry::new());
        let board = Arc::new(OutcomeBoard::new(Duration::from_secs(60)));
        let offers = Arc::new(OfferCache::new(Duration::from_secs(60)));
        let transfer = Arc::new(RecordingTransfer::default());
        let results = Arc::new(RecordingSink::default());
        let dlq = Arc::new(RecordingSink::default());

        let mut builder = ChannelBusBuilder::new();
        let publisher = builder.publisher();
        let ctx = StageContext::new(store.clone(), registry.clone(), publisher.clone());
        builder
            .register(
                Channel::Initial,
                Arc::new(InitialHandler::new(
                    ctx.clone(),
                    Arc::new(StaticCatalog::default()),
                    Arc::new(RecordingNegotiation::default()),
                    offers.clone(),
                )),
            )
            .unwrap();
        builder
            .register(
                Channel::ContractNegotiation,
                Arc::new(NegotiationHandler::new(ctx.clone())),
            )
            .unwrap();
        builder
            .register(
                Channel::ContractConfirmation,
                Arc::new(ConfirmationHandler::new(ctx.clone(), transfer.clone(), "HttpProxy")),
            )
            .unwrap();
        builder
            .register(Channel::DataReference, Arc::new(DataReferenceHandler::new(ctx)))
            .unwrap();
        builder.register(Channel::Result, results.clone()).unwrap();
        builder.register(Channel::Dlq, dlq.clone()).unwrap();
        let bus = builder.build().unwrap();

        let (shutdown, shutdown_rx) = watch::channel(false);
        bus.spawn(shutdown_rx);

        let sweeper = Arc::new(Sweeper::new(
            store.clone(),
            registry.clone(),
            board,
            offers,
            publisher.clone(),
            Duration::from_secs(30),
        ));
        let events = ProtocolEvents::new(registry.clone(), publisher.clone());
        Self {
            store,
            registry,
            sweeper,
            publisher,
            events,
            transfer,
            results,
            dlq,
            _shutdown: shutdown,
        }
    }

    fn submit(&self, key: &CorrelationKey) {
        self.publisher
            .publish(Message::new(
                Channel::Initial,
                key.clone(),
                Payload::Request {
                    asset_id: AssetId::new("a1"),
                    provider: PROVIDER.to_string(),
                },
            ))
            .unwrap();
    }

    fn terminal_count(&self, key: &CorrelationKey) -> usize {
        self.results.count_for(key) + self.dlq.count_for(key)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_confirmation_racing_sweep_terminates_once() {
    let rig = Rig::new(Duration::from_millis(20));
    let keys: Vec<CorrelationKey> = (0..50)
        .map(|i| CorrelationKey::new(format!("k{i}")))
        .collect();

    for key in &keys {
        rig.submit(key);
    }
    eventually(|| async { rig.store.len().await == keys.len() }).await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    let mut callbacks = Vec::new();
    for key in &keys {
        let case = rig.store.get(key).await.unwrap();
        callbacks.push((key.clone(), case.data.negotiation_id.unwrap()));
    }
    callbacks.shuffle(&mut rand::thread_rng());

    let sweeper = rig.sweeper.clone();
    let sweep = tokio::spawn(async move { sweeper.sweep().await });
    for (key, negotiation_id) in &callbacks {
        rig.events
            .on_confirmed(negotiation_id, &ContractId::new(format!("c-{key}")))
            .unwrap();
        rig.events
            .on_data_reference(key, reference(key.as_str()))
            .unwrap();
    }
    sweep.await.unwrap();

    // Confirmed cases whose reference was discarded are still past their TTL.
    eventually(|| async {
        rig.sweeper.sweep().await;
        rig.store.is_empty().await
    })
    .await;
    eventually(|| async { keys.iter().all(|key| rig.terminal_count(key) == 1) }).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    for key in &keys {
        assert_eq!(rig.terminal_count(key), 1, "{key} terminated more than once");
        assert!(!rig.registry.contains(key));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_confirmations_initiate_one_transfer() {
    let rig = Rig::new(Duration::from_secs(300));
    let key = CorrelationKey::new("k1");

    rig.submit(&key);
    eventually(|| async { rig.store.get(&key).await.is_some() }).await;
    let negotiation_id = rig.store.get(&key).await.unwrap().data.negotiation_id.unwrap();

    for _ in 0..20 {
        rig.events
            .on_confirmed(&negotiation_id, &ContractId::new("c1"))
            .unwrap();
    }
    eventually(|| async {
        rig.store.get(&key).await.map(|case| case.stage) == Some(Stage::Confirmed)
    })
    .await;

    // Redelivery after the record was consumed is dropped, not parked.
    for _ in 0..5 {
        rig.events
            .on_confirmed(&negotiation_id, &ContractId::new("c1"))
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(rig.transfer.calls(), 1);
    assert_eq!(rig.registry.parked_len(), 0);
    assert_eq!(
        rig.store.get(&key).await.map(|case| case.stage),
        Some(Stage::Confirmed)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_confirmation_without_live_case_changes_nothing() {
    let rig = Rig::new(Duration::from_secs(300));
    let unknown = CorrelationKey::new("never-started");

    rig.publisher
        .publish(Message::new(
            Channel::ContractConfirmation,
            unknown.clone(),
            Payload::ContractConfirmed {
                negotiation_id: NegotiationId::new("neg-x"),
                contract_id: ContractId::new("c-x"),
            },
        ))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(rig.transfer.calls(), 0);
    assert!(rig.store.is_empty().await);
    assert!(!rig.registry.contains(&unknown));
    assert_eq!(rig.registry.parked_len(), 0);
    assert_eq!(rig.terminal_count(&unknown), 0);

    // Same for a key whose case already completed.
    let key = CorrelationKey::new("k1");
    rig.submit(&key);
    eventually(|| async { rig.store.get(&key).await.is_some() }).await;
    let negotiation_id = rig.store.get(&key).await.unwrap().data.negotiation_id.unwrap();
    rig.events
        .on_confirmed(&negotiation_id, &ContractId::new("c1"))
        .unwrap();
    eventually(|| async {
        rig.store.get(&key).await.map(|case| case.stage) == Some(Stage::Confirmed)
    })
    .await;
    rig.events.on_data_reference(&key, reference("k1")).unwrap();
    eventually(|| async { rig.results.count_for(&key) == 1 }).await;

    rig.publisher
        .publish(Message::new(
            Channel::ContractConfirmation,
            key.clone(),
            Payload::ContractConfirmed {
                negotiation_id,
                contract_id: ContractId::new("c1"),
            },
        ))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(rig.transfer.calls(), 1);
    assert!(rig.store.is_empty().await);
    assert!(!rig.registry.contains(&key));
    assert_eq!(rig.terminal_count(&key), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_references_complete_once() {
    let rig = Rig::new(Duration::from_secs(300));
    let key = CorrelationKey::new("k1");

    rig.submit(&key);
    eventually(|| async { rig.store.get(&key).await.is_some() }).await;
    let negotiation_id = rig.store.get(&key).await.unwrap().data.negotiation_id.unwrap();
    rig.events
        .on_confirmed(&negotiation_id, &ContractId::new("c1"))
        .unwrap();
    eventually(|| async {
        rig.store.get(&key).await.map(|case| case.stage) == Some(Stage::Confirmed)
    })
    .await;

    let mut deliveries: Vec<u8> = (0..10).collect();
    deliveries.shuffle(&mut rand::thread_rng());
    for n in deliveries {
        if n % 3 == 0 {
            rig.events.on_transfer_started(&key).unwrap();
        } else {
            rig.events.on_data_reference(&key, reference("k1")).unwrap();
        }
    }

    eventually(|| async { rig.results.count_for(&key) == 1 }).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(rig.terminal_count(&key), 1);
    assert!(rig.store.is_empty().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_keys_complete_independently() {
    let rig = Rig::new(Duration::from_secs(300));
    let keys: Vec<CorrelationKey> = (0..100)
        .map(|i| CorrelationKey::new(format!("key-{i}")))
        .collect();

    for key in &keys {
        rig.submit(key);
    }
    eventually(|| async { rig.store.len().await == keys.len() }).await;

    let mut order = keys.clone();
    order.shuffle(&mut rand::thread_rng());
    for key in &order {
        let negotiation_id = rig.store.get(key).await.unwrap().data.negotiation_id.unwrap();
        rig.events
            .on_confirmed(&negotiation_id, &ContractId::new(format!("c-{key}")))
            .unwrap();
    }
    eventually(|| async { rig.transfer.calls() == keys.len() }).await;
    eventually(|| async {
        let mut confirmed = true;
        for key in &keys {
            confirmed &= rig.store.get(key).await.map(|case| case.stage) == Some(Stage::Confirmed);
        }
        confirmed
    })
    .await;

    order.shuffle(&mut rand::thread_rng());
    for key in &order {
        rig.events.on_data_reference(key, reference(key.as_str())).unwrap();
    }
    eventually(|| async { keys.iter().all(|key| rig.results.count_for(key) == 1) }).await;

    assert!(rig.store.is_empty().await);
    assert!(rig.dlq.messages.lock().unwrap().is_empty());
    // Every transfer carried the key it was requested for.
    for request in rig.transfer.requests.lock().unwrap().iter() {
        let key = request.destination.correlation_key().unwrap();
        assert_eq!(request.contract_id.as_str(), format!("c-{key}"));
    }
}
