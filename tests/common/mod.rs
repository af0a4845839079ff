#![allow(dead_code)]

use async_trait::async_trait;
use cp_adapter::application::adapter::{Adapter, Collaborators};
use cp_adapter::config::AdapterConfig;
use cp_adapter::domain::case::CorrelationKey;
use cp_adapter::domain::message::Message;
use cp_adapter::domain::ports::{CatalogService, NegotiationService, TransferService};
use cp_adapter::domain::protocol::{
    AssetId, ContractOffer, DataReference, DataRequest, NegotiationId, TransferProcessId,
    TransferRequest,
};
use cp_adapter::error::{AdapterError, Result};
use cp_adapter::messaging::MessageHandler;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PROVIDER: &str = "http://provider";

/// Catalog that offers every asset except the ones listed as missing.
#[derive(Default)]
pub struct StaticCatalog {
    missing: HashSet<AssetId>,
    pub lookups: AtomicUsize,
}

impl StaticCatalog {
    pub fn without(assets: &[&str]) -> Self {
        Self {
            missing: assets.iter().map(|a| AssetId::new(*a)).collect(),
            lookups: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CatalogService for StaticCatalog {
    async fn resolve_offer(&self, provider: &str, asset_id: &AssetId) -> Result<ContractOffer> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.missing.contains(asset_id) {
            return Err(AdapterError::Collaborator(format!("no offer for {asset_id}")));
        }
        Ok(ContractOffer {
            id: format!("offer-{asset_id}"),
            asset_id: asset_id.clone(),
            provider: provider.to_string(),
        })
    }
}

/// Negotiation service handing out `neg-1`, `neg-2`, ... and remembering every offer.
#[derive(Default)]
pub struct RecordingNegotiation {
    sequence: AtomicU64,
    pub offers: Mutex<Vec<ContractOffer>>,
}

#[async_trait]
impl NegotiationService for RecordingNegotiation {
    async fn initiate(&self, offer: &ContractOffer) -> Result<NegotiationId> {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.offers.lock().unwrap().push(offer.clone());
        Ok(NegotiationId::new(format!("neg-{n}")))
    }
}

impl RecordingNegotiation {
    pub fn calls(&self) -> usize {
        self.offers.lock().unwrap().len()
    }
}

#[derive(Default)]
pub struct RecordingTransfer {
    fail: bool,
    pub requests: Mutex<Vec<TransferRequest>>,
}

impl RecordingTransfer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl TransferService for RecordingTransfer {
    async fn initiate(&self, request: &TransferRequest) -> Result<TransferProcessId> {
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };
        if self.fail {
            return Err(AdapterError::Collaborator("connector unreachable".to_string()));
        }
        Ok(TransferProcessId::new(format!("tp-{n}")))
    }
}

/// Bus sink that keeps every message it receives.
#[derive(Default)]
pub struct RecordingSink {
    pub messages: Mutex<Vec<Message>>,
}

impl RecordingSink {
    pub fn count_for(&self, key: &CorrelationKey) -> usize {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| &m.key == key)
            .count()
    }
}

#[async_trait]
impl MessageHandler for RecordingSink {
    async fn handle(&self, message: Message) -> Result<()> {
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

pub struct Harness {
    pub adapter: Adapter,
    pub catalog: Arc<StaticCatalog>,
    pub negotiation: Arc<RecordingNegotiation>,
    pub transfer: Arc<RecordingTransfer>,
}

pub fn config(case_ttl_secs: u64, sweep_interval_ms: u64) -> AdapterConfig {
    AdapterConfig {
        case_ttl_secs,
        sweep_interval_ms,
        ..AdapterConfig::default()
    }
}

pub fn start(config: &AdapterConfig) -> Harness {
    start_with(config, StaticCatalog::default(), RecordingTransfer::default())
}

/// Starts an adapter whose callbacks are delivered by hand through `Adapter::events`.
pub fn start_with(
    config: &AdapterConfig,
    catalog: StaticCatalog,
    transfer: RecordingTransfer,
) -> Harness {
    let catalog = Arc::new(catalog);
    let negotiation = Arc::new(RecordingNegotiation::default());
    let transfer = Arc::new(transfer);
    let adapter = Adapter::start(
        config,
        Collaborators {
            catalog: catalog.clone(),
            negotiation: negotiation.clone(),
            transfer: transfer.clone(),
            negotiation_observable: None,
            receiver_registry: None,
        },
    )
    .unwrap();
    Harness {
        adapter,
        catalog,
        negotiation,
        transfer,
    }
}

pub fn request(key: &str, asset: &str) -> DataRequest {
    DataRequest {
        key: CorrelationKey::new(key),
        asset_id: AssetId::new(asset),
        provider: PROVIDER.to_string(),
    }
}

pub fn reference(key: &str) -> DataReference {
    DataReference {
        id: format!("edr-{key}"),
        endpoint: format!("{PROVIDER}/public"),
        auth_key: "Authorization".to_string(),
        auth_code: "secret".to_string(),
        properties: BTreeMap::from([("cid".to_string(), key.to_string())]),
    }
}

/// Polls `condition` until it holds, panicking after two seconds.
pub async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
