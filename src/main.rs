use clap::{Parser, ValueEnum};
use cp_adapter::application::adapter::{Adapter, Collaborators};
use cp_adapter::config::AdapterConfig;
use cp_adapter::domain::ports::{
    CatalogServiceArc, NegotiationObservableArc, NegotiationServiceArc, ReceiverRegistryArc,
    TransferServiceArc,
};
use cp_adapter::domain::protocol::AssetId;
use cp_adapter::infrastructure::loopback::LoopbackProvider;
use cp_adapter::interfaces::csv::outcome_writer::{OutcomeRecord, OutcomeWriter};
use cp_adapter::interfaces::csv::request_reader::RequestReader;
use cp_adapter::telemetry;
use miette::{IntoDiagnostic, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Csv,
    Json,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input requests CSV file (`key,asset,provider`)
    input: PathBuf,

    /// Optional TOML configuration file
    #[arg(long, env = "CP_ADAPTER_CONFIG")]
    config: Option<PathBuf>,

    /// Assets the simulated provider offers. Every asset when omitted.
    #[arg(long, value_delimiter = ',')]
    catalog: Vec<String>,

    /// Assets whose negotiation the simulated provider declines
    #[arg(long, value_delimiter = ',')]
    decline: Vec<String>,

    /// Assets whose negotiation the simulated provider never answers
    #[arg(long, value_delimiter = ',')]
    silent: Vec<String>,

    /// Delay before each simulated provider callback
    #[arg(long, default_value_t = 5)]
    latency_ms: u64,

    /// How long to wait for each outcome
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    #[arg(long, value_enum, default_value_t = Format::Csv)]
    format: Format,
}

fn assets(names: Vec<String>) -> impl Iterator<Item = AssetId> {
    names.into_iter().map(AssetId::new)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AdapterConfig::load(cli.config.as_deref()).into_diagnostic()?;
    telemetry::init(&config.logging);

    let mut provider = LoopbackProvider::new(Duration::from_millis(cli.latency_ms))
        .with_declined(assets(cli.decline))
        .with_silent(assets(cli.silent));
    if !cli.catalog.is_empty() {
        provider = provider.with_catalog(assets(cli.catalog));
    }
    let provider = Arc::new(provider);

    let catalog: CatalogServiceArc = provider.clone();
    let negotiation: NegotiationServiceArc = provider.clone();
    let transfer: TransferServiceArc = provider.clone();
    let observable: NegotiationObservableArc = provider.clone();
    let receivers: ReceiverRegistryArc = provider;
    let adapter = Adapter::start(
        &config,
        Collaborators {
            catalog,
            negotiation,
            transfer,
            negotiation_observable: Some(observable),
            receiver_registry: Some(receivers),
        },
    )
    .into_diagnostic()?;

    // Submit everything first so cases run concurrently
    let file = File::open(cli.input).into_diagnostic()?;
    let reader = RequestReader::new(file);
    let mut keys = Vec::new();
    let mut seen = HashSet::new();
    for request_result in reader.requests() {
        match request_result {
            Ok(request) => {
                let key = request.key.clone();
                if let Err(e) = adapter.submit(request) {
                    eprintln!("Error submitting request {}: {}", key, e);
                    continue;
                }
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
            Err(e) => {
                eprintln!("Error reading request: {}", e);
            }
        }
    }

    let stdout = io::stdout();
    let mut writer = match cli.format {
        Format::Csv => OutcomeWriter::csv(stdout.lock()),
        Format::Json => OutcomeWriter::json(stdout.lock()),
    };
    let timeout = Duration::from_secs(cli.timeout_secs);
    for key in &keys {
        let status = adapter.wait_for(key, timeout).await;
        writer
            .write(&OutcomeRecord::new(key, &status))
            .into_diagnostic()?;
    }
    writer.flush().into_diagnostic()?;

    adapter.shutdown().await;
    Ok(())
}
