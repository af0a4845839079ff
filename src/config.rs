use crate::error::{AdapterError, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Adapter configuration.
///
/// Loaded from built-in defaults, then an optional TOML file, then environment
/// variables (`CP_ADAPTER_CASE_TTL_SECS`, `CP_ADAPTER_TRANSFER__DESTINATION_TYPE`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    /// Lifetime of a case before the sweep times it out.
    #[serde(default = "default_case_ttl_secs")]
    pub case_ttl_secs: u64,
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// How long an unconsumed outcome stays retrievable.
    #[serde(default = "default_result_ttl_secs")]
    pub result_ttl_secs: u64,
    #[serde(default = "default_offer_cache_ttl_secs")]
    pub offer_cache_ttl_secs: u64,
    /// How long a confirmation that arrived ahead of its negotiation is kept.
    #[serde(default = "default_parked_event_ttl_secs")]
    pub parked_event_ttl_secs: u64,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_destination_type")]
    pub destination_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

fn default_case_ttl_secs() -> u64 {
    300
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

fn default_result_ttl_secs() -> u64 {
    600
}

fn default_offer_cache_ttl_secs() -> u64 {
    60
}

fn default_parked_event_ttl_secs() -> u64 {
    30
}

fn default_destination_type() -> String {
    "HttpProxy".to_string()
}

fn default_log_filter() -> String {
    "info,cp_adapter=debug".to_string()
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            destination_type: default_destination_type(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            case_ttl_secs: default_case_ttl_secs(),
            sweep_interval_ms: default_sweep_interval_ms(),
            result_ttl_secs: default_result_ttl_secs(),
            offer_cache_ttl_secs: default_offer_cache_ttl_secs(),
            parked_event_ttl_secs: default_parked_event_ttl_secs(),
            transfer: TransferConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AdapterConfig {
    /// Loads the configuration, reading `path` if given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config: Self = builder
            .add_source(
                Environment::with_prefix("CP_ADAPTER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let zero = [
            ("case_ttl_secs", self.case_ttl_secs),
            ("sweep_interval_ms", self.sweep_interval_ms),
            ("result_ttl_secs", self.result_ttl_secs),
            ("parked_event_ttl_secs", self.parked_event_ttl_secs),
        ]
        .into_iter()
        .find(|(_, value)| *value == 0);
        if let Some((name, _)) = zero {
            return Err(AdapterError::InvalidConfig(format!("{name} must be positive")));
        }
        if self.transfer.destination_type.trim().is_empty() {
            return Err(AdapterError::InvalidConfig(
                "transfer.destination_type must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn case_ttl(&self) -> Duration {
        Duration::from_secs(self.case_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }

    pub fn offer_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.offer_cache_ttl_secs)
    }

    pub fn parked_event_ttl(&self) -> Duration {
        Duration::from_secs(self.parked_event_ttl_secs)
    }
}
