use crate::domain::case::CorrelationKey;
use crate::domain::message::Channel;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Channel {0} already has a registered handler")]
    DuplicateHandler(Channel),
    #[error("No handler registered for channel {0}")]
    MissingHandler(Channel),
    #[error("Case {0} is already registered")]
    DuplicateCase(CorrelationKey),
    #[error("Pending record for {0} is already stored")]
    DuplicatePending(CorrelationKey),
    #[error("Pending record for {0} not found")]
    PendingNotFound(CorrelationKey),
    #[error("Collaborator error: {0}")]
    Collaborator(String),
    #[error("Message bus is closed")]
    BusClosed,
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AdapterError>;
