use crate::domain::case::CorrelationKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of an asset in a provider's catalog.
    AssetId
);
string_id!(
    /// Identifier the negotiation service assigns to a started negotiation.
    NegotiationId
);
string_id!(
    /// Identifier of the agreement produced by a confirmed negotiation.
    ContractId
);
string_id!(TransferProcessId);

/// Property name under which the correlation key travels with a transfer.
pub const CORRELATION_PROPERTY: &str = "cid";

/// A caller's request for the data behind one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRequest {
    pub key: CorrelationKey,
    #[serde(rename = "asset")]
    pub asset_id: AssetId,
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractOffer {
    pub id: String,
    pub asset_id: AssetId,
    pub provider: String,
}

/// Where the provider should make the data available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDestination {
    pub kind: String,
    pub properties: BTreeMap<String, String>,
}

impl TransferDestination {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// The correlation key echoed back by the provider, if the destination carries one.
    pub fn correlation_key(&self) -> Option<CorrelationKey> {
        self.properties
            .get(CORRELATION_PROPERTY)
            .map(|cid| CorrelationKey::new(cid.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub contract_id: ContractId,
    pub asset_id: AssetId,
    pub provider: String,
    pub destination: TransferDestination,
}

/// Endpoint and credentials through which the transferred data can be pulled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataReference {
    pub id: String,
    pub endpoint: String,
    pub auth_key: String,
    pub auth_code: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}
