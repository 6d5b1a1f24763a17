use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{IngestError, MalformedRecordError};

/// One lending-protocol action as exported from the transaction store.
///
/// Only the fields scoring reads are modelled; everything else in the export
/// (`_id`, `network`, `blockNumber`, `assetPriceUSD`, ...) is ignored whatever
/// its type. Every field is optional at this layer so the normalizer can report
/// exactly which required field is missing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub user_wallet: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tx_hash: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<RawTimestamp>,
    pub action: Option<String>,
    pub action_data: Option<ActionData>,
}

/// Action-specific payload nested under `actionData`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionData {
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: Option<RawAmount>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub asset_symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pool_id: Option<String>,
}

/// Event time as found in the export.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamp {
    UnixSeconds(i64),
    FractionalSeconds(f64),
    /// RFC 3339, or a number written as a string.
    Text(String),
    /// Any other JSON type, kept as JSON text. Rejected during normalization.
    Unsupported(String),
}

impl From<Value> for RawTimestamp {
    fn from(value: Value) -> Self {
        match value {
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(secs), _) => Self::UnixSeconds(secs),
                (None, Some(secs)) => Self::FractionalSeconds(secs),
                (None, None) => Self::Unsupported(n.to_string()),
            },
            Value::String(s) => Self::Text(s),
            other => Self::Unsupported(other.to_string()),
        }
    }
}

/// Token amount in base units. Usually a decimal string, sometimes a bare JSON number.
#[derive(Debug, Clone, PartialEq)]
pub enum RawAmount {
    Text(String),
    Number(serde_json::Number),
    Unsupported(String),
}

impl RawAmount {
    /// Decimal text to parse, or `None` when the JSON type cannot hold an amount.
    pub fn as_decimal_str(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.trim().to_string()),
            Self::Number(n) => Some(n.to_string()),
            Self::Unsupported(_) => None,
        }
    }
}

impl From<&str> for RawAmount {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Value> for RawAmount {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s),
            Value::Number(n) => Self::Number(n),
            other => Self::Unsupported(other.to_string()),
        }
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<RawTimestamp>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.map(RawTimestamp::from))
}

fn lenient_amount<'de, D: Deserializer<'de>>(d: D) -> Result<Option<RawAmount>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.map(RawAmount::from))
}

/// Parse a JSON array of raw records. Elements are decoded one by one so a bad
/// element is reported by its index.
pub fn parse_raw_transactions(json: &str) -> Result<Vec<RawTransaction>, IngestError> {
    let elements: Vec<Value> = serde_json::from_str(json).map_err(IngestError::NotAnArray)?;
    elements
        .into_iter()
        .enumerate()
        .map(|(index, element)| {
            serde_json::from_value(element).map_err(|e| {
                IngestError::from(MalformedRecordError::invalid(index, "record", e.to_string()))
            })
        })
        .collect()
}
