use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, TimeZone, Utc};
use std::str::FromStr;

use crate::error::MalformedRecordError;
use crate::features::types::{Action, WalletTransaction};

use super::types::{RawAmount, RawTimestamp, RawTransaction};

/// Normalize a batch of raw records. The first malformed record aborts the batch.
pub fn normalize_records(
    raw: &[RawTransaction],
) -> Result<Vec<WalletTransaction>, MalformedRecordError> {
    let records = raw
        .iter()
        .enumerate()
        .map(|(index, record)| normalize_record(index, record))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(records = records.len(), "Normalized raw transactions");
    Ok(records)
}

/// Flatten one raw record into a canonical transaction.
/// Only `timestamp` is kept as event time; `createdAt`/`updatedAt` are dropped.
pub fn normalize_record(
    index: usize,
    raw: &RawTransaction,
) -> Result<WalletTransaction, MalformedRecordError> {
    let wallet_id = raw
        .user_wallet
        .as_deref()
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .ok_or_else(|| MalformedRecordError::missing(index, "userWallet"))?
        .to_string();

    let action = raw
        .action
        .as_deref()
        .filter(|a| !a.trim().is_empty())
        .map(Action::parse)
        .ok_or_else(|| MalformedRecordError::missing(index, "action"))?;

    let timestamp = raw
        .timestamp
        .as_ref()
        .ok_or_else(|| MalformedRecordError::missing(index, "timestamp"))
        .and_then(|ts| parse_timestamp(index, ts))?;

    let data = raw.action_data.as_ref();
    let amount = data
        .and_then(|d| d.amount.as_ref())
        .ok_or_else(|| MalformedRecordError::missing(index, "actionData.amount"))
        .and_then(|amount| parse_amount(index, amount))?;

    Ok(WalletTransaction {
        wallet_id,
        tx_hash: raw.tx_hash.clone(),
        action,
        asset_symbol: data.and_then(|d| non_empty(d.asset_symbol.as_deref())),
        pool_id: data.and_then(|d| non_empty(d.pool_id.as_deref())),
        amount,
        timestamp,
    })
}

/// Exact decimal parse, then a single conversion to `f64`.
fn parse_amount(index: usize, raw: &RawAmount) -> Result<f64, MalformedRecordError> {
    let text = raw.as_decimal_str().ok_or_else(|| {
        MalformedRecordError::invalid(index, "actionData.amount", "is neither a number nor a string")
    })?;
    let decimal = BigDecimal::from_str(&text).map_err(|e| {
        MalformedRecordError::invalid(index, "actionData.amount", format!("'{}': {}", text, e))
    })?;

    let amount = decimal.to_f64().filter(|a| a.is_finite()).ok_or_else(|| {
        MalformedRecordError::invalid(
            index,
            "actionData.amount",
            format!("'{}' is not representable as a finite number", text),
        )
    })?;

    if amount < 0.0 {
        return Err(MalformedRecordError::invalid(
            index,
            "actionData.amount",
            format!("'{}' is negative", text),
        ));
    }

    // "-0" parses fine; report it as plain zero
    Ok(amount.abs())
}

fn parse_timestamp(index: usize, raw: &RawTimestamp) -> Result<DateTime<Utc>, MalformedRecordError> {
    match raw {
        RawTimestamp::UnixSeconds(secs) => Utc.timestamp_opt(*secs, 0).single().ok_or_else(|| {
            MalformedRecordError::invalid(index, "timestamp", format!("{} is out of range", secs))
        }),
        RawTimestamp::FractionalSeconds(secs) => from_fractional_seconds(*secs).ok_or_else(|| {
            MalformedRecordError::invalid(index, "timestamp", format!("{} is out of range", secs))
        }),
        RawTimestamp::Unsupported(json) => Err(MalformedRecordError::invalid(
            index,
            "timestamp",
            format!("{} is neither a number nor a string", json),
        )),
        RawTimestamp::Text(text) => {
            let text = text.trim();
            if let Ok(secs) = text.parse::<i64>() {
                return parse_timestamp(index, &RawTimestamp::UnixSeconds(secs));
            }
            if let Ok(secs) = text.parse::<f64>() {
                return parse_timestamp(index, &RawTimestamp::FractionalSeconds(secs));
            }
            DateTime::parse_from_rfc3339(text)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    MalformedRecordError::invalid(index, "timestamp", format!("'{}': {}", text, e))
                })
        }
    }
}

/// Unix seconds with a fractional part, kept to the nanosecond.
fn from_fractional_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    if whole < i64::MIN as f64 || whole >= i64::MAX as f64 {
        return None;
    }
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    Utc.timestamp_opt(whole as i64, nanos).single()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
