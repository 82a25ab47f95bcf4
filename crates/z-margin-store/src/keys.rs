//! Key encoding utilities for `RocksDB`.
//!
//! Dates are encoded as their 10-byte `YYYY-MM-DD` text, which sorts in
//! calendar order, so every date-prefixed column family can be range-scanned.

use chrono::NaiveDate;
use z_margin_core::{BucketKey, CustomerId, SourceKind, DATE_FORMAT};

/// Length of an encoded date prefix.
pub const DATE_LEN: usize = 10;

/// Encode a date prefix.
#[must_use]
pub fn date_prefix(date: NaiveDate) -> Vec<u8> {
    date.format(DATE_FORMAT).to_string().into_bytes()
}

/// Decode the date prefix of a date-keyed entry.
#[must_use]
pub fn extract_date(key: &[u8]) -> Option<NaiveDate> {
    let prefix = key.get(..DATE_LEN)?;
    let text = std::str::from_utf8(prefix).ok()?;
    NaiveDate::parse_from_str(text, DATE_FORMAT).ok()
}

/// Create a customer key from a customer ID.
#[must_use]
pub fn customer_key(id: &CustomerId) -> Vec<u8> {
    id.as_bytes().to_vec()
}

/// Create a source alias key.
///
/// Format: `source name || 0x00 || source_key`
#[must_use]
pub fn source_alias_key(source: SourceKind, source_key: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(source.as_str().len() + 1 + source_key.len());
    key.extend_from_slice(source.as_str().as_bytes());
    key.push(0);
    key.extend_from_slice(source_key.as_bytes());
    key
}

/// Create an event log key.
///
/// Format: `date (10 bytes) || event_id`
#[must_use]
pub fn event_key(date: NaiveDate, event_id: &str) -> Vec<u8> {
    let mut key = date_prefix(date);
    key.extend_from_slice(event_id.as_bytes());
    key
}

/// Create an event ID index key.
#[must_use]
pub fn event_id_key(event_id: &str) -> Vec<u8> {
    event_id.as_bytes().to_vec()
}

/// Create an aggregate key.
///
/// Format: `date (10 bytes) || customer_id (16 bytes) || 0x00` for the
/// customer-level bucket, or `... || 0x01 || feature` for a feature bucket.
#[must_use]
pub fn aggregate_key(bucket: &BucketKey) -> Vec<u8> {
    let mut key = date_prefix(bucket.date);
    key.extend_from_slice(bucket.customer_id.as_bytes());
    match &bucket.feature {
        None => key.push(0),
        Some(feature) => {
            key.push(1);
            key.extend_from_slice(feature.as_bytes());
        }
    }
    key
}

/// Create an insight key from its position in the active set.
#[must_use]
pub fn insight_key(position: u32) -> Vec<u8> {
    position.to_be_bytes().to_vec()
}
