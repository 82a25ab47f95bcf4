//! Field extraction from raw JSON records.
//!
//! Paths are dot-separated (`metadata.feature`, `lines.0.plan`). JSON `null` and empty strings
//! count as absent. A field that is present but unparsable is a malformed
//! record, never a silent zero.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use z_margin_core::{parse_decimal, MarginError, Result, SourceKind};

/// Typed accessors over one raw record.
pub(crate) struct Fields<'a> {
    raw: &'a Value,
    source: SourceKind,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(raw: &'a Value, source: SourceKind) -> Self {
        Self { raw, source }
    }

    /// Re-root the accessors at a nested object (e.g. a webhook envelope's payload).
    pub(crate) fn nested(&self, path: &str) -> Option<Fields<'a>> {
        self.value(path)
            .filter(|value| value.is_object())
            .map(|raw| Fields::new(raw, self.source))
    }

    pub(crate) fn malformed(&self, reason: impl Into<String>) -> MarginError {
        MarginError::malformed(self.source.as_str(), reason)
    }

    pub(crate) fn value(&self, path: &str) -> Option<&'a Value> {
        let mut current = self.raw;
        for segment in path.split('.') {
            current = match current {
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                other => other.get(segment)?,
            };
        }
        match current {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            other => Some(other),
        }
    }

    fn first<'p>(&self, paths: &[&'p str]) -> Option<(&'p str, &'a Value)> {
        paths
            .iter()
            .find_map(|path| self.value(path).map(|value| (*path, value)))
    }

    pub(crate) fn opt_str(&self, paths: &[&str]) -> Option<String> {
        match self.first(paths)?.1 {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            // Expanded Stripe objects carry their ID under `id`.
            Value::Object(map) => map.get("id").and_then(Value::as_str).map(str::to_string),
            _ => None,
        }
    }

    pub(crate) fn req_str(&self, paths: &[&str], what: &str) -> Result<String> {
        self.opt_str(paths)
            .ok_or_else(|| self.malformed(format!("missing {what}")))
    }

    pub(crate) fn opt_bool(&self, path: &str) -> Option<bool> {
        match self.value(path)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub(crate) fn opt_decimal(&self, paths: &[&str]) -> Result<Option<Decimal>> {
        let Some((path, value)) = self.first(paths) else {
            return Ok(None);
        };
        decimal_value(value)
            .map(Some)
            .ok_or_else(|| self.malformed(format!("unparsable {path}: {value}")))
    }

    pub(crate) fn req_decimal(&self, paths: &[&str], what: &str) -> Result<Decimal> {
        self.opt_decimal(paths)?
            .ok_or_else(|| self.malformed(format!("missing {what}")))
    }

    /// Add two parsed amounts, treating overflow as a malformed record.
    pub(crate) fn checked_add(&self, a: Decimal, b: Decimal, what: &str) -> Result<Decimal> {
        a.checked_add(b)
            .ok_or_else(|| self.malformed(format!("{what} out of range")))
    }

    /// Sum every present field. `None` if none of them is present.
    pub(crate) fn sum_decimals(&self, paths: &[&str]) -> Result<Option<Decimal>> {
        let mut total: Option<Decimal> = None;
        for path in paths {
            if let Some(value) = self.opt_decimal(&[*path])? {
                total = Some(self.checked_add(total.unwrap_or_default(), value, path)?);
            }
        }
        Ok(total)
    }

    /// Sum the numeric leaves of an object field (e.g. a per-TTL breakdown),
    /// or read it as a single number.
    pub(crate) fn sum_object(&self, path: &str) -> Result<Option<Decimal>> {
        match self.value(path) {
            Some(Value::Object(map)) => {
                let mut total = Decimal::ZERO;
                for (key, value) in map {
                    if value.is_null() {
                        continue;
                    }
                    let value = decimal_value(value)
                        .ok_or_else(|| self.malformed(format!("unparsable {path}.{key}")))?;
                    total = self.checked_add(total, value, path)?;
                }
                Ok(Some(total))
            }
            Some(_) => self.opt_decimal(&[path]),
            None => Ok(None),
        }
    }

    pub(crate) fn req_timestamp(&self, paths: &[&str]) -> Result<DateTime<Utc>> {
        let (path, value) = self
            .first(paths)
            .ok_or_else(|| self.malformed("missing timestamp"))?;
        parse_timestamp(value)
            .ok_or_else(|| self.malformed(format!("unparsable {path}: {value}")))
    }
}

fn decimal_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => parse_decimal(s),
        _ => None,
    }
}

/// Years a stored timestamp may fall in. Storage keys start with a
/// fixed-width `YYYY-MM-DD` date.
const YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

/// Parse RFC 3339, `YYYY-MM-DD`, naive `YYYY-MM-DDTHH:MM:SS` (as UTC) or unix seconds.
///
/// Timestamps whose UTC year has more than four digits are rejected.
pub(crate) fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    parse_timestamp_value(value).filter(|ts| YEARS.contains(&ts.year()))
}

#[allow(clippy::cast_possible_truncation)]
fn parse_timestamp_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|secs| secs.trunc() as i64))
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        Value::String(s) => parse_timestamp_str(s.trim()),
        _ => None,
    }
}

fn parse_timestamp_str(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    text.parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}
