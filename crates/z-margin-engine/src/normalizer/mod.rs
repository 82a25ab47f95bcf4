//! Source record normalization.
//!
//! Each [`SourceKind`] has its own mapping module that reads a raw JSON record
//! into a [`Mapped`] value. The [`Normalizer`] then resolves the customer
//! through the [`CustomerDirectory`], fills in defaults from the configuration
//! and produces the canonical [`NormalizedEvent`].
//!
//! Event IDs are namespaced by source (`stripe:ch_123`). Records without a
//! native ID get a deterministic ID derived from their content, so re-ingesting
//! the same export is idempotent.

mod anthropic;
mod fields;
mod identity;
mod lago;
mod metering;
mod openai;
mod stripe;

pub use identity::{resolve_customer, Resolution};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use z_margin_core::{
    CustomerMetadata, MarginError, NormalizedEvent, Result, RevenueEvent, RevenueEventType,
    SourceKind, UsageEvent,
};
use z_margin_store::CustomerDirectory;

use crate::config::NormalizerConfig;

/// How a raw record names its customer.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRef {
    /// The customer key within the source.
    pub key: String,
    /// Explicit link to an existing canonical customer ID.
    pub reference: Option<String>,
    /// Metadata carried by the record.
    pub metadata: CustomerMetadata,
}

impl CustomerRef {
    fn new(key: String) -> Self {
        Self {
            key,
            reference: None,
            metadata: CustomerMetadata::default(),
        }
    }
}

/// A usage record after field mapping, before customer resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedUsage {
    /// Native record ID, if the source has one.
    pub id: Option<String>,
    /// Customer the usage belongs to.
    pub customer: CustomerRef,
    /// Feature or model name.
    pub feature: String,
    /// Units consumed.
    pub quantity: Decimal,
    /// Unit cost if the record carries one.
    pub unit_cost: Option<Decimal>,
    /// When the usage occurred.
    pub occurred_at: DateTime<Utc>,
    /// Record context kept on the event.
    pub metadata: Value,
}

/// A revenue record after field mapping, before customer resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRevenue {
    /// Native billing object ID, if any.
    pub id: Option<String>,
    /// Customer that paid.
    pub customer: CustomerRef,
    /// Non-negative amount in major currency units.
    pub amount: Decimal,
    /// Lowercase ISO currency code.
    pub currency: String,
    /// Billing event kind.
    pub event_type: RevenueEventType,
    /// Feature attribution, if the billing source knows it.
    pub feature: Option<String>,
    /// When the billing event occurred.
    pub occurred_at: DateTime<Utc>,
}

/// Result of mapping a raw record.
#[derive(Debug, Clone, PartialEq)]
pub enum Mapped {
    /// A usage record.
    Usage(MappedUsage),
    /// A revenue record.
    Revenue(MappedRevenue),
    /// A well-formed record that carries no revenue or usage (e.g. an unpaid charge).
    Ignored(String),
}

/// Outcome of normalizing one raw record.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedRecord {
    /// The record produced an event.
    Event {
        /// The canonical event.
        event: NormalizedEvent,
        /// How the customer was resolved.
        resolution: Resolution,
    },
    /// The record was valid but intentionally skipped.
    Ignored(String),
}

/// Maps raw source records into canonical events.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    /// Create a normalizer.
    #[must_use]
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Map a raw record without touching the customer directory.
    ///
    /// # Errors
    ///
    /// Returns `MarginError::MalformedRecord` when required fields are missing
    /// or unparsable.
    pub fn map(&self, source: SourceKind, raw: &Value) -> Result<Mapped> {
        if !raw.is_object() {
            return Err(MarginError::malformed(
                source.as_str(),
                "record is not a JSON object",
            ));
        }
        match source {
            SourceKind::OpenAi => openai::map(raw),
            SourceKind::Anthropic => anthropic::map(raw),
            SourceKind::Metering => metering::map(raw),
            SourceKind::Stripe => stripe::map(raw),
            SourceKind::Lago => lago::map(raw),
        }
    }

    /// Normalize a raw record, resolving (and possibly creating) its customer.
    ///
    /// # Errors
    ///
    /// - `MarginError::MalformedRecord` for missing or unparsable fields, and
    ///   for revenue in a currency other than the reporting currency.
    /// - `MarginError::UnknownCustomerReference` if the record links to a
    ///   customer that does not exist.
    /// - Storage errors from the directory.
    pub fn normalize<D: CustomerDirectory + ?Sized>(
        &self,
        source: SourceKind,
        raw: &Value,
        directory: &D,
    ) -> Result<NormalizedRecord> {
        match self.map(source, raw)? {
            Mapped::Ignored(reason) => Ok(NormalizedRecord::Ignored(reason)),
            Mapped::Usage(usage) => {
                let event_id = usage_event_id(source, &usage);
                let unit_cost = usage
                    .unit_cost
                    .or_else(|| self.config.pricing.unit_cost(&usage.feature))
                    .unwrap_or(Decimal::ZERO);
                if unit_cost.is_sign_negative() || usage.quantity.is_sign_negative() {
                    return Err(MarginError::malformed(
                        source.as_str(),
                        "negative quantity or unit cost",
                    ));
                }
                if usage.quantity.checked_mul(unit_cost).is_none() {
                    return Err(MarginError::malformed(
                        source.as_str(),
                        "quantity × unit cost out of range",
                    ));
                }

                let resolution = resolve_customer(directory, source, &usage.customer)?;
                let event = UsageEvent {
                    event_id,
                    customer_id: resolution.customer.id,
                    feature: usage.feature,
                    quantity: usage.quantity,
                    unit_cost,
                    occurred_at: usage.occurred_at,
                    source,
                    metadata: usage.metadata,
                };
                Ok(NormalizedRecord::Event {
                    event: event.into(),
                    resolution,
                })
            }
            Mapped::Revenue(revenue) => {
                if !revenue
                    .currency
                    .eq_ignore_ascii_case(&self.config.reporting_currency)
                {
                    return Err(MarginError::malformed(
                        source.as_str(),
                        format!(
                            "currency {} differs from reporting currency {}",
                            revenue.currency, self.config.reporting_currency
                        ),
                    ));
                }

                let event_id = revenue_event_id(source, &revenue);
                let resolution = resolve_customer(directory, source, &revenue.customer)?;
                let event = RevenueEvent {
                    event_id,
                    customer_id: resolution.customer.id,
                    amount: revenue.amount.abs(),
                    currency: revenue.currency.to_ascii_lowercase(),
                    event_type: revenue.event_type,
                    feature: revenue.feature,
                    occurred_at: revenue.occurred_at,
                    source,
                };
                Ok(NormalizedRecord::Event {
                    event: event.into(),
                    resolution,
                })
            }
        }
    }
}

fn usage_event_id(source: SourceKind, usage: &MappedUsage) -> String {
    match &usage.id {
        Some(id) => format!("{source}:{id}"),
        None => format!(
            "{source}:{}:{}:{}:{}",
            usage.customer.key,
            usage.feature,
            usage.occurred_at.timestamp(),
            usage.quantity.normalize()
        ),
    }
}

fn revenue_event_id(source: SourceKind, revenue: &MappedRevenue) -> String {
    match &revenue.id {
        Some(id) => format!("{source}:{id}"),
        None => format!(
            "{source}:{}:{}:{}:{}",
            revenue.customer.key,
            revenue.event_type.as_str(),
            revenue.occurred_at.timestamp(),
            revenue.amount.normalize()
        ),
    }
}

/// Convert an integer amount in minor units (cents) to major units.
pub(crate) fn from_minor_units(amount: Decimal, currency: &str) -> Decimal {
    // ISO 4217 currencies without a minor unit that Stripe and Lago bill in.
    const ZERO_DECIMAL: [&str; 16] = [
        "bif", "clp", "djf", "gnf", "jpy", "kmf", "krw", "mga", "pyg", "rwf", "ugx", "vnd", "vuv",
        "xaf", "xof", "xpf",
    ];
    if ZERO_DECIMAL.contains(&currency) {
        amount
    } else {
        amount / Decimal::ONE_HUNDRED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use z_margin_core::Environment;
    use z_margin_store::MemoryStore;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(NormalizerConfig::default())
    }

    fn expect_event(record: NormalizedRecord) -> (NormalizedEvent, Resolution) {
        match record {
            NormalizedRecord::Event { event, resolution } => (event, resolution),
            NormalizedRecord::Ignored(reason) => panic!("unexpectedly ignored: {reason}"),
        }
    }

    #[test]
    fn rejects_non_objects() {
        let store = MemoryStore::new();
        let result = normalizer().normalize(SourceKind::Metering, &json!([1, 2]), &store);
        assert!(matches!(result, Err(MarginError::MalformedRecord { .. })));
    }

    #[test]
    fn metering_record_creates_customer() {
        let store = MemoryStore::new();
        let raw = json!({
            "customer_id": "acme",
            "customer_name": "Acme Corp",
            "plan": "pro",
            "feature": "gpt-4",
            "quantity": 100,
            "unit_cost": "0.002",
            "timestamp": "2024-01-01T12:00:00Z"
        });

        let (event, resolution) =
            expect_event(normalizer().normalize(SourceKind::Metering, &raw, &store).unwrap());
        assert!(resolution.created);
        assert_eq!(resolution.customer.name, "Acme Corp");
        assert_eq!(resolution.customer.plan, "pro");

        let NormalizedEvent::Usage(usage) = event else {
            panic!("expected usage");
        };
        assert_eq!(usage.cost(), Some(d("0.2")));
        assert_eq!(usage.customer_id, resolution.customer.id);
        assert!(usage.event_id.starts_with("metering:acme:gpt-4:"));
    }

    #[test]
    fn same_record_resolves_same_customer_and_id() {
        let store = MemoryStore::new();
        let raw = json!({
            "customer_id": "acme",
            "feature": "gpt-4",
            "quantity": 1,
            "timestamp": 1_704_067_200
        });

        let (first, _) =
            expect_event(normalizer().normalize(SourceKind::Metering, &raw, &store).unwrap());
        let (second, resolution) =
            expect_event(normalizer().normalize(SourceKind::Metering, &raw, &store).unwrap());
        assert!(!resolution.created);
        assert_eq!(first.event_id(), second.event_id());
        assert_eq!(first.customer_id(), second.customer_id());
    }

    #[test]
    fn unit_cost_falls_back_to_pricing_then_zero() {
        let store = MemoryStore::new();
        let priced = json!({"customer_id": "c", "feature": "gpt-4", "quantity": 1000, "timestamp": "2024-01-01"});
        let unpriced = json!({"customer_id": "c", "feature": "in-house", "quantity": 1000, "timestamp": "2024-01-01"});

        let (event, _) =
            expect_event(normalizer().normalize(SourceKind::Metering, &priced, &store).unwrap());
        let NormalizedEvent::Usage(usage) = event else {
            panic!("expected usage");
        };
        assert_eq!(usage.cost(), Some(d("0.03")));

        let (event, _) =
            expect_event(normalizer().normalize(SourceKind::Metering, &unpriced, &store).unwrap());
        let NormalizedEvent::Usage(usage) = event else {
            panic!("expected usage");
        };
        assert_eq!(usage.unit_cost, Decimal::ZERO);
    }

    #[test]
    fn negative_quantity_is_malformed() {
        let store = MemoryStore::new();
        let raw = json!({"customer_id": "c", "feature": "f", "quantity": -5, "timestamp": "2024-01-01"});
        let result = normalizer().normalize(SourceKind::Metering, &raw, &store);
        assert!(matches!(result, Err(MarginError::MalformedRecord { .. })));
        assert!(store.list_customers().unwrap().is_empty());
    }

    #[test]
    fn cost_beyond_decimal_range_is_malformed() {
        let store = MemoryStore::new();
        let raw = json!({
            "customer_id": "c",
            "feature": "f",
            "quantity": "50000000000000000000000000000",
            "unit_cost": "2",
            "timestamp": "2024-01-01"
        });
        let result = normalizer().normalize(SourceKind::Metering, &raw, &store);
        assert!(matches!(result, Err(MarginError::MalformedRecord { .. })));
        assert!(store.list_customers().unwrap().is_empty());
    }

    #[test]
    fn foreign_currency_is_malformed() {
        let store = MemoryStore::new();
        let raw = json!({
            "object": "charge",
            "id": "ch_1",
            "customer": "cus_1",
            "amount": 5000,
            "currency": "eur",
            "paid": true,
            "created": 1_704_067_200
        });
        let result = normalizer().normalize(SourceKind::Stripe, &raw, &store);
        assert!(matches!(result, Err(MarginError::MalformedRecord { .. })));
    }

    #[test]
    fn stripe_charge_to_revenue() {
        let store = MemoryStore::new();
        let raw = json!({
            "object": "charge",
            "id": "ch_1",
            "customer": "cus_1",
            "amount": 5000,
            "currency": "usd",
            "paid": true,
            "livemode": false,
            "created": 1_704_067_200,
            "metadata": {"feature": "gpt-4", "subscription_type": "pro"}
        });

        let (event, resolution) =
            expect_event(normalizer().normalize(SourceKind::Stripe, &raw, &store).unwrap());
        assert_eq!(resolution.customer.environment, Environment::Staging);
        assert_eq!(resolution.customer.plan, "pro");

        let NormalizedEvent::Revenue(revenue) = event else {
            panic!("expected revenue");
        };
        assert_eq!(revenue.event_id, "stripe:ch_1");
        assert_eq!(revenue.amount, d("50"));
        assert_eq!(revenue.feature.as_deref(), Some("gpt-4"));
        assert_eq!(revenue.event_type, RevenueEventType::Charge);
    }

    #[test]
    fn minor_units() {
        assert_eq!(from_minor_units(d("5000"), "usd"), d("50"));
        assert_eq!(from_minor_units(d("5000"), "jpy"), d("5000"));
    }
}
