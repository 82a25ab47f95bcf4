//! Normalized usage and revenue events.
//!
//! Every supported source service maps its raw records into one of these two
//! canonical shapes. Events are immutable once ingested.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CustomerId;

/// Whether a source reports usage or revenue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    /// Metered usage (tokens, calls, ...).
    Usage,
    /// Billing data (charges, invoices, refunds).
    Revenue,
}

/// Source service a record came from.
///
/// The set is closed: each variant has its own field mapping in the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// `OpenAI` organization usage API.
    #[serde(rename = "openai")]
    OpenAi,
    /// Anthropic usage report API.
    Anthropic,
    /// First-party metering (webhooks, exporters).
    Metering,
    /// Stripe charges, refunds and invoices.
    Stripe,
    /// Lago invoices and credit notes.
    Lago,
}

impl SourceKind {
    /// All supported sources.
    pub const ALL: [Self; 5] = [
        Self::OpenAi,
        Self::Anthropic,
        Self::Metering,
        Self::Stripe,
        Self::Lago,
    ];

    /// Get the source name as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Metering => "metering",
            Self::Stripe => "stripe",
            Self::Lago => "lago",
        }
    }

    /// Whether this source reports usage or revenue.
    #[must_use]
    pub fn category(&self) -> SourceCategory {
        match self {
            Self::OpenAi | Self::Anthropic | Self::Metering => SourceCategory::Usage,
            Self::Stripe | Self::Lago => SourceCategory::Revenue,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unsupported source: {s}"))
    }
}

/// A usage event reported by a metering source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Unique event ID for idempotency.
    pub event_id: String,

    /// The customer that consumed the usage.
    pub customer_id: CustomerId,

    /// Feature or model name (e.g. "gpt-4").
    pub feature: String,

    /// Quantity used (tokens, calls, ...).
    pub quantity: Decimal,

    /// Cost per unit in the reporting currency.
    pub unit_cost: Decimal,

    /// When the usage occurred.
    pub occurred_at: DateTime<Utc>,

    /// Which service reported this usage.
    pub source: SourceKind,

    /// Additional context from the raw record.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl UsageEvent {
    /// Total cost of this event: `quantity × unit_cost`.
    ///
    /// `None` if the product does not fit in a `Decimal`.
    #[must_use]
    pub fn cost(&self) -> Option<Decimal> {
        self.quantity.checked_mul(self.unit_cost)
    }
}

/// Revenue event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevenueEventType {
    /// One-off card charge.
    Charge,
    /// Money returned to the customer.
    Refund,
    /// Paid invoice.
    Invoice,
    /// Subscription payment.
    Subscription,
    /// Generic payment.
    Payment,
}

impl RevenueEventType {
    /// Sign applied to the event amount: refunds subtract revenue.
    #[must_use]
    pub fn sign(&self) -> Decimal {
        match self {
            Self::Refund => Decimal::NEGATIVE_ONE,
            Self::Charge | Self::Invoice | Self::Subscription | Self::Payment => Decimal::ONE,
        }
    }

    /// Get the event type name as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Charge => "charge",
            Self::Refund => "refund",
            Self::Invoice => "invoice",
            Self::Subscription => "subscription",
            Self::Payment => "payment",
        }
    }
}

/// A revenue event reported by a billing source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueEvent {
    /// Unique event ID for idempotency (the billing object's ID when known).
    pub event_id: String,

    /// The customer that paid (or was refunded).
    pub customer_id: CustomerId,

    /// Amount as a non-negative magnitude in the reporting currency.
    pub amount: Decimal,

    /// Lowercase ISO currency code.
    pub currency: String,

    /// What kind of billing event this is.
    pub event_type: RevenueEventType,

    /// Feature the revenue is attributed to, when the billing source knows it.
    pub feature: Option<String>,

    /// When the billing event occurred.
    pub occurred_at: DateTime<Utc>,

    /// Which service reported this revenue.
    pub source: SourceKind,
}

impl RevenueEvent {
    /// Amount signed by event type (refunds negative).
    #[must_use]
    pub fn signed_amount(&self) -> Decimal {
        self.amount.abs() * self.event_type.sign()
    }
}

/// A normalized event of either kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizedEvent {
    /// Usage event.
    Usage(UsageEvent),
    /// Revenue event.
    Revenue(RevenueEvent),
}

impl NormalizedEvent {
    /// Event ID.
    #[must_use]
    pub fn event_id(&self) -> &str {
        match self {
            Self::Usage(e) => &e.event_id,
            Self::Revenue(e) => &e.event_id,
        }
    }

    /// Customer the event belongs to.
    #[must_use]
    pub fn customer_id(&self) -> CustomerId {
        match self {
            Self::Usage(e) => e.customer_id,
            Self::Revenue(e) => e.customer_id,
        }
    }

    /// When the event occurred.
    #[must_use]
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::Usage(e) => e.occurred_at,
            Self::Revenue(e) => e.occurred_at,
        }
    }

    /// UTC calendar date the event is bucketed under.
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.occurred_at().date_naive()
    }

    /// Source service.
    #[must_use]
    pub fn source(&self) -> SourceKind {
        match self {
            Self::Usage(e) => e.source,
            Self::Revenue(e) => e.source,
        }
    }
}

impl From<UsageEvent> for NormalizedEvent {
    fn from(event: UsageEvent) -> Self {
        Self::Usage(event)
    }
}

impl From<RevenueEvent> for NormalizedEvent {
    fn from(event: RevenueEvent) -> Self {
        Self::Revenue(event)
    }
}
