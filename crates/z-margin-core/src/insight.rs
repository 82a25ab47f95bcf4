//! Insight flags produced by the rule engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CustomerId, InsightId};

/// The fixed set of insight rules, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightRule {
    /// Revenue per usage unit below the configured floor.
    UnprofitableCustomer,
    /// Feature margin below the configured (negative) threshold.
    UnprofitableFeature,
    /// Customer usage close to or over its assigned limit.
    FairUseExceeded,
    /// Too much usage on legacy features.
    LegacyConcentration,
}

impl InsightRule {
    /// Rules in evaluation order.
    pub const ORDERED: [Self; 4] = [
        Self::UnprofitableCustomer,
        Self::UnprofitableFeature,
        Self::FairUseExceeded,
        Self::LegacyConcentration,
    ];

    /// Category of flags raised by this rule.
    #[must_use]
    pub fn category(&self) -> InsightCategory {
        match self {
            Self::UnprofitableCustomer | Self::FairUseExceeded => InsightCategory::Customer,
            Self::UnprofitableFeature => InsightCategory::Feature,
            Self::LegacyConcentration => InsightCategory::Usage,
        }
    }

    /// Severity of flags raised by this rule.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::UnprofitableFeature => Severity::Critical,
            Self::UnprofitableCustomer | Self::FairUseExceeded | Self::LegacyConcentration => {
                Severity::Warning
            }
        }
    }

    /// Get the rule name as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnprofitableCustomer => "unprofitable_customer",
            Self::UnprofitableFeature => "unprofitable_feature",
            Self::FairUseExceeded => "fair_use_exceeded",
            Self::LegacyConcentration => "legacy_concentration",
        }
    }
}

/// What an insight is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightCategory {
    /// Usage mix.
    Usage,
    /// Revenue.
    Revenue,
    /// A single customer.
    Customer,
    /// A single feature.
    Feature,
}

/// How urgent an insight is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    Info,
    /// Needs attention.
    Warning,
    /// Losing money now.
    Critical,
}

/// A rule-triggered alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightFlag {
    /// Unique ID (time-ordered).
    pub id: InsightId,

    /// The rule that raised this flag.
    pub rule: InsightRule,

    /// What the flag is about: a customer ID, a feature name, or `"all"`.
    pub subject: String,

    /// Flag category.
    pub category: InsightCategory,

    /// Flag severity.
    pub severity: Severity,

    /// When the evaluation ran.
    pub generated_at: DateTime<Utc>,

    /// Short human-readable title.
    pub title: String,

    /// Human-readable explanation.
    pub description: String,

    /// Key metric behind the flag (e.g. "margin -50.00%").
    pub metric: Option<String>,

    /// Customer the flag refers to, for customer rules.
    pub customer_id: Option<CustomerId>,
}

impl InsightFlag {
    /// Create a flag for `rule` about `subject`; category and severity come from the rule.
    #[must_use]
    pub fn new(
        rule: InsightRule,
        subject: impl Into<String>,
        generated_at: DateTime<Utc>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: InsightId::generate(),
            rule,
            subject: subject.into(),
            category: rule.category(),
            severity: rule.severity(),
            generated_at,
            title: title.into(),
            description: description.into(),
            metric: None,
            customer_id: None,
        }
    }

    /// Attach a metric snippet.
    #[must_use]
    pub fn with_metric(mut self, metric: impl Into<String>) -> Self {
        self.metric = Some(metric.into());
        self
    }

    /// Attach the customer the flag refers to.
    #[must_use]
    pub fn with_customer(mut self, customer_id: CustomerId) -> Self {
        self.customer_id = Some(customer_id);
        self
    }
}
