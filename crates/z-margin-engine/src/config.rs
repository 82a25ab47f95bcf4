//! Engine configuration.
//!
//! All settings are passed explicitly to [`crate::MarginEngine::new`]; nothing
//! is read from process-wide state.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Where revenue without a feature lands, and whether feature-attributed
/// revenue is joined to its feature bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevenueJoin {
    /// Revenue carrying a feature goes to that feature's bucket; the rest goes
    /// to the customer-level bucket.
    #[default]
    Feature,
    /// All revenue goes to the customer-level bucket.
    Customer,
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Normalizer settings.
    pub normalizer: NormalizerConfig,

    /// Insight rule thresholds.
    pub thresholds: InsightThresholds,

    /// Days covered by the default query range (ending today, inclusive).
    pub default_range_days: u32,

    /// Most days a single query range may cover.
    pub max_range_days: u32,

    /// Days of aggregates the insight rules look at (ending at the evaluation date).
    pub insight_window_days: u32,

    /// Revenue join mode used when rebuilding aggregates.
    pub revenue_join: RevenueJoin,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            normalizer: NormalizerConfig::default(),
            thresholds: InsightThresholds::default(),
            default_range_days: 30,
            max_range_days: 366,
            insight_window_days: 30,
            revenue_join: RevenueJoin::Feature,
        }
    }
}

/// Normalizer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizerConfig {
    /// Lowercase ISO code every revenue record must be denominated in.
    pub reporting_currency: String,

    /// Unit costs for usage records that do not carry one.
    pub pricing: PricingTable,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            reporting_currency: "usd".to_string(),
            pricing: PricingTable::default(),
        }
    }
}

/// Model name to per-unit cost.
///
/// Lookups fall back to the longest configured prefix, so `gpt-4-0613`
/// is priced as `gpt-4` unless listed on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, Decimal>",
    into = "BTreeMap<String, Decimal>"
)]
pub struct PricingTable(BTreeMap<String, Decimal>);

impl From<BTreeMap<String, Decimal>> for PricingTable {
    fn from(entries: BTreeMap<String, Decimal>) -> Self {
        Self::from_entries(entries)
    }
}

impl From<PricingTable> for BTreeMap<String, Decimal> {
    fn from(table: PricingTable) -> Self {
        table.0
    }
}

impl PricingTable {
    /// An empty table: every lookup misses.
    #[must_use]
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Build a table from `(model, unit cost)` pairs.
    #[must_use]
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: Into<String>,
    {
        Self(
            entries
                .into_iter()
                .map(|(model, cost)| (model.into().to_ascii_lowercase(), cost))
                .collect(),
        )
    }

    /// Unit cost for `model`, if known.
    #[must_use]
    pub fn unit_cost(&self, model: &str) -> Option<Decimal> {
        let model = model.to_ascii_lowercase();
        if let Some(cost) = self.0.get(&model) {
            return Some(*cost);
        }
        self.0
            .iter()
            .filter(|(name, _)| model.starts_with(name.as_str()))
            .max_by_key(|(name, _)| name.len())
            .map(|(_, cost)| *cost)
    }

    /// Number of priced models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for PricingTable {
    /// Blended per-token prices for the common `OpenAI` models.
    fn default() -> Self {
        Self::from_entries([
            ("gpt-4", Decimal::new(3, 5)),
            ("gpt-3.5-turbo", Decimal::new(2, 6)),
            ("text-embedding-ada-002", Decimal::new(1, 7)),
        ])
    }
}

/// Thresholds for the insight rules.
///
/// Deserializes from partial JSON: missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightThresholds {
    /// Revenue per usage unit below which a customer is unprofitable.
    pub min_revenue_per_unit: Decimal,

    /// Customers must use strictly more than this to be checked for profitability.
    pub unprofitable_customer_min_usage: Decimal,

    /// Feature margin (percent) below which a feature is flagged.
    pub unprofitable_feature_margin_percent: Decimal,

    /// Fraction of the usage limit at which a customer is flagged.
    pub fair_use_ratio: Decimal,

    /// Case-insensitive substrings that mark a feature as legacy.
    pub legacy_markers: Vec<String>,

    /// Feature names that are legacy regardless of markers.
    pub legacy_features: Vec<String>,

    /// Share of total usage (percent) legacy features may reach before flagging.
    pub legacy_usage_share_percent: Decimal,
}

impl Default for InsightThresholds {
    fn default() -> Self {
        Self {
            min_revenue_per_unit: Decimal::new(1, 3),
            unprofitable_customer_min_usage: Decimal::ZERO,
            unprofitable_feature_margin_percent: Decimal::new(-10, 0),
            fair_use_ratio: Decimal::new(9, 1),
            legacy_markers: vec!["legacy".to_string(), "v1".to_string()],
            legacy_features: Vec::new(),
            legacy_usage_share_percent: Decimal::new(20, 0),
        }
    }
}

impl InsightThresholds {
    /// Whether `feature` counts as legacy.
    #[must_use]
    pub fn is_legacy_feature(&self, feature: &str) -> bool {
        let lowered = feature.to_ascii_lowercase();
        self.legacy_features
            .iter()
            .any(|name| name.eq_ignore_ascii_case(feature))
            || self
                .legacy_markers
                .iter()
                .filter(|marker| !marker.is_empty())
                .any(|marker| lowered.contains(&marker.to_ascii_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn pricing_exact_and_prefix() {
        let table = PricingTable::default();
        assert_eq!(table.unit_cost("gpt-4"), Some(d("0.00003")));
        assert_eq!(table.unit_cost("GPT-4-0613"), Some(d("0.00003")));
        assert_eq!(table.unit_cost("gpt-3.5-turbo-16k"), Some(d("0.000002")));
        assert_eq!(table.unit_cost("claude-3-opus"), None);
        assert_eq!(PricingTable::empty().unit_cost("gpt-4"), None);
    }

    #[test]
    fn pricing_prefers_longest_prefix() {
        let table = PricingTable::from_entries([("gpt-4", d("1")), ("gpt-4o", d("2"))]);
        assert_eq!(table.unit_cost("gpt-4o-mini"), Some(d("2")));
        assert_eq!(table.unit_cost("gpt-4-turbo"), Some(d("1")));
    }

    #[test]
    fn thresholds_defaults() {
        let t = InsightThresholds::default();
        assert_eq!(t.min_revenue_per_unit, d("0.001"));
        assert_eq!(t.unprofitable_feature_margin_percent, d("-10"));
        assert_eq!(t.fair_use_ratio, d("0.9"));
        assert_eq!(t.legacy_usage_share_percent, d("20"));
    }

    #[test]
    fn thresholds_partial_json() {
        let t: InsightThresholds =
            serde_json::from_str(r#"{"fair_use_ratio": "0.8", "legacy_features": ["davinci"]}"#)
                .unwrap();
        assert_eq!(t.fair_use_ratio, d("0.8"));
        assert_eq!(t.min_revenue_per_unit, d("0.001"));
        assert!(t.is_legacy_feature("Davinci"));
        assert!(t.is_legacy_feature("search-v1"));
        assert!(t.is_legacy_feature("Legacy-Completions"));
        assert!(!t.is_legacy_feature("gpt-4"));
    }

    #[test]
    fn pricing_from_json() {
        let table: PricingTable =
            serde_json::from_str(r#"{"Claude-3-Opus": "0.000015", "gpt-4": 0.00003}"#).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.unit_cost("gpt-4"), Some(d("0.00003")));
        assert_eq!(table.unit_cost("claude-3-opus-20240229"), Some(d("0.000015")));
    }
}
