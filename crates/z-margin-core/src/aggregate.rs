//! Daily aggregate rows.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::{margin_percent, margin_ratio};
use crate::CustomerId;

/// Aggregation key: `(customer, feature-or-null, date)`.
///
/// Ordering is customer, then feature (customer-level `None` first), then date.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BucketKey {
    /// Customer the bucket belongs to.
    pub customer_id: CustomerId,
    /// Feature name, or `None` for the customer-level bucket.
    pub feature: Option<String>,
    /// UTC calendar date.
    pub date: NaiveDate,
}

impl BucketKey {
    /// Create a bucket key.
    #[must_use]
    pub fn new(customer_id: CustomerId, feature: Option<String>, date: NaiveDate) -> Self {
        Self {
            customer_id,
            feature,
            date,
        }
    }
}

/// Summed usage and revenue for one bucket.
///
/// Only the inputs are stored. Profit and margin are always derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyAggregate {
    /// Customer the bucket belongs to.
    pub customer_id: CustomerId,

    /// Feature name, or `None` for customer-level revenue.
    pub feature: Option<String>,

    /// UTC calendar date.
    pub date: NaiveDate,

    /// Sum of usage quantities.
    pub usage_quantity: Decimal,

    /// Number of usage events folded into this bucket.
    pub usage_events: u64,

    /// Sum of `quantity × unit_cost` over usage events.
    pub usage_cost: Decimal,

    /// Sum of signed revenue amounts.
    pub revenue: Decimal,
}

impl DailyAggregate {
    /// An empty bucket for `key`.
    #[must_use]
    pub fn empty(key: BucketKey) -> Self {
        Self {
            customer_id: key.customer_id,
            feature: key.feature,
            date: key.date,
            usage_quantity: Decimal::ZERO,
            usage_events: 0,
            usage_cost: Decimal::ZERO,
            revenue: Decimal::ZERO,
        }
    }

    /// The bucket key of this row.
    #[must_use]
    pub fn key(&self) -> BucketKey {
        BucketKey::new(self.customer_id, self.feature.clone(), self.date)
    }

    /// `revenue − usage_cost`.
    #[must_use]
    pub fn profit(&self) -> Decimal {
        self.revenue.saturating_sub(self.usage_cost)
    }

    /// `profit / revenue`, or zero when revenue is zero.
    #[must_use]
    pub fn margin(&self) -> Decimal {
        margin_ratio(self.profit(), self.revenue)
    }

    /// Margin as a percentage.
    #[must_use]
    pub fn margin_percent(&self) -> Decimal {
        margin_percent(self.profit(), self.revenue)
    }

    /// Whether this is a customer-level (feature-less) bucket.
    #[must_use]
    pub fn is_customer_level(&self) -> bool {
        self.feature.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn derived_metrics() {
        let mut row = DailyAggregate::empty(BucketKey::new(
            CustomerId::generate(),
            Some("gpt-4".into()),
            date("2024-01-01"),
        ));
        row.usage_cost = d("0.20");
        row.revenue = d("50.00");

        assert_eq!(row.profit(), d("49.80"));
        assert_eq!(row.margin(), d("0.996"));
        assert_eq!(row.margin_percent(), d("99.6"));
    }

    #[test]
    fn zero_revenue_margin_is_zero() {
        let mut row = DailyAggregate::empty(BucketKey::new(
            CustomerId::generate(),
            None,
            date("2024-01-01"),
        ));
        row.usage_cost = d("3");
        assert_eq!(row.profit(), d("-3"));
        assert_eq!(row.margin(), Decimal::ZERO);
        assert!(row.is_customer_level());
    }

    #[test]
    fn customer_level_key_sorts_first() {
        let customer = CustomerId::generate();
        let day = date("2024-01-02");
        let customer_level = BucketKey::new(customer, None, day);
        let feature = BucketKey::new(customer, Some("a".into()), date("2024-01-01"));
        assert!(customer_level < feature);
    }
}
