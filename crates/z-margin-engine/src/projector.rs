//! Dashboard views over daily aggregates.
//!
//! All three projections are pure functions of the aggregate rows and the
//! requested range; rows dated outside the range are ignored.
//!
//! # Revenue apportionment
//!
//! Billing sources often report revenue per customer only. For the feature
//! table, each customer's customer-level revenue in the range is split across
//! that customer's features in proportion to each feature's share of the
//! customer's usage cost in the same range. Shares are rounded to
//! [`MONEY_SCALE`] places and the rounding remainder goes to the customer's
//! last feature by name, so the apportioned total is exact.
//!
//! This is an approximation, not a join: a usage burst inside the range draws
//! revenue that may have paid for a different period. Revenue of customers
//! with no usage cost in the range cannot be apportioned and is reported as
//! `unattributed_revenue`.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use z_margin_core::{
    margin_percent, saturating_sum, CustomerId, DailyAggregate, DateRange, MONEY_SCALE,
};

/// Range totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Sum of usage cost.
    pub total_usage_cost: Decimal,
    /// Sum of signed revenue.
    pub total_revenue: Decimal,
    /// `total_revenue − total_usage_cost`.
    pub total_profit: Decimal,
    /// `total_profit / total_revenue × 100`, or 0 when revenue is 0.
    pub profit_margin_percentage: Decimal,
    /// First day of the range.
    pub start_date: NaiveDate,
    /// Last day of the range.
    pub end_date: NaiveDate,
}

/// One row of the feature table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureMetrics {
    /// Feature name.
    pub feature: String,
    /// Sum of usage quantities.
    pub usage_count: Decimal,
    /// Sum of usage cost.
    pub total_cost: Decimal,
    /// Direct plus apportioned revenue.
    pub revenue: Decimal,
    /// Revenue attributed to the feature by the billing source.
    pub direct_revenue: Decimal,
    /// Customer-level revenue apportioned to the feature.
    pub apportioned_revenue: Decimal,
    /// `revenue − total_cost`.
    pub profit: Decimal,
    /// Margin percentage, 0 when revenue is 0.
    pub profit_margin: Decimal,
}

/// Feature table with its summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureMetricsView {
    /// One row per feature, ordered by name.
    pub features: Vec<FeatureMetrics>,
    /// Range totals.
    pub summary: Summary,
    /// Customer-level revenue that could not be apportioned.
    pub unattributed_revenue: Decimal,
}

/// One day of the time series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeSeriesPoint {
    /// Calendar day.
    pub date: NaiveDate,
    /// Usage cost that day.
    pub usage_cost: Decimal,
    /// Revenue that day.
    pub revenue: Decimal,
    /// `revenue − usage_cost`.
    pub profit: Decimal,
}

/// The three views together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    /// Range totals.
    pub summary: Summary,
    /// Feature table.
    pub feature_metrics: Vec<FeatureMetrics>,
    /// Daily series.
    pub time_series: Vec<TimeSeriesPoint>,
}

fn in_range<'a>(
    rows: &'a [DailyAggregate],
    range: &'a DateRange,
) -> impl Iterator<Item = &'a DailyAggregate> + 'a {
    rows.iter().filter(move |row| range.contains(row.date))
}

/// Range totals.
#[must_use]
pub fn summary(rows: &[DailyAggregate], range: &DateRange) -> Summary {
    let (cost, revenue) = in_range(rows, range).fold(
        (Decimal::ZERO, Decimal::ZERO),
        |(cost, revenue), row| {
            (
                cost.saturating_add(row.usage_cost),
                revenue.saturating_add(row.revenue),
            )
        },
    );
    let profit = revenue.saturating_sub(cost);
    Summary {
        total_usage_cost: cost,
        total_revenue: revenue,
        total_profit: profit,
        profit_margin_percentage: margin_percent(profit, revenue),
        start_date: range.start,
        end_date: range.end,
    }
}

/// One zero-filled point per calendar day in `range`.
#[must_use]
pub fn time_series(rows: &[DailyAggregate], range: &DateRange) -> Vec<TimeSeriesPoint> {
    let mut days: BTreeMap<NaiveDate, (Decimal, Decimal)> = range
        .days()
        .map(|day| (day, (Decimal::ZERO, Decimal::ZERO)))
        .collect();

    for row in in_range(rows, range) {
        if let Some((cost, revenue)) = days.get_mut(&row.date) {
            *cost = cost.saturating_add(row.usage_cost);
            *revenue = revenue.saturating_add(row.revenue);
        }
    }

    days.into_iter()
        .map(|(date, (usage_cost, revenue))| TimeSeriesPoint {
            date,
            usage_cost,
            revenue,
            profit: revenue.saturating_sub(usage_cost),
        })
        .collect()
}

#[derive(Default)]
struct FeatureTotals {
    usage_count: Decimal,
    total_cost: Decimal,
    direct_revenue: Decimal,
    apportioned_revenue: Decimal,
}

#[derive(Default)]
struct CustomerTotals {
    unattributed: Decimal,
    cost_by_feature: BTreeMap<String, Decimal>,
}

/// Feature table with apportioned customer-level revenue.
#[must_use]
pub fn feature_metrics(rows: &[DailyAggregate], range: &DateRange) -> FeatureMetricsView {
    let mut features: BTreeMap<String, FeatureTotals> = BTreeMap::new();
    let mut customers: BTreeMap<CustomerId, CustomerTotals> = BTreeMap::new();

    for row in in_range(rows, range) {
        let customer = customers.entry(row.customer_id).or_default();
        match &row.feature {
            None => customer.unattributed = customer.unattributed.saturating_add(row.revenue),
            Some(name) => {
                let totals = features.entry(name.clone()).or_default();
                totals.usage_count = totals.usage_count.saturating_add(row.usage_quantity);
                totals.total_cost = totals.total_cost.saturating_add(row.usage_cost);
                totals.direct_revenue = totals.direct_revenue.saturating_add(row.revenue);
                let cost = customer.cost_by_feature.entry(name.clone()).or_default();
                *cost = cost.saturating_add(row.usage_cost);
            }
        }
    }

    let mut unattributed_revenue = Decimal::ZERO;
    for totals in customers.values() {
        if totals.unattributed.is_zero() {
            continue;
        }
        let shares = apportion(totals.unattributed, &totals.cost_by_feature);
        if shares.is_empty() {
            unattributed_revenue = unattributed_revenue.saturating_add(totals.unattributed);
        }
        for (feature, share) in shares {
            if let Some(feature_totals) = features.get_mut(feature) {
                feature_totals.apportioned_revenue =
                    feature_totals.apportioned_revenue.saturating_add(share);
            }
        }
    }

    let features = features
        .into_iter()
        .map(|(feature, totals)| {
            let revenue = totals.direct_revenue.saturating_add(totals.apportioned_revenue);
            let profit = revenue.saturating_sub(totals.total_cost);
            FeatureMetrics {
                feature,
                usage_count: totals.usage_count,
                total_cost: totals.total_cost,
                revenue,
                direct_revenue: totals.direct_revenue,
                apportioned_revenue: totals.apportioned_revenue,
                profit,
                profit_margin: margin_percent(profit, revenue),
            }
        })
        .collect();

    FeatureMetricsView {
        features,
        summary: summary(rows, range),
        unattributed_revenue,
    }
}

/// Split `amount` across features by cost share.
///
/// Returns nothing when no feature has a positive cost.
fn apportion(amount: Decimal, cost_by_feature: &BTreeMap<String, Decimal>) -> Vec<(&str, Decimal)> {
    let weighted: Vec<(&str, Decimal)> = cost_by_feature
        .iter()
        .filter(|(_, cost)| cost.is_sign_positive() && !cost.is_zero())
        .map(|(name, cost)| (name.as_str(), *cost))
        .collect();
    let total = saturating_sum(weighted.iter().map(|(_, cost)| *cost));
    let Some(((last, _), rest)) = weighted.split_last() else {
        return Vec::new();
    };

    let mut shares = Vec::with_capacity(weighted.len());
    let mut assigned = Decimal::ZERO;
    for (name, cost) in rest {
        // The cost share is at most one, so scaling the amount by it stays in range.
        let fraction = cost.checked_div(total).unwrap_or(Decimal::ZERO);
        let share = amount.saturating_mul(fraction).round_dp(MONEY_SCALE);
        assigned = assigned.saturating_add(share);
        shares.push((*name, share));
    }
    shares.push((*last, amount.saturating_sub(assigned)));
    shares
}

/// All three views for `range`.
#[must_use]
pub fn dashboard(rows: &[DailyAggregate], range: &DateRange) -> Dashboard {
    let view = feature_metrics(rows, range);
    Dashboard {
        summary: view.summary,
        feature_metrics: view.features,
        time_series: time_series(rows, range),
    }
}
