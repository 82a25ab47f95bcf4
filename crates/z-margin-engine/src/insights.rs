//! Threshold rules over daily aggregates.
//!
//! Rules run in [`InsightRule::ORDERED`] order and each emits its flags in
//! ascending subject order, so two evaluations over the same inputs produce the
//! same flags apart from IDs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use z_margin_core::{
    saturating_div, saturating_sum, Customer, CustomerId, DailyAggregate, DateRange,
    InsightFlag, InsightRule,
};

use crate::config::InsightThresholds;
use crate::projector;

/// Subject of the legacy concentration flag.
pub const LEGACY_SUBJECT: &str = "legacy_features";

#[derive(Default)]
struct CustomerUsage {
    quantity: Decimal,
    revenue: Decimal,
}

/// Evaluate every rule over the aggregates dated inside `window`.
///
/// Customer rules only consider active customers present in `customers`.
#[must_use]
pub fn evaluate(
    aggregates: &[DailyAggregate],
    customers: &[Customer],
    thresholds: &InsightThresholds,
    window: &DateRange,
    generated_at: DateTime<Utc>,
) -> Vec<InsightFlag> {
    let rows: Vec<DailyAggregate> = aggregates
        .iter()
        .filter(|row| window.contains(row.date))
        .cloned()
        .collect();
    let directory: BTreeMap<CustomerId, &Customer> =
        customers.iter().map(|c| (c.id, c)).collect();

    let mut usage: BTreeMap<CustomerId, CustomerUsage> = BTreeMap::new();
    for row in &rows {
        let entry = usage.entry(row.customer_id).or_default();
        entry.quantity = entry.quantity.saturating_add(row.usage_quantity);
        entry.revenue = entry.revenue.saturating_add(row.revenue);
    }
    let active: Vec<(&Customer, &CustomerUsage)> = usage
        .iter()
        .filter_map(|(id, totals)| {
            directory
                .get(id)
                .filter(|customer| customer.active)
                .map(|customer| (*customer, totals))
        })
        .collect();

    let mut flags = Vec::new();
    for rule in InsightRule::ORDERED {
        match rule {
            InsightRule::UnprofitableCustomer => {
                flags.extend(unprofitable_customers(&active, thresholds, generated_at));
            }
            InsightRule::UnprofitableFeature => {
                flags.extend(unprofitable_features(&rows, window, thresholds, generated_at));
            }
            InsightRule::FairUseExceeded => {
                flags.extend(fair_use(&active, thresholds, generated_at));
            }
            InsightRule::LegacyConcentration => {
                flags.extend(legacy_concentration(
                    &rows,
                    customers,
                    thresholds,
                    generated_at,
                ));
            }
        }
    }

    tracing::debug!(
        start = %window.start,
        end = %window.end,
        rows = rows.len(),
        flags = flags.len(),
        "Evaluated insight rules"
    );
    flags
}

fn unprofitable_customers(
    active: &[(&Customer, &CustomerUsage)],
    thresholds: &InsightThresholds,
    generated_at: DateTime<Utc>,
) -> Vec<InsightFlag> {
    active
        .iter()
        .filter(|(_, totals)| {
            totals.quantity > thresholds.unprofitable_customer_min_usage
                && totals.quantity > Decimal::ZERO
                && totals.revenue
                    < totals.quantity.saturating_mul(thresholds.min_revenue_per_unit)
        })
        .map(|(customer, totals)| {
            let per_unit = saturating_div(totals.revenue, totals.quantity);
            InsightFlag::new(
                InsightRule::UnprofitableCustomer,
                customer.id.to_string(),
                generated_at,
                format!("High usage, low revenue: {}", customer.name),
                format!(
                    "{} used {} units but generated ${:.2} (Revenue/Unit: ${:.6}, floor ${})",
                    customer.name,
                    totals.quantity.normalize(),
                    totals.revenue,
                    per_unit,
                    thresholds.min_revenue_per_unit.normalize(),
                ),
            )
            .with_metric(format!("revenue_per_unit={per_unit:.6}"))
            .with_customer(customer.id)
        })
        .collect()
}

fn unprofitable_features(
    rows: &[DailyAggregate],
    window: &DateRange,
    thresholds: &InsightThresholds,
    generated_at: DateTime<Utc>,
) -> Vec<InsightFlag> {
    projector::feature_metrics(rows, window)
        .features
        .into_iter()
        .filter(|feature| feature.profit_margin < thresholds.unprofitable_feature_margin_percent)
        .map(|feature| {
            InsightFlag::new(
                InsightRule::UnprofitableFeature,
                feature.feature.clone(),
                generated_at,
                format!("Unprofitable feature: {}", feature.feature),
                format!(
                    "Feature {} costs ${:.2} but generates ${:.2} (Loss: ${:.2})",
                    feature.feature, feature.total_cost, feature.revenue, -feature.profit,
                ),
            )
            .with_metric(format!("margin={:.2}%", feature.profit_margin))
        })
        .collect()
}

fn fair_use(
    active: &[(&Customer, &CustomerUsage)],
    thresholds: &InsightThresholds,
    generated_at: DateTime<Utc>,
) -> Vec<InsightFlag> {
    active
        .iter()
        .filter_map(|(customer, totals)| {
            let limit = customer.usage_limit.filter(|l| *l > Decimal::ZERO)?;
            (totals.quantity >= thresholds.fair_use_ratio.saturating_mul(limit)).then(|| {
                let used =
                    saturating_div(totals.quantity, limit).saturating_mul(Decimal::ONE_HUNDRED);
                InsightFlag::new(
                    InsightRule::FairUseExceeded,
                    customer.id.to_string(),
                    generated_at,
                    format!("Fair use threshold reached: {}", customer.name),
                    format!(
                        "{} used {} of {} units ({:.1}% of limit)",
                        customer.name,
                        totals.quantity.normalize(),
                        limit.normalize(),
                        used,
                    ),
                )
                .with_metric(format!("limit_used={used:.1}%"))
                .with_customer(customer.id)
            })
        })
        .collect()
}

fn legacy_concentration(
    rows: &[DailyAggregate],
    customers: &[Customer],
    thresholds: &InsightThresholds,
    generated_at: DateTime<Utc>,
) -> Option<InsightFlag> {
    let mut total = Decimal::ZERO;
    let mut legacy: BTreeMap<&str, Decimal> = BTreeMap::new();
    for row in rows {
        let Some(feature) = row.feature.as_deref() else {
            continue;
        };
        total = total.saturating_add(row.usage_quantity);
        if thresholds.is_legacy_feature(feature) {
            let quantity = legacy.entry(feature).or_default();
            *quantity = quantity.saturating_add(row.usage_quantity);
        }
    }

    if total <= Decimal::ZERO {
        return None;
    }
    let legacy_total = saturating_sum(legacy.values().copied());
    let share = saturating_div(legacy_total, total).saturating_mul(Decimal::ONE_HUNDRED);
    if share <= thresholds.legacy_usage_share_percent {
        return None;
    }

    let names: Vec<&str> = legacy.keys().copied().collect();
    let legacy_plans = customers
        .iter()
        .filter(|c| c.active && c.is_legacy_plan())
        .count();
    Some(
        InsightFlag::new(
            InsightRule::LegacyConcentration,
            LEGACY_SUBJECT,
            generated_at,
            "Legacy feature concentration",
            format!(
                "Legacy features ({}) account for {:.1}% of usage; {} active customer(s) on legacy plans",
                names.join(", "),
                share,
                legacy_plans,
            ),
        )
        .with_metric(format!("legacy_share={share:.1}%")),
    )
}
