//! Daily bucketing of normalized events.
//!
//! Aggregates are always derived fresh from the full event set of a range,
//! never patched incrementally, so running [`aggregate`] twice over the same
//! events yields identical rows.

use std::collections::BTreeMap;

use z_margin_core::{BucketKey, DailyAggregate, DateRange, NormalizedEvent};

use crate::config::RevenueJoin;

/// Bucket `events` into daily aggregates for `range`.
///
/// - Usage goes to `(customer, Some(feature), date)` and adds
///   `quantity × unit_cost` to `usage_cost`.
/// - Revenue is signed by event type. Under [`RevenueJoin::Feature`] revenue
///   with a feature goes to that feature's bucket; everything else goes to the
///   customer-level `(customer, None, date)` bucket.
/// - Events dated outside `range` are ignored.
/// - An event whose cost or bucket total would leave the `Decimal` range is
///   skipped and logged; the rest of the range still aggregates.
///
/// Rows are returned in bucket-key order.
#[must_use]
pub fn aggregate(
    events: &[NormalizedEvent],
    range: &DateRange,
    join: RevenueJoin,
) -> Vec<DailyAggregate> {
    let mut buckets: BTreeMap<BucketKey, DailyAggregate> = BTreeMap::new();

    for event in events {
        let date = event.date();
        if !range.contains(date) {
            continue;
        }

        match event {
            NormalizedEvent::Usage(usage) => {
                let Some(cost) = usage.cost() else {
                    skip_out_of_range(event);
                    continue;
                };
                let key = BucketKey::new(usage.customer_id, Some(usage.feature.clone()), date);
                let row = buckets
                    .entry(key.clone())
                    .or_insert_with(|| DailyAggregate::empty(key));
                match (
                    row.usage_quantity.checked_add(usage.quantity),
                    row.usage_cost.checked_add(cost),
                ) {
                    (Some(quantity), Some(cost)) => {
                        row.usage_quantity = quantity;
                        row.usage_cost = cost;
                        row.usage_events += 1;
                    }
                    _ => skip_out_of_range(event),
                }
            }
            NormalizedEvent::Revenue(revenue) => {
                let feature = match join {
                    RevenueJoin::Feature => revenue.feature.clone(),
                    RevenueJoin::Customer => None,
                };
                let key = BucketKey::new(revenue.customer_id, feature, date);
                let row = buckets
                    .entry(key.clone())
                    .or_insert_with(|| DailyAggregate::empty(key));
                match row.revenue.checked_add(revenue.signed_amount()) {
                    Some(total) => row.revenue = total,
                    None => skip_out_of_range(event),
                }
            }
        }
    }

    buckets.into_values().collect()
}

fn skip_out_of_range(event: &NormalizedEvent) {
    tracing::warn!(
        event_id = %event.event_id(),
        date = %event.date(),
        "Skipped event: amount out of range"
    );
}
