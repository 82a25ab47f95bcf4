//! In-memory storage implementation.
//!
//! All state sits behind a single `RwLock`, so each trait method is atomic
//! with respect to every other.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::NaiveDate;
use z_margin_core::{
    Customer, CustomerId, DailyAggregate, DateRange, InsightFlag, NormalizedEvent, SourceKind,
};

use crate::error::{Result, StoreError};
use crate::{CustomerDirectory, Store};

#[derive(Default)]
struct Inner {
    customers: BTreeMap<CustomerId, Customer>,
    source_keys: HashMap<(SourceKind, String), CustomerId>,
    events: BTreeMap<NaiveDate, Vec<NormalizedEvent>>,
    event_ids: HashSet<String>,
    aggregates: BTreeMap<NaiveDate, Vec<DailyAggregate>>,
    insights: Vec<InsightFlag>,
}

/// Memory-backed storage implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Database("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Database("store lock poisoned".to_string()))
    }
}

impl CustomerDirectory for MemoryStore {
    fn get_customer(&self, id: &CustomerId) -> Result<Option<Customer>> {
        Ok(self.read()?.customers.get(id).cloned())
    }

    fn customer_for_key(&self, source: SourceKind, source_key: &str) -> Result<Option<Customer>> {
        let inner = self.read()?;
        Ok(inner
            .source_keys
            .get(&(source, source_key.to_string()))
            .and_then(|id| inner.customers.get(id))
            .cloned())
    }

    fn insert_customer_if_absent(&self, customer: Customer) -> Result<(Customer, bool)> {
        let mut inner = self.write()?;
        let alias = (customer.source, customer.source_key.clone());

        if let Some(existing) = inner
            .source_keys
            .get(&alias)
            .and_then(|id| inner.customers.get(id))
        {
            return Ok((existing.clone(), false));
        }

        inner.source_keys.insert(alias, customer.id);
        inner.customers.insert(customer.id, customer.clone());
        Ok((customer, true))
    }

    fn link_source_key(
        &self,
        source: SourceKind,
        source_key: &str,
        id: &CustomerId,
    ) -> Result<()> {
        let mut inner = self.write()?;
        if !inner.customers.contains_key(id) {
            return Err(StoreError::NotFound);
        }
        inner.source_keys.insert((source, source_key.to_string()), *id);
        Ok(())
    }

    fn update_customer(&self, customer: &Customer) -> Result<()> {
        let mut inner = self.write()?;
        let slot = inner
            .customers
            .get_mut(&customer.id)
            .ok_or(StoreError::NotFound)?;
        *slot = customer.clone();
        Ok(())
    }

    fn list_customers(&self) -> Result<Vec<Customer>> {
        Ok(self.read()?.customers.values().cloned().collect())
    }
}

impl Store for MemoryStore {
    // =========================================================================
    // Event Log
    // =========================================================================

    fn insert_event(&self, event: &NormalizedEvent) -> Result<bool> {
        let mut inner = self.write()?;
        if !inner.event_ids.insert(event.event_id().to_string()) {
            return Ok(false);
        }
        inner
            .events
            .entry(event.date())
            .or_default()
            .push(event.clone());
        Ok(true)
    }

    fn has_event(&self, event_id: &str) -> Result<bool> {
        Ok(self.read()?.event_ids.contains(event_id))
    }

    fn events_in_range(&self, range: &DateRange) -> Result<Vec<NormalizedEvent>> {
        let inner = self.read()?;
        Ok(inner
            .events
            .range(range.start..=range.end)
            .flat_map(|(_, events)| events.iter().cloned())
            .collect())
    }

    // =========================================================================
    // Aggregates
    // =========================================================================

    fn replace_aggregates(&self, range: &DateRange, rows: &[DailyAggregate]) -> Result<()> {
        let mut grouped: BTreeMap<NaiveDate, Vec<DailyAggregate>> = BTreeMap::new();
        for row in rows.iter().filter(|row| range.contains(row.date)) {
            grouped.entry(row.date).or_default().push(row.clone());
        }

        let mut inner = self.write()?;
        let stale: Vec<NaiveDate> = inner
            .aggregates
            .range(range.start..=range.end)
            .map(|(date, _)| *date)
            .collect();
        for date in stale {
            inner.aggregates.remove(&date);
        }
        inner.aggregates.extend(grouped);

        tracing::trace!(
            start = %range.start,
            end = %range.end,
            rows = rows.len(),
            "Replaced aggregates"
        );
        Ok(())
    }

    fn aggregates_in_range(&self, range: &DateRange) -> Result<Vec<DailyAggregate>> {
        let mut rows: Vec<DailyAggregate> = {
            let inner = self.read()?;
            inner
                .aggregates
                .range(range.start..=range.end)
                .flat_map(|(_, rows)| rows.iter().cloned())
                .collect()
        };
        rows.sort_by_key(DailyAggregate::key);
        Ok(rows)
    }

    // =========================================================================
    // Insights
    // =========================================================================

    fn replace_insights(&self, flags: &[InsightFlag]) -> Result<()> {
        self.write()?.insights = flags.to_vec();
        Ok(())
    }

    fn list_insights(&self) -> Result<Vec<InsightFlag>> {
        Ok(self.read()?.insights.clone())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use z_margin_core::{BucketKey, RevenueEvent, RevenueEventType, UsageEvent};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn usage(id: &str, customer_id: CustomerId, day: u32) -> NormalizedEvent {
        NormalizedEvent::Usage(UsageEvent {
            event_id: id.to_string(),
            customer_id,
            feature: "gpt-4".into(),
            quantity: Decimal::from(10),
            unit_cost: Decimal::ONE,
            occurred_at: Utc.with_ymd_and_hms(2024, 1, day, 8, 0, 0).unwrap(),
            source: SourceKind::Metering,
            metadata: serde_json::Value::Null,
        })
    }

    fn row(customer_id: CustomerId, feature: Option<&str>, day: &str) -> DailyAggregate {
        let mut row =
            DailyAggregate::empty(BucketKey::new(customer_id, feature.map(String::from), date(day)));
        row.revenue = Decimal::from(5);
        row
    }

    #[test]
    fn insert_customer_once_per_alias() {
        let store = MemoryStore::new();
        let (first, created) = store
            .insert_customer_if_absent(Customer::new(SourceKind::Stripe, "cus_1"))
            .unwrap();
        assert!(created);

        let (second, created) = store
            .insert_customer_if_absent(Customer::new(SourceKind::Stripe, "cus_1"))
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(store.list_customers().unwrap().len(), 1);
    }

    #[test]
    fn link_alias_to_existing_customer() {
        let store = MemoryStore::new();
        let (customer, _) = store
            .insert_customer_if_absent(Customer::new(SourceKind::Stripe, "cus_1"))
            .unwrap();

        store
            .link_source_key(SourceKind::OpenAi, "proj_1", &customer.id)
            .unwrap();
        let found = store.customer_for_key(SourceKind::OpenAi, "proj_1").unwrap();
        assert_eq!(found.map(|c| c.id), Some(customer.id));

        let missing = store.link_source_key(SourceKind::OpenAi, "proj_2", &CustomerId::generate());
        assert!(matches!(missing, Err(StoreError::NotFound)));
    }

    #[test]
    fn update_missing_customer_fails() {
        let store = MemoryStore::new();
        let customer = Customer::new(SourceKind::Lago, "ext");
        assert!(matches!(
            store.update_customer(&customer),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn events_are_deduplicated_and_range_scanned() {
        let store = MemoryStore::new();
        let customer = CustomerId::generate();

        assert!(store.insert_event(&usage("e1", customer, 1)).unwrap());
        assert!(!store.insert_event(&usage("e1", customer, 1)).unwrap());
        assert!(store.insert_event(&usage("e2", customer, 3)).unwrap());
        assert!(store.has_event("e2").unwrap());

        let range = DateRange::new(date("2024-01-01"), date("2024-01-02")).unwrap();
        let events = store.events_in_range(&range).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id(), "e1");
    }

    #[test]
    fn replace_aggregates_removes_stale_buckets() {
        let store = MemoryStore::new();
        let customer = CustomerId::generate();
        let range = DateRange::new(date("2024-01-01"), date("2024-01-03")).unwrap();

        store
            .replace_aggregates(
                &range,
                &[
                    row(customer, Some("a"), "2024-01-01"),
                    row(customer, None, "2024-01-02"),
                    row(customer, Some("b"), "2024-01-03"),
                ],
            )
            .unwrap();
        assert_eq!(store.aggregates_in_range(&range).unwrap().len(), 3);

        let narrow = DateRange::single(date("2024-01-02"));
        store.replace_aggregates(&narrow, &[]).unwrap();

        let rows = store.aggregates_in_range(&range).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.date != date("2024-01-02")));
    }

    #[test]
    fn replace_ignores_rows_outside_range() {
        let store = MemoryStore::new();
        let customer = CustomerId::generate();
        let range = DateRange::single(date("2024-01-01"));

        store
            .replace_aggregates(&range, &[row(customer, None, "2024-02-01")])
            .unwrap();
        let everything = DateRange::new(date("2024-01-01"), date("2024-12-31")).unwrap();
        assert!(store.aggregates_in_range(&everything).unwrap().is_empty());
    }

    #[test]
    fn aggregates_sorted_by_key() {
        let store = MemoryStore::new();
        let customer = CustomerId::generate();
        let range = DateRange::new(date("2024-01-01"), date("2024-01-02")).unwrap();

        store
            .replace_aggregates(
                &range,
                &[
                    row(customer, Some("b"), "2024-01-01"),
                    row(customer, Some("a"), "2024-01-02"),
                    row(customer, None, "2024-01-01"),
                ],
            )
            .unwrap();

        let keys: Vec<_> = store
            .aggregates_in_range(&range)
            .unwrap()
            .iter()
            .map(DailyAggregate::key)
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn insights_are_replaced() {
        use z_margin_core::InsightRule;

        let store = MemoryStore::new();
        let flag = |subject: &str| {
            InsightFlag::new(
                InsightRule::UnprofitableFeature,
                subject,
                Utc::now(),
                "t",
                "d",
            )
        };

        store.replace_insights(&[flag("a"), flag("b")]).unwrap();
        store.replace_insights(&[flag("c")]).unwrap();

        let active = store.list_insights().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].subject, "c");
    }

    #[test]
    fn revenue_events_share_the_log() {
        let store = MemoryStore::new();
        let event = NormalizedEvent::Revenue(RevenueEvent {
            event_id: "stripe:ch_1".into(),
            customer_id: CustomerId::generate(),
            amount: Decimal::from(50),
            currency: "usd".into(),
            event_type: RevenueEventType::Charge,
            feature: None,
            occurred_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            source: SourceKind::Stripe,
        });
        assert!(store.insert_event(&event).unwrap());
        assert!(store.has_event("stripe:ch_1").unwrap());
    }
}
