//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use z_margin_core::{
    Customer, CustomerId, DailyAggregate, DateRange, InsightFlag, NormalizedEvent, SourceKind,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{CustomerDirectory, Store};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Serializes read-modify-write sequences (customer creation, event dedup).
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Database("write lock poisoned".to_string()))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Collect `(key, value)` pairs of a date-prefixed column family inside `range`.
    fn scan_range(&self, cf_name: &str, range: &DateRange) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self.cf(cf_name)?;
        let start = keys::date_prefix(range.start);
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&start, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            match keys::extract_date(&key) {
                Some(date) if date <= range.end => entries.push((key.to_vec(), value.to_vec())),
                _ => break,
            }
        }
        Ok(entries)
    }

    fn customer_id_for_key(&self, source: SourceKind, source_key: &str) -> Result<Option<CustomerId>> {
        let cf = self.cf(cf::CUSTOMER_KEYS)?;
        let raw = self
            .db
            .get_cf(&cf, keys::source_alias_key(source, source_key))
            .map_err(|e| StoreError::Database(e.to_string()))?;

        raw.map(|bytes| {
            let bytes: [u8; 16] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| StoreError::Serialization("corrupt customer alias".to_string()))?;
            Ok(CustomerId::from_bytes(bytes))
        })
        .transpose()
    }
}

impl CustomerDirectory for RocksStore {
    fn get_customer(&self, id: &CustomerId) -> Result<Option<Customer>> {
        self.get(cf::CUSTOMERS, &keys::customer_key(id))
    }

    fn customer_for_key(&self, source: SourceKind, source_key: &str) -> Result<Option<Customer>> {
        match self.customer_id_for_key(source, source_key)? {
            Some(id) => self.get_customer(&id),
            None => Ok(None),
        }
    }

    fn insert_customer_if_absent(&self, customer: Customer) -> Result<(Customer, bool)> {
        let _guard = self.lock()?;

        if let Some(existing) = self.customer_for_key(customer.source, &customer.source_key)? {
            return Ok((existing, false));
        }

        let cf_customers = self.cf(cf::CUSTOMERS)?;
        let cf_keys = self.cf(cf::CUSTOMER_KEYS)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_customers,
            keys::customer_key(&customer.id),
            Self::serialize(&customer)?,
        );
        batch.put_cf(
            &cf_keys,
            keys::source_alias_key(customer.source, &customer.source_key),
            customer.id.as_bytes(),
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok((customer, true))
    }

    fn link_source_key(
        &self,
        source: SourceKind,
        source_key: &str,
        id: &CustomerId,
    ) -> Result<()> {
        let _guard = self.lock()?;

        if self.get_customer(id)?.is_none() {
            return Err(StoreError::NotFound);
        }

        let cf = self.cf(cf::CUSTOMER_KEYS)?;
        self.db
            .put_cf(&cf, keys::source_alias_key(source, source_key), id.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn update_customer(&self, customer: &Customer) -> Result<()> {
        let _guard = self.lock()?;

        if self.get_customer(&customer.id)?.is_none() {
            return Err(StoreError::NotFound);
        }

        let cf = self.cf(cf::CUSTOMERS)?;
        self.db
            .put_cf(&cf, keys::customer_key(&customer.id), Self::serialize(customer)?)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn list_customers(&self) -> Result<Vec<Customer>> {
        let cf = self.cf(cf::CUSTOMERS)?;
        let mut customers = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            customers.push(Self::deserialize(&value)?);
        }
        Ok(customers)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Event Log
    // =========================================================================

    fn insert_event(&self, event: &NormalizedEvent) -> Result<bool> {
        let _guard = self.lock()?;

        if self.has_event(event.event_id())? {
            return Ok(false);
        }

        let cf_events = self.cf(cf::EVENTS)?;
        let cf_ids = self.cf(cf::EVENT_IDS)?;
        let date = event.date();

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_events,
            keys::event_key(date, event.event_id()),
            Self::serialize(event)?,
        );
        batch.put_cf(
            &cf_ids,
            keys::event_id_key(event.event_id()),
            keys::date_prefix(date),
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(true)
    }

    fn has_event(&self, event_id: &str) -> Result<bool> {
        let cf = self.cf(cf::EVENT_IDS)?;
        let exists = self
            .db
            .get_cf(&cf, keys::event_id_key(event_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();
        Ok(exists)
    }

    fn events_in_range(&self, range: &DateRange) -> Result<Vec<NormalizedEvent>> {
        self.scan_range(cf::EVENTS, range)?
            .iter()
            .map(|(_, value)| Self::deserialize(value))
            .collect()
    }

    // =========================================================================
    // Aggregates
    // =========================================================================

    fn replace_aggregates(&self, range: &DateRange, rows: &[DailyAggregate]) -> Result<()> {
        let cf = self.cf(cf::AGGREGATES)?;
        let _guard = self.lock()?;

        let mut batch = WriteBatch::default();
        for (key, _) in self.scan_range(cf::AGGREGATES, range)? {
            batch.delete_cf(&cf, key);
        }
        for row in rows.iter().filter(|row| range.contains(row.date)) {
            batch.put_cf(&cf, keys::aggregate_key(&row.key()), Self::serialize(row)?);
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::trace!(
            start = %range.start,
            end = %range.end,
            rows = rows.len(),
            "Replaced aggregates"
        );
        Ok(())
    }

    fn aggregates_in_range(&self, range: &DateRange) -> Result<Vec<DailyAggregate>> {
        let mut rows = self
            .scan_range(cf::AGGREGATES, range)?
            .iter()
            .map(|(_, value)| Self::deserialize(value))
            .collect::<Result<Vec<DailyAggregate>>>()?;
        rows.sort_by_key(DailyAggregate::key);
        Ok(rows)
    }

    // =========================================================================
    // Insights
    // =========================================================================

    fn replace_insights(&self, flags: &[InsightFlag]) -> Result<()> {
        let cf = self.cf(cf::INSIGHTS)?;
        let _guard = self.lock()?;

        let mut batch = WriteBatch::default();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            batch.delete_cf(&cf, key);
        }
        for (position, flag) in (0u32..).zip(flags) {
            batch.put_cf(&cf, keys::insight_key(position), Self::serialize(flag)?);
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn list_insights(&self) -> Result<Vec<InsightFlag>> {
        let cf = self.cf(cf::INSIGHTS)?;
        let mut flags = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            flags.push(Self::deserialize(&value)?);
        }
        Ok(flags)
    }

    fn backend_name(&self) -> &'static str {
        "rocksdb"
    }
}
