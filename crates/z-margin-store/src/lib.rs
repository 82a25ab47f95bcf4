//! Storage layer for z-margin.
//!
//! This crate persists customers, the append-only event log, daily aggregates
//! and the active insight set behind the [`Store`] trait.
//!
//! # Backends
//!
//! - [`MemoryStore`]: `RwLock`-guarded maps, the default.
//! - `RocksStore` (feature `rocksdb-backend`): `RocksDB` with column families
//!   and CBOR values. Events and aggregates are keyed by date first so a date
//!   range is a single ordered scan.
//!
//! Every replace operation is atomic: readers observe either the old or the
//! new contents of a range, never a mix.
//!
//! # Example
//!
//! ```
//! use z_margin_core::{Customer, SourceKind};
//! use z_margin_store::{CustomerDirectory, MemoryStore};
//!
//! let store = MemoryStore::new();
//! let (customer, created) = store
//!     .insert_customer_if_absent(Customer::new(SourceKind::Stripe, "cus_123"))
//!     .unwrap();
//! assert!(created);
//!
//! let found = store.customer_for_key(SourceKind::Stripe, "cus_123").unwrap();
//! assert_eq!(found.map(|c| c.id), Some(customer.id));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;

#[cfg(feature = "rocksdb-backend")]
pub mod keys;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use z_margin_core::{
    Customer, CustomerId, DailyAggregate, DateRange, InsightFlag, NormalizedEvent, SourceKind,
};

/// Read/write access to the customer table.
///
/// Customers are never deleted. A customer is reachable by its canonical ID
/// and by every `(source, source_key)` alias linked to it.
pub trait CustomerDirectory: Send + Sync {
    /// Get a customer by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_customer(&self, id: &CustomerId) -> Result<Option<Customer>>;

    /// Look up the customer linked to a source-specific key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn customer_for_key(&self, source: SourceKind, source_key: &str) -> Result<Option<Customer>>;

    /// Insert `customer` unless its `(source, source_key)` alias already exists.
    ///
    /// Returns the stored customer and whether it was created. The check and
    /// the insert happen atomically, so concurrent first sightings of the same
    /// key create exactly one customer.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn insert_customer_if_absent(&self, customer: Customer) -> Result<(Customer, bool)>;

    /// Link an additional `(source, source_key)` alias to an existing customer.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the customer doesn't exist.
    fn link_source_key(&self, source: SourceKind, source_key: &str, id: &CustomerId)
        -> Result<()>;

    /// Update an existing customer.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the customer doesn't exist.
    fn update_customer(&self, customer: &Customer) -> Result<()>;

    /// List all customers ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_customers(&self) -> Result<Vec<Customer>>;
}

/// The storage trait defining all database operations.
pub trait Store: CustomerDirectory {
    // =========================================================================
    // Event Log
    // =========================================================================

    /// Append an event to the log.
    ///
    /// Returns `false` without writing if an event with the same ID exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn insert_event(&self, event: &NormalizedEvent) -> Result<bool>;

    /// Check if an event has already been recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn has_event(&self, event_id: &str) -> Result<bool>;

    /// All events whose UTC date falls in `range`, ordered by date.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn events_in_range(&self, range: &DateRange) -> Result<Vec<NormalizedEvent>>;

    // =========================================================================
    // Aggregates
    // =========================================================================

    /// Atomically replace every aggregate dated inside `range` with `rows`.
    ///
    /// Buckets in the range that are absent from `rows` are removed. Rows
    /// dated outside the range are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn replace_aggregates(&self, range: &DateRange, rows: &[DailyAggregate]) -> Result<()>;

    /// All aggregates dated inside `range`, ordered by bucket key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn aggregates_in_range(&self, range: &DateRange) -> Result<Vec<DailyAggregate>>;

    // =========================================================================
    // Insights
    // =========================================================================

    /// Replace the active insight set.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn replace_insights(&self, flags: &[InsightFlag]) -> Result<()>;

    /// The active insight set in evaluation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_insights(&self) -> Result<Vec<InsightFlag>>;

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Short backend name for health reporting.
    fn backend_name(&self) -> &'static str;
}
