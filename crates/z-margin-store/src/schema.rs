//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Customer records, keyed by `customer_id` (16 bytes).
    pub const CUSTOMERS: &str = "customers";

    /// Index: `source || 0x00 || source_key` to `customer_id`.
    pub const CUSTOMER_KEYS: &str = "customer_keys";

    /// Event log, keyed by `date || event_id`.
    pub const EVENTS: &str = "events";

    /// Index: `event_id` to the event's date, for idempotency checks.
    pub const EVENT_IDS: &str = "event_ids";

    /// Daily aggregates, keyed by `date || customer_id || feature`.
    pub const AGGREGATES: &str = "aggregates";

    /// Active insight set, keyed by position (big-endian `u32`).
    pub const INSIGHTS: &str = "insights";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::CUSTOMERS,
        cf::CUSTOMER_KEYS,
        cf::EVENTS,
        cf::EVENT_IDS,
        cf::AGGREGATES,
        cf::INSIGHTS,
    ]
}
