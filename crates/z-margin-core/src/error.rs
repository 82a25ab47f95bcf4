//! Error types for z-margin.

use chrono::NaiveDate;

use crate::ids::{CustomerId, IdError};

/// Result type for z-margin operations.
pub type Result<T> = std::result::Result<T, MarginError>;

/// Errors that can occur in z-margin operations.
#[derive(Debug, thiserror::Error)]
pub enum MarginError {
    /// A raw record is missing a required field or has an unparsable value.
    ///
    /// The record is skipped and counted; it is never aggregated as zero.
    #[error("malformed {service} record: {reason}")]
    MalformedRecord {
        /// The source service the record came from.
        service: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The requested date range has its start after its end.
    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange {
        /// Requested start date.
        start: NaiveDate,
        /// Requested end date.
        end: NaiveDate,
    },

    /// The requested date range spans more days than a query may cover.
    #[error("date range {start}..{end} spans {days} days, more than the limit of {max_days}")]
    RangeTooLarge {
        /// Requested start date.
        start: NaiveDate,
        /// Requested end date.
        end: NaiveDate,
        /// Days the range covers.
        days: u64,
        /// Most days a query may cover.
        max_days: u32,
    },

    /// A record references a customer that could not be resolved or created.
    #[error("unknown customer reference: {reference}")]
    UnknownCustomerReference {
        /// The reference as it appeared in the record.
        reference: String,
    },

    /// No customer exists with the given ID.
    #[error("customer not found: {0}")]
    CustomerNotFound(CustomerId),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl MarginError {
    /// Build a `MalformedRecord` error.
    #[must_use]
    pub fn malformed(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is a per-record data-quality problem.
    ///
    /// Data-quality errors skip the offending record; everything else aborts
    /// the operation.
    #[must_use]
    pub fn is_data_quality(&self) -> bool {
        matches!(
            self,
            Self::MalformedRecord { .. } | Self::UnknownCustomerReference { .. }
        )
    }
}
