//! Core types and utilities for z-margin.
//!
//! This crate provides the foundational types used throughout the z-margin platform:
//!
//! - **Identifiers**: `CustomerId`, `InsightId`
//! - **Customers**: `Customer`, `Environment`
//! - **Events**: `UsageEvent`, `RevenueEvent`, `SourceKind`, `NormalizedEvent`
//! - **Aggregates**: `DailyAggregate`, `BucketKey`
//! - **Insights**: `InsightFlag`, `InsightRule`, `Severity`, `InsightCategory`
//! - **Ranges**: `DateRange`
//!
//! # Money
//!
//! All money values are `rust_decimal::Decimal` in the reporting currency.
//! Profit and margin are never stored: they are derived from `usage_cost` and
//! `revenue` on every read.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod aggregate;
pub mod customer;
pub mod error;
pub mod events;
pub mod ids;
pub mod insight;
pub mod money;
pub mod range;

pub use aggregate::{BucketKey, DailyAggregate};
pub use customer::{Customer, CustomerMetadata, Environment, UNKNOWN_PLAN};
pub use error::{MarginError, Result};
pub use events::{
    NormalizedEvent, RevenueEvent, RevenueEventType, SourceCategory, SourceKind, UsageEvent,
};
pub use ids::{CustomerId, IdError, InsightId};
pub use insight::{InsightCategory, InsightFlag, InsightRule, Severity};
pub use money::{
    margin_percent, margin_ratio, parse_decimal, saturating_div, saturating_sum, MONEY_SCALE,
};
pub use range::{parse_date, DateRange, DATE_FORMAT};
