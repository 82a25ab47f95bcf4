//! Z-Margin HTTP API Service.
//!
//! This crate serves the margin engine over HTTP:
//!
//! - Dashboard views (summary, feature table, time series)
//! - Raw record ingestion per source
//! - Insight evaluation and listing
//! - Customer administration
//!
//! A background [`scheduler`] keeps recent aggregates and insights fresh.
//!
//! # Authentication
//!
//! Read endpoints are open. Mutating endpoints require the service API key in
//! the `X-API-Key` header.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers call the synchronous engine

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod scheduler;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
