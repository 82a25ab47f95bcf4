//! Customer types for z-margin.
//!
//! A customer is created the first time any source mentions it, updated when a
//! later sync carries different metadata, and never deleted (only deactivated).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{CustomerId, SourceKind};

/// Default plan label for customers whose source does not report one.
pub const UNKNOWN_PLAN: &str = "unknown";

/// Deployment environment a customer's traffic belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Live traffic.
    #[default]
    Production,
    /// Test or staging traffic.
    Staging,
}

impl Environment {
    /// Get the environment name as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Staging => "staging",
        }
    }

    /// Parse a loosely formatted environment tag.
    ///
    /// Anything that looks like a test environment maps to `Staging`.
    #[must_use]
    pub fn parse_loose(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "staging" | "stage" | "test" | "testing" | "sandbox" | "dev" | "development" => {
                Self::Staging
            }
            _ => Self::Production,
        }
    }
}

/// A customer joined across usage and revenue sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    /// Canonical customer ID.
    pub id: CustomerId,

    /// Display name.
    pub name: String,

    /// Plan tier (e.g. "pro", "legacy-starter").
    pub plan: String,

    /// Environment tag.
    pub environment: Environment,

    /// Usage limit assigned to the customer, in usage units, if any.
    pub usage_limit: Option<Decimal>,

    /// Whether the customer is active. Deactivated customers are kept but
    /// ignored by customer rules.
    pub active: bool,

    /// Source that first reported this customer.
    pub source: SourceKind,

    /// The customer key within that source.
    pub source_key: String,

    /// When the customer was first seen.
    pub created_at: DateTime<Utc>,

    /// When the customer was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Create a new customer first seen in `source` under `source_key`.
    ///
    /// The display name defaults to the source key.
    #[must_use]
    pub fn new(source: SourceKind, source_key: impl Into<String>) -> Self {
        let now = Utc::now();
        let source_key = source_key.into();
        Self {
            id: CustomerId::generate(),
            name: source_key.clone(),
            plan: UNKNOWN_PLAN.to_string(),
            environment: Environment::Production,
            usage_limit: None,
            active: true,
            source,
            source_key,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply metadata from a later sync.
    ///
    /// Returns `true` if anything changed.
    pub fn apply_metadata(&mut self, metadata: &CustomerMetadata) -> bool {
        let mut changed = false;

        if let Some(name) = metadata.name.as_deref().filter(|n| !n.is_empty()) {
            if self.name != name {
                self.name = name.to_string();
                changed = true;
            }
        }
        if let Some(plan) = metadata.plan.as_deref().filter(|p| !p.is_empty()) {
            if self.plan != plan {
                self.plan = plan.to_string();
                changed = true;
            }
        }
        if let Some(environment) = metadata.environment {
            if self.environment != environment {
                self.environment = environment;
                changed = true;
            }
        }
        if let Some(limit) = metadata.usage_limit {
            if self.usage_limit != Some(limit) {
                self.usage_limit = Some(limit);
                changed = true;
            }
        }

        if changed {
            self.updated_at = Utc::now();
        }
        changed
    }

    /// Deactivate the customer. Returns `true` if it was active.
    pub fn deactivate(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        self.updated_at = Utc::now();
        true
    }

    /// Check if the customer is on a legacy plan.
    #[must_use]
    pub fn is_legacy_plan(&self) -> bool {
        self.plan.to_ascii_lowercase().contains("legacy")
    }
}

/// Customer metadata carried by a raw record.
///
/// Every field is optional; absent fields leave the stored customer untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerMetadata {
    /// Display name.
    pub name: Option<String>,
    /// Plan tier.
    pub plan: Option<String>,
    /// Environment tag.
    pub environment: Option<Environment>,
    /// Usage limit in usage units.
    pub usage_limit: Option<Decimal>,
}

impl CustomerMetadata {
    /// Whether no metadata is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.plan.is_none()
            && self.environment.is_none()
            && self.usage_limit.is_none()
    }
}
