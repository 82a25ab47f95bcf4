//! First-party metering records.
//!
//! The generic shape for usage reported by our own services:
//! `customer_id`, `feature`, `quantity`, `unit_cost`, `timestamp`, plus
//! optional customer metadata (`customer_name`, `plan`, `environment`,
//! `usage_limit`).

use serde_json::{json, Value};
use z_margin_core::{Environment, Result, SourceKind};

use super::fields::Fields;
use super::{CustomerRef, Mapped, MappedUsage};

pub(super) fn map(raw: &Value) -> Result<Mapped> {
    let fields = Fields::new(raw, SourceKind::Metering);

    let key = fields.req_str(&["customer_id", "external_customer_id"], "customer_id")?;
    let feature = fields.req_str(&["feature", "model"], "feature")?;
    let quantity = fields.req_decimal(&["quantity"], "quantity")?;
    let occurred_at = fields.req_timestamp(&["timestamp", "occurred_at"])?;

    let mut customer = CustomerRef::new(key);
    customer.reference = fields.opt_str(&["customer_ref"]);
    customer.metadata.name = fields.opt_str(&["customer_name"]);
    customer.metadata.plan = fields.opt_str(&["plan"]);
    customer.metadata.environment = fields
        .opt_str(&["environment"])
        .map(|env| Environment::parse_loose(&env));
    customer.metadata.usage_limit = fields.opt_decimal(&["usage_limit"])?;

    Ok(Mapped::Usage(MappedUsage {
        id: fields.opt_str(&["event_id", "id"]),
        customer,
        feature,
        quantity,
        unit_cost: fields.opt_decimal(&["unit_cost"])?,
        occurred_at,
        metadata: fields.value("metadata").cloned().unwrap_or_else(|| json!({})),
    }))
}
