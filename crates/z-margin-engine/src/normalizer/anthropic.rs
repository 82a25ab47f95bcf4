//! Anthropic usage report records.
//!
//! Token quantity is the sum of uncached input, cache creation, cache read
//! and output tokens.

use serde_json::{json, Value};
use z_margin_core::{Result, SourceKind};

use super::fields::Fields;
use super::{CustomerRef, Mapped, MappedUsage};

pub(super) fn map(raw: &Value) -> Result<Mapped> {
    let fields = Fields::new(raw, SourceKind::Anthropic);

    let key = fields.req_str(&["workspace_id", "api_key_id"], "workspace_id or api_key_id")?;
    let feature = fields.req_str(&["model"], "model")?;

    let mut quantity = fields.sum_decimals(&[
        "uncached_input_tokens",
        "cache_read_input_tokens",
        "output_tokens",
    ])?;
    let cache_creation = match fields.sum_object("cache_creation")? {
        Some(tokens) => Some(tokens),
        None => fields.opt_decimal(&["cache_creation_input_tokens"])?,
    };
    if let Some(tokens) = cache_creation {
        let total = fields.checked_add(quantity.unwrap_or_default(), tokens, "cache_creation")?;
        quantity = Some(total);
    }
    let quantity = quantity.ok_or_else(|| fields.malformed("missing token counts"))?;

    let occurred_at = fields.req_timestamp(&["starting_at", "timestamp"])?;

    let mut customer = CustomerRef::new(key);
    customer.reference = fields.opt_str(&["customer_ref"]);
    customer.metadata.name = fields.opt_str(&["workspace_name"]);

    Ok(Mapped::Usage(MappedUsage {
        id: fields.opt_str(&["id"]),
        customer,
        feature,
        quantity,
        unit_cost: fields.opt_decimal(&["unit_cost"])?,
        occurred_at,
        metadata: json!({
            "workspace_id": fields.opt_str(&["workspace_id"]),
            "api_key_id": fields.opt_str(&["api_key_id"]),
            "service_tier": fields.opt_str(&["service_tier"]),
        }),
    }))
}
