//! `OpenAI` usage records.
//!
//! Accepts both the organization usage API bucket results (`input_tokens`,
//! `output_tokens`, `start_time`) and the older per-snapshot usage export
//! (`n_context_tokens_total`, `n_generated_tokens_total`,
//! `aggregation_timestamp`).

use serde_json::{json, Value};
use z_margin_core::{Result, SourceKind};

use super::fields::Fields;
use super::{CustomerRef, Mapped, MappedUsage};

const CUSTOMER_KEYS: [&str; 3] = ["project_id", "user_id", "api_key_id"];

pub(super) fn map(raw: &Value) -> Result<Mapped> {
    let fields = Fields::new(raw, SourceKind::OpenAi);

    let key = fields.req_str(&CUSTOMER_KEYS, "project_id or user_id")?;
    let feature = fields.req_str(&["model", "snapshot_id"], "model")?;

    let quantity = match fields.sum_decimals(&["input_tokens", "output_tokens"])? {
        Some(tokens) => tokens,
        None => fields
            .sum_decimals(&["n_context_tokens_total", "n_generated_tokens_total"])?
            .ok_or_else(|| fields.malformed("missing token counts"))?,
    };

    let occurred_at =
        fields.req_timestamp(&["start_time", "aggregation_timestamp", "timestamp"])?;

    let mut customer = CustomerRef::new(key);
    customer.reference = fields.opt_str(&["customer_ref"]);
    customer.metadata.name = fields.opt_str(&["project_name"]);

    Ok(Mapped::Usage(MappedUsage {
        id: fields.opt_str(&["id"]),
        customer,
        feature,
        quantity,
        unit_cost: fields.opt_decimal(&["unit_cost"])?,
        occurred_at,
        metadata: json!({
            "project_id": fields.opt_str(&["project_id"]),
            "api_key_id": fields.opt_str(&["api_key_id"]),
            "num_model_requests": fields.value("num_model_requests"),
        }),
    }))
}
