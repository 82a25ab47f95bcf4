//! Lago invoices and credit notes.
//!
//! Records may be bare objects or webhook payloads wrapping the object under
//! `invoice` / `credit_note`. Credit notes are refunds.

use serde_json::Value;
use z_margin_core::{Result, RevenueEventType, SourceKind};

use super::fields::Fields;
use super::{from_minor_units, CustomerRef, Mapped, MappedRevenue};

pub(super) fn map(raw: &Value) -> Result<Mapped> {
    let envelope = Fields::new(raw, SourceKind::Lago);

    if let Some(credit_note) = envelope.nested("credit_note") {
        return credit(&credit_note);
    }
    if let Some(invoice) = envelope.nested("invoice") {
        return billed(&invoice);
    }
    match envelope.opt_str(&["object_type"]).as_deref() {
        Some("credit_note") => credit(&envelope),
        _ => billed(&envelope),
    }
}

fn billed(fields: &Fields<'_>) -> Result<Mapped> {
    match fields.opt_str(&["status"]).as_deref() {
        Some("draft") => return Ok(Mapped::Ignored("draft invoice".to_string())),
        Some("voided") => return Ok(Mapped::Ignored("voided invoice".to_string())),
        _ => {}
    }
    if fields.opt_str(&["payment_status"]).as_deref() == Some("failed") {
        return Ok(Mapped::Ignored("failed invoice payment".to_string()));
    }
    let event_type = if fields.opt_str(&["invoice_type"]).as_deref() == Some("subscription") {
        RevenueEventType::Subscription
    } else {
        RevenueEventType::Invoice
    };
    revenue(fields, event_type)
}

fn credit(fields: &Fields<'_>) -> Result<Mapped> {
    if fields.opt_str(&["refund_status"]).as_deref() == Some("failed") {
        return Ok(Mapped::Ignored("failed credit note refund".to_string()));
    }
    revenue(fields, RevenueEventType::Refund)
}

fn revenue(fields: &Fields<'_>, event_type: RevenueEventType) -> Result<Mapped> {
    let key = fields.req_str(
        &["external_customer_id", "customer.external_id"],
        "external_customer_id",
    )?;
    let minor = fields.req_decimal(&["total_amount_cents"], "total_amount_cents")?;
    if minor.is_zero() {
        return Ok(Mapped::Ignored(format!(
            "zero-amount {}",
            if event_type == RevenueEventType::Refund {
                "credit note"
            } else {
                "invoice"
            }
        )));
    }
    let currency = fields
        .req_str(&["currency", "total_amount_currency"], "currency")?
        .to_ascii_lowercase();
    let occurred_at = fields.req_timestamp(&["issuing_date", "created_at"])?;

    let mut customer = CustomerRef::new(key);
    customer.reference = fields.opt_str(&["customer_ref"]);
    customer.metadata.name = fields.opt_str(&["customer.name"]);
    customer.metadata.plan = fields.opt_str(&["plan_code", "subscriptions.0.plan_code"]);

    Ok(Mapped::Revenue(MappedRevenue {
        id: fields.opt_str(&["lago_id", "number"]),
        customer,
        amount: from_minor_units(minor.abs(), &currency),
        currency,
        event_type,
        feature: fields.opt_str(&["metadata.feature", "feature"]),
        occurred_at,
    }))
}
