//! Stripe charges, refunds and invoices.
//!
//! Records may be bare API objects or webhook events (`data.object`). Amounts
//! are in minor units. Unpaid and zero-amount objects are ignored rather than
//! counted as revenue.

use serde_json::Value;
use z_margin_core::{Environment, Result, RevenueEventType, SourceKind};

use super::fields::Fields;
use super::{from_minor_units, CustomerRef, Mapped, MappedRevenue};

pub(super) fn map(raw: &Value) -> Result<Mapped> {
    let envelope = Fields::new(raw, SourceKind::Stripe);
    let fields = envelope.nested("data.object").unwrap_or(envelope);

    let object = fields.req_str(&["object"], "object type")?;
    match object.as_str() {
        "charge" => charge(&fields),
        "refund" => refund(&fields),
        "invoice" => invoice(&fields),
        other => Err(fields.malformed(format!("unsupported object type: {other}"))),
    }
}

fn charge(fields: &Fields<'_>) -> Result<Mapped> {
    if fields.opt_bool("paid") == Some(false) {
        return Ok(Mapped::Ignored("unpaid charge".to_string()));
    }
    let amount = fields.req_decimal(&["amount"], "amount")?;
    if amount.is_zero() {
        return Ok(Mapped::Ignored("zero-amount charge".to_string()));
    }
    revenue(fields, amount, RevenueEventType::Charge, &["created"])
}

fn refund(fields: &Fields<'_>) -> Result<Mapped> {
    if fields.opt_str(&["status"]).as_deref() == Some("failed") {
        return Ok(Mapped::Ignored("failed refund".to_string()));
    }
    let amount = fields.req_decimal(&["amount"], "amount")?;
    if amount.is_zero() {
        return Ok(Mapped::Ignored("zero-amount refund".to_string()));
    }
    revenue(fields, amount, RevenueEventType::Refund, &["created"])
}

fn invoice(fields: &Fields<'_>) -> Result<Mapped> {
    let paid = fields.opt_bool("paid") == Some(true)
        || fields.opt_str(&["status"]).as_deref() == Some("paid");
    if !paid {
        return Ok(Mapped::Ignored("unpaid invoice".to_string()));
    }
    let amount = fields.req_decimal(&["amount_paid", "total"], "amount_paid")?;
    if amount.is_zero() {
        return Ok(Mapped::Ignored("zero-amount invoice".to_string()));
    }
    let event_type = if fields.opt_str(&["subscription"]).is_some() {
        RevenueEventType::Subscription
    } else {
        RevenueEventType::Invoice
    };
    revenue(
        fields,
        amount,
        event_type,
        &["status_transitions.paid_at", "created"],
    )
}

fn revenue(
    fields: &Fields<'_>,
    minor_amount: rust_decimal::Decimal,
    event_type: RevenueEventType,
    timestamp_paths: &[&str],
) -> Result<Mapped> {
    let key = fields.req_str(
        &["customer", "charge.customer", "metadata.customer"],
        "customer",
    )?;
    let currency = fields.req_str(&["currency"], "currency")?.to_ascii_lowercase();
    let occurred_at = fields.req_timestamp(timestamp_paths)?;

    let mut customer = CustomerRef::new(key);
    customer.reference = fields.opt_str(&["metadata.customer_ref"]);
    customer.metadata.name = fields.opt_str(&[
        "metadata.customer_name",
        "customer_name",
        "billing_details.name",
    ]);
    customer.metadata.plan = fields.opt_str(&["metadata.subscription_type", "metadata.plan"]);
    if fields.opt_bool("livemode") == Some(false) {
        customer.metadata.environment = Some(Environment::Staging);
    }

    Ok(Mapped::Revenue(MappedRevenue {
        id: fields.opt_str(&["id"]),
        customer,
        amount: from_minor_units(minor_amount.abs(), &currency),
        currency,
        event_type,
        feature: fields.opt_str(&["metadata.feature"]),
        occurred_at,
    }))
}
