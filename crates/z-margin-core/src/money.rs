//! Decimal money helpers.
//!
//! Margins are defined as `profit / revenue`, and as zero when revenue is zero.
//! Arithmetic over stored totals saturates at the `Decimal` bounds instead of
//! panicking; inputs are range-checked at ingestion.

use rust_decimal::Decimal;

/// Decimal places used when a money amount has to be rounded (apportionment).
pub const MONEY_SCALE: u32 = 6;

const ONE_HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Margin as a ratio: `profit / revenue`, or zero when revenue is zero.
#[must_use]
pub fn margin_ratio(profit: Decimal, revenue: Decimal) -> Decimal {
    saturating_div(profit, revenue)
}

/// `numerator / denominator`, zero when the denominator is zero and clamped
/// to the `Decimal` bounds when the quotient does not fit.
#[must_use]
pub fn saturating_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        return Decimal::ZERO;
    }
    numerator.checked_div(denominator).unwrap_or_else(|| {
        if numerator.is_sign_negative() == denominator.is_sign_negative() {
            Decimal::MAX
        } else {
            Decimal::MIN
        }
    })
}

/// Margin as a percentage: `profit / revenue * 100`, or zero when revenue is zero.
#[must_use]
pub fn margin_percent(profit: Decimal, revenue: Decimal) -> Decimal {
    margin_ratio(profit, revenue).saturating_mul(ONE_HUNDRED)
}

/// Saturating sum of `values`.
#[must_use]
pub fn saturating_sum<I>(values: I) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    values
        .into_iter()
        .fold(Decimal::ZERO, Decimal::saturating_add)
}

/// Parse a decimal from its textual form.
///
/// Accepts plain (`"0.002"`) and scientific (`"2e-3"`) notation, which is what
/// `serde_json` produces for floats.
#[must_use]
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(text).ok())
}
