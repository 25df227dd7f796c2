//! Bounds for decimal amounts, matching the NUMERIC columns they are stored in.
//!
//! Money columns are `NUMERIC(14, 2)` and percentages `NUMERIC(6, 2)`. Anything finer than a cent
//! or wider than the column is refused at the edge, before Postgres rounds or overflows it.

use rust_decimal::Decimal;
use validator::ValidationError;

const MONEY_LIMIT: i64 = 1_000_000_000_000;
const PERCENT_LIMIT: i64 = 10_000;

fn fits(value: &Decimal, limit: i64) -> Result<(), ValidationError> {
    if value.normalize().scale() > 2 {
        return Err(ValidationError::new("precision").with_message("must have at most two decimal places".into()));
    }
    if value.abs() >= Decimal::from(limit) {
        return Err(ValidationError::new("range").with_message(format!("must be less than {limit}").into()));
    }
    Ok(())
}

fn fits_non_negative(value: &Decimal, limit: i64) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("range").with_message("must not be negative".into()));
    }
    fits(value, limit)
}

/// A signed amount; the caller decides what the sign means.
pub(crate) fn money_amount(value: &Decimal) -> Result<(), ValidationError> {
    fits(value, MONEY_LIMIT)
}

pub(crate) fn price(value: &Decimal) -> Result<(), ValidationError> {
    fits_non_negative(value, MONEY_LIMIT)
}

pub(crate) fn percentage(value: &Decimal) -> Result<(), ValidationError> {
    fits_non_negative(value, PERCENT_LIMIT)
}
