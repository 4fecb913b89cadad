//! Field validation shared by order and item inputs.

use rust_decimal::Decimal;

use crate::error::{OrderError, OrderResult};

/// Rejects empty (or whitespace-only) values and values longer than
/// `max_chars` characters.
pub(crate) fn require_text(field: &'static str, value: &str, max_chars: usize) -> OrderResult<()> {
    if value.trim().is_empty() {
        return Err(OrderError::InvalidField {
            field,
            message: "must not be empty".to_string(),
        });
    }
    let len = value.chars().count();
    if len > max_chars {
        return Err(OrderError::InvalidField {
            field,
            message: format!("must be at most {max_chars} characters, got {len}"),
        });
    }
    Ok(())
}

/// Largest accepted item amount (`INTEGER`).
pub(crate) const MAX_AMOUNT: u32 = i32::MAX.unsigned_abs();

/// Rejects amounts outside `1..=MAX_AMOUNT`.
pub(crate) fn require_amount(amount: u32) -> OrderResult<()> {
    if amount == 0 {
        return Err(OrderError::NonPositiveAmount);
    }
    if amount > MAX_AMOUNT {
        return Err(OrderError::InvalidField {
            field: "amount",
            message: format!("must be at most {MAX_AMOUNT}, got {amount}"),
        });
    }
    Ok(())
}

/// Largest accepted unit price (`NUMERIC(5, 2)`).
pub(crate) const MAX_PRICE: Decimal = Decimal::from_parts(99_999, 0, 0, false, 2);

/// Checks a unit price and returns it with a fixed scale of two.
pub(crate) fn normalize_price(price: Decimal) -> OrderResult<Decimal> {
    if price.is_sign_negative() || price > MAX_PRICE || price.normalize().scale() > 2 {
        return Err(OrderError::InvalidPrice(price));
    }
    let mut fixed = price;
    fixed.rescale(2);
    Ok(fixed)
}
