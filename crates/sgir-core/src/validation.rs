//! # Validation Module
//!
//! Input validation utilities for SGIR.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP extractor (axum Json)                                    │
//! │  └── Type validation (deserialization)                                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Service entry                                                 │
//! │  └── THIS MODULE: shape and range rules                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Write unit                                                    │
//! │  ├── Fail-fast business checks (stock, state, capacity)                 │
//! │  └── SQLite CHECK / UNIQUE constraints                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::money::{Money, Percent, Qty};
use crate::{MAX_GUESTS, MAX_LINE_QUANTITY, MAX_ORDER_LINES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

fn required_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

/// Validates a login username.
///
/// ## Rules
/// - 1 to 64 characters
/// - Letters, digits, `.`, `-`, `_` only
///
/// ## Example
/// ```rust
/// use sgir_core::validation::validate_username;
///
/// assert!(validate_username("maria.cash").is_ok());
/// assert!(validate_username("").is_err());
/// assert!(validate_username("has space").is_err());
/// ```
pub fn validate_username(username: &str) -> ValidationResult<()> {
    required_text("username", username, 64)?;
    if !username
        .trim()
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(ValidationError::InvalidFormat {
            field: "username".to_string(),
            reason: "must contain only letters, numbers, dots, hyphens and underscores"
                .to_string(),
        });
    }
    Ok(())
}

/// Display names, product names, supply names.
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    required_text(field, name, 200)
}

/// Reasons for refunds and production voids must be stated.
pub fn validate_reason(reason: &str) -> ValidationResult<()> {
    required_text("reason", reason, 500)
}

/// Free-text notes are optional but bounded.
pub fn validate_notes(notes: &str) -> ValidationResult<()> {
    if notes.chars().count() > 1000 {
        return Err(ValidationError::TooLong {
            field: "notes".to_string(),
            max: 1000,
        });
    }
    Ok(())
}

/// Passwords: at least 8 characters.
pub fn validate_password(password: &str) -> ValidationResult<()> {
    if password.chars().count() < 8 {
        return Err(ValidationError::InvalidFormat {
            field: "password".to_string(),
            reason: "must be at least 8 characters".to_string(),
        });
    }
    Ok(())
}

/// PINs and secondary PINs: 4 to 8 ASCII digits.
///
/// ## Example
/// ```rust
/// use sgir_core::validation::validate_pin;
///
/// assert!(validate_pin("pin", "1234").is_ok());
/// assert!(validate_pin("pin", "12a4").is_err());
/// assert!(validate_pin("pin", "123").is_err());
/// ```
pub fn validate_pin(field: &str, pin: &str) -> ValidationResult<()> {
    if !(4..=8).contains(&pin.len()) || !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must be 4 to 8 digits".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

pub fn validate_guest_count(guests: i64) -> ValidationResult<()> {
    if !(1..=MAX_GUESTS).contains(&guests) {
        return Err(ValidationError::OutOfRange {
            field: "guest_count".to_string(),
            min: 1,
            max: MAX_GUESTS,
        });
    }
    Ok(())
}

pub fn validate_capacity(capacity: i64) -> ValidationResult<()> {
    if !(1..=MAX_GUESTS).contains(&capacity) {
        return Err(ValidationError::OutOfRange {
            field: "capacity".to_string(),
            min: 1,
            max: MAX_GUESTS,
        });
    }
    Ok(())
}

/// Validates an order line quantity.
///
/// ## Rules
/// - At least 1
/// - At most [`MAX_LINE_QUANTITY`] (typing 1000 instead of 10)
pub fn validate_line_qty(qty: i64) -> ValidationResult<()> {
    if !(1..=MAX_LINE_QUANTITY).contains(&qty) {
        return Err(ValidationError::OutOfRange {
            field: "qty".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }
    Ok(())
}

/// A request must name at least one line and not too many.
pub fn validate_line_count(lines: usize) -> ValidationResult<()> {
    if lines == 0 {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        });
    }
    if lines > MAX_ORDER_LINES {
        return Err(ValidationError::OutOfRange {
            field: "lines".to_string(),
            min: 1,
            max: MAX_ORDER_LINES as i64,
        });
    }
    Ok(())
}

pub fn validate_price(price: Money) -> ValidationResult<()> {
    if !price.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "price".to_string(),
        });
    }
    Ok(())
}

pub fn validate_non_negative_money(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    Ok(())
}

pub fn validate_positive_money(field: &str, amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Discount percentages are in `[0, 100]`.
///
/// ## Example
/// ```rust
/// use sgir_core::money::Percent;
/// use sgir_core::validation::validate_discount_pct;
///
/// assert!(validate_discount_pct(Percent::from_bps(0)).is_ok());
/// assert!(validate_discount_pct(Percent::from_bps(10_000)).is_ok());
/// assert!(validate_discount_pct(Percent::from_bps(10_001)).is_err());
/// ```
pub fn validate_discount_pct(pct: Percent) -> ValidationResult<()> {
    if !(0..=Percent::HUNDRED.bps()).contains(&pct.bps()) {
        return Err(ValidationError::OutOfRange {
            field: "pct".to_string(),
            min: 0,
            max: 100,
        });
    }
    Ok(())
}

pub fn validate_stock_level(field: &str, level: i64) -> ValidationResult<()> {
    if level < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Recipe Validators
// =============================================================================

/// One requested recipe line: `(supply_id, qty_per_unit, loss_pct)`.
pub type RecipeLine = (i64, Qty, Percent);

/// Validates recipe lines before any write.
///
/// ## Rules
/// - At least one line
/// - `qty_per_unit > 0`
/// - `loss_pct ≥ 0`
/// - No supply appears twice
pub fn validate_recipe_lines(lines: &[RecipeLine]) -> ValidationResult<()> {
    if lines.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }

    let mut seen = HashSet::new();
    for (supply_id, qty, loss) in lines {
        if !qty.is_positive() {
            return Err(ValidationError::MustBePositive {
                field: "qty_per_unit".to_string(),
            });
        }
        if loss.bps() < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: "loss_pct".to_string(),
            });
        }
        if !seen.insert(*supply_id) {
            return Err(ValidationError::Repeated {
                field: "supply".to_string(),
                value: supply_id.to_string(),
            });
        }
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_guest_count() {
        assert!(validate_guest_count(1).is_ok());
        assert!(validate_guest_count(0).is_err());
        assert!(validate_guest_count(MAX_GUESTS + 1).is_err());
    }

    #[test]
    fn test_validate_line_qty() {
        assert!(validate_line_qty(1).is_ok());
        assert!(validate_line_qty(MAX_LINE_QUANTITY).is_ok());
        assert!(validate_line_qty(0).is_err());
        assert!(validate_line_qty(-2).is_err());
    }

    #[test]
    fn test_validate_recipe_lines() {
        let ok = vec![
            (1, Qty::from_milli(500), Percent::zero()),
            (2, Qty::from_milli(200), Percent::from_bps(500)),
        ];
        assert!(validate_recipe_lines(&ok).is_ok());

        let duplicate = vec![
            (1, Qty::from_milli(500), Percent::zero()),
            (1, Qty::from_milli(100), Percent::zero()),
        ];
        assert!(matches!(
            validate_recipe_lines(&duplicate),
            Err(ValidationError::Repeated { .. })
        ));

        let zero = vec![(1, Qty::zero(), Percent::zero())];
        assert!(matches!(
            validate_recipe_lines(&zero),
            Err(ValidationError::MustBePositive { .. })
        ));

        assert!(validate_recipe_lines(&[]).is_err());
    }

    #[test]
    fn test_validate_reason() {
        assert!(validate_reason("miscount").is_ok());
        assert!(validate_reason("   ").is_err());
    }

    #[test]
    fn test_validate_money() {
        assert!(validate_price(Money::from_cents(1)).is_ok());
        assert!(validate_price(Money::zero()).is_err());
        assert!(validate_non_negative_money("tip", Money::zero()).is_ok());
        assert!(validate_non_negative_money("tip", Money::from_cents(-1)).is_err());
    }
}
