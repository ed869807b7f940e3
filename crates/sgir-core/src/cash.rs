//! # Cash Register Rules
//!
//! Payment arithmetic, invoice numbering and shift reconciliation.
//!
//! ## Shift Close
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  transactions of the shift (mixed ones expanded into their splits)      │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  gross per method ── minus refunds per method ──► total_cash/card/...   │
//! │                                                                         │
//! │  cash_expected = cash_start + gross_cash − refunds_cash                 │
//! │  diff          = cash_real − cash_expected                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{Money, Percent};
use crate::types::PaymentMethod;

// =============================================================================
// Payments
// =============================================================================

/// One requested part of a split payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitLine {
    pub method: PaymentMethod,
    pub amount: Money,
    #[serde(default)]
    pub reference: Option<String>,
}

/// Validates split parts against the amount due.
///
/// ## Rules
/// - at least two parts
/// - every part positive and not itself `mixed`
/// - `Σ amount = due`, otherwise `amount_mismatch`
///
/// ## Example
/// ```rust
/// use sgir_core::cash::{check_splits, SplitLine};
/// use sgir_core::money::Money;
/// use sgir_core::types::PaymentMethod;
///
/// let due = Money::from_cents(3000);
/// let ok = vec![
///     SplitLine { method: PaymentMethod::Cash, amount: Money::from_cents(2000), reference: None },
///     SplitLine { method: PaymentMethod::Card, amount: Money::from_cents(1000), reference: None },
/// ];
/// assert!(check_splits(&ok, due).is_ok());
/// ```
pub fn check_splits(splits: &[SplitLine], due: Money) -> CoreResult<()> {
    if splits.len() < 2 {
        return Err(ValidationError::OutOfRange {
            field: "splits".to_string(),
            min: 2,
            max: 10,
        }
        .into());
    }
    for split in splits {
        if split.method == PaymentMethod::Mixed {
            return Err(ValidationError::NotAllowed {
                field: "splits.method".to_string(),
                allowed: vec!["cash", "card", "qr", "mobile"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
            }
            .into());
        }
        if !split.amount.is_positive() {
            return Err(ValidationError::MustBePositive {
                field: "splits.amount".to_string(),
            }
            .into());
        }
    }

    let got: Money = splits.iter().map(|s| s.amount).sum();
    if got != due {
        return Err(CoreError::AmountMismatch { expected: due, got });
    }
    Ok(())
}

/// Change handed back on a cash payment.
///
/// A tendered amount below what is due is rejected; no tendered amount means
/// exact cash.
pub fn cash_change(tendered: Option<Money>, due: Money) -> CoreResult<Money> {
    match tendered {
        None => Ok(Money::zero()),
        Some(t) if t < due => Err(CoreError::AmountMismatch {
            expected: due,
            got: t,
        }),
        Some(t) => Ok((t - due).non_negative()),
    }
}

/// Amount charged when some units of an order are paid on their own.
///
/// The units are priced net of the order discount. The payment that clears
/// the last unpaid unit takes the whole balance, tip included.
pub fn item_charge(
    lines_amount: Money,
    discount_pct: Percent,
    balance: Money,
    clears_order: bool,
) -> Money {
    if clears_order {
        return balance;
    }
    let net = (lines_amount - lines_amount.percent_of(discount_pct)).non_negative();
    net.min(balance)
}

/// Refunds are capped at what was paid minus what was already refunded.
pub fn check_refund(amount: Money, paid: Money, already_refunded: Money) -> CoreResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        }
        .into());
    }
    let refundable = (paid - already_refunded).non_negative();
    if amount > refundable {
        return Err(CoreError::RefundExceedsPaid {
            requested: amount,
            refundable,
        });
    }
    Ok(())
}

// =============================================================================
// Invoice Numbers
// =============================================================================

/// `FACT-YYYYMMDD-XXXXXXXX`, the suffix being 8 upper-case hex digits of `token`.
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use sgir_core::cash::invoice_number;
/// use uuid::Uuid;
///
/// let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
/// let token = Uuid::parse_str("a1b2c3d4-0000-4000-8000-000000000000").unwrap();
/// assert_eq!(invoice_number(date, token), "FACT-20240309-A1B2C3D4");
/// ```
pub fn invoice_number(date: NaiveDate, token: Uuid) -> String {
    let hex = token.simple().to_string().to_uppercase();
    format!("FACT-{}-{}", date.format("%Y%m%d"), &hex[..8])
}

// =============================================================================
// Shift Reconciliation
// =============================================================================

/// Per-method money amounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MethodTotals {
    pub cash: Money,
    pub card: Money,
    pub qr: Money,
    pub mobile: Money,
}

impl MethodTotals {
    /// Adds `amount` to the bucket of `method`. `mixed` has no bucket: callers
    /// expand mixed transactions into their split rows first.
    pub fn add(&mut self, method: PaymentMethod, amount: Money) {
        match method {
            PaymentMethod::Cash => self.cash += amount,
            PaymentMethod::Card => self.card += amount,
            PaymentMethod::Qr => self.qr += amount,
            PaymentMethod::Mobile => self.mobile += amount,
            PaymentMethod::Mixed => {}
        }
    }

    pub fn total(&self) -> Money {
        self.cash + self.card + self.qr + self.mobile
    }

    pub fn minus(&self, other: &MethodTotals) -> MethodTotals {
        MethodTotals {
            cash: self.cash - other.cash,
            card: self.card - other.card,
            qr: self.qr - other.qr,
            mobile: self.mobile - other.mobile,
        }
    }
}

/// Inputs collected for one shift close.
#[derive(Debug, Clone, Default)]
pub struct ShiftLedger {
    pub cash_start: Money,
    /// `(method, amount)` of every processed payment, splits expanded.
    pub payments: Vec<(PaymentMethod, Money)>,
    /// `(method, amount)` of every refund issued by this cashier in the shift.
    pub refunds: Vec<(PaymentMethod, Money)>,
    /// `(discount, tip)` of every distinct order paid in the shift.
    pub orders: Vec<(Money, Money)>,
}

/// Figures written to the shift row at close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShiftClose {
    /// Net of refunds.
    pub totals: MethodTotals,
    pub total_sales: Money,
    pub total_refunds: Money,
    pub total_discounts: Money,
    pub total_tips: Money,
    pub order_count: i64,
    pub cash_expected: Money,
    pub cash_real: Money,
    pub diff: Money,
}

/// Reconciles a shift against the counted cash.
pub fn reconcile_shift(ledger: &ShiftLedger, cash_real: Money) -> ShiftClose {
    let mut gross = MethodTotals::default();
    for (method, amount) in &ledger.payments {
        gross.add(*method, *amount);
    }
    let mut refunds = MethodTotals::default();
    for (method, amount) in &ledger.refunds {
        refunds.add(*method, *amount);
    }

    let totals = gross.minus(&refunds);
    let cash_expected = ledger.cash_start + gross.cash - refunds.cash;

    ShiftClose {
        totals,
        total_sales: totals.total(),
        total_refunds: refunds.total(),
        total_discounts: ledger.orders.iter().map(|(d, _)| *d).sum(),
        total_tips: ledger.orders.iter().map(|(_, t)| *t).sum(),
        order_count: ledger.orders.len() as i64,
        cash_expected,
        cash_real,
        diff: cash_real - cash_expected,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_charge_is_net_of_discount() {
        let half = Percent::from_bps(5000);
        // 1 of 2 units at 2.50 with 50% off: 1.25 of a 2.50 balance
        let charge = item_charge(Money::from_cents(250), half, Money::from_cents(250), false);
        assert_eq!(charge, Money::from_cents(125));

        // The last unit settles whatever is left, tip included
        let last = item_charge(Money::from_cents(250), half, Money::from_cents(175), true);
        assert_eq!(last, Money::from_cents(175));

        // Never more than the balance
        let capped = item_charge(Money::from_cents(900), Percent::zero(), Money::from_cents(400), false);
        assert_eq!(capped, Money::from_cents(400));
    }

    fn split(method: PaymentMethod, cents: i64) -> SplitLine {
        SplitLine {
            method,
            amount: Money::from_cents(cents),
            reference: None,
        }
    }

    #[test]
    fn test_split_mismatch() {
        let due = Money::from_cents(3000);
        let short = vec![split(PaymentMethod::Cash, 2000), split(PaymentMethod::Card, 900)];
        assert!(matches!(
            check_splits(&short, due),
            Err(CoreError::AmountMismatch { .. })
        ));
    }

    #[test]
    fn test_split_rejects_mixed_and_single() {
        let due = Money::from_cents(1000);
        assert!(check_splits(&[split(PaymentMethod::Cash, 1000)], due).is_err());
        let nested = vec![split(PaymentMethod::Mixed, 500), split(PaymentMethod::Cash, 500)];
        assert!(matches!(check_splits(&nested, due), Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_cash_change() {
        let due = Money::from_cents(2000);
        assert_eq!(cash_change(Some(Money::from_cents(5000)), due).unwrap().cents(), 3000);
        assert_eq!(cash_change(None, due).unwrap(), Money::zero());
        assert!(cash_change(Some(Money::from_cents(1000)), due).is_err());
    }

    #[test]
    fn test_check_refund() {
        let paid = Money::from_cents(2000);
        assert!(check_refund(Money::from_cents(500), paid, Money::zero()).is_ok());
        assert!(check_refund(Money::from_cents(1600), paid, Money::from_cents(500)).is_err());
        assert!(check_refund(Money::zero(), paid, Money::zero()).is_err());
    }

    #[test]
    fn test_invoice_number_shape() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        let n = invoice_number(date, Uuid::new_v4());
        assert!(n.starts_with("FACT-20250131-"));
        assert_eq!(n.len(), "FACT-20250131-".len() + 8);
        assert!(n[14..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_reconcile_shift() {
        let ledger = ShiftLedger {
            cash_start: Money::from_cents(10_000),
            payments: vec![
                (PaymentMethod::Cash, Money::from_cents(2000)),
                (PaymentMethod::Cash, Money::from_cents(2000)),
                (PaymentMethod::Card, Money::from_cents(1000)),
            ],
            refunds: vec![(PaymentMethod::Cash, Money::from_cents(500))],
            orders: vec![
                (Money::from_cents(200), Money::zero()),
                (Money::zero(), Money::from_cents(100)),
            ],
        };
        let close = reconcile_shift(&ledger, Money::from_cents(13_400));

        assert_eq!(close.cash_expected.cents(), 13_500);
        assert_eq!(close.diff.cents(), -100);
        assert_eq!(close.totals.cash.cents(), 3500);
        assert_eq!(close.totals.card.cents(), 1000);
        assert_eq!(close.total_sales.cents(), 4500);
        assert_eq!(close.total_discounts.cents(), 200);
        assert_eq!(close.total_tips.cents(), 100);
        assert_eq!(close.order_count, 2);
    }
}
