//! # Money and Quantity Module
//!
//! Provides the fixed-point value types every monetary or stock figure flows
//! through.
//!
//! ## Why Integer Units?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  OUR SOLUTION: Integer smallest units                                   │
//! │    Money   → cents         (2 fractional digits)                        │
//! │    Qty     → thousandths   (3 fractional digits, supplies)              │
//! │    Percent → basis points  (1 bps = 0.01%)                              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use sgir_core::money::{Money, Percent};
//!
//! let unit_price = Money::from_cents(1000); // 10.00
//! let subtotal = unit_price.multiply_quantity(2);
//! assert_eq!(subtotal.cents(), 2000);
//!
//! let discount = subtotal.percent_of(Percent::from_bps(1000)); // 10%
//! assert_eq!(discount.cents(), 200);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in cents.
///
/// ## Design Decisions
/// - **i64 (signed)**: refunds and reconciliation differences can be negative
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Wire format**: serialised as the integer number of cents
///
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                    Where Money is Used                                  │
/// │                                                                         │
/// │  Product.price ──► OrderItem.unit_price ──► OrderItem.subtotal          │
/// │                                                 │                       │
/// │  Order.subtotal − discount + tip = Order.total_final                    │
/// │                                                 │                       │
/// │  Transaction.amount ──► Shift per-method totals ──► cash_expected       │
/// │                                                 │                       │
/// │  TableAccount.total_accumulated / total_paid ◄──┘                       │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// ## Example
    /// ```rust
    /// use sgir_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(10, 50).cents(), 1050);
    /// assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    /// ```
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Clamps negative values to zero.
    ///
    /// Used for `max(0, subtotal − discount)` and cash change.
    #[inline]
    pub const fn non_negative(&self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            Money(self.0)
        }
    }

    /// Multiplies money by an integer quantity.
    ///
    /// ## Example
    /// ```rust
    /// use sgir_core::money::Money;
    ///
    /// let line = Money::from_cents(299).multiply_quantity(3);
    /// assert_eq!(line.cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Returns `self × pct`, rounded half away from zero to the cent.
    ///
    /// ## Implementation
    /// Integer math in i128: `(amount * bps + 5000) / 10000`.
    pub fn percent_of(&self, pct: Percent) -> Money {
        let raw = self.0 as i128 * pct.bps() as i128;
        let rounded = if raw >= 0 {
            (raw + 5000) / 10000
        } else {
            (raw - 5000) / 10000
        };
        Money(rounded as i64)
    }

    /// Tax portion for an informational estimate.
    pub fn calculate_tax(&self, rate: Percent) -> Money {
        self.percent_of(rate)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

/// Parses decimal strings such as `"20.00"`, `"7.5"` or `"-3"`.
impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed(s, 2).map(Money).ok_or_else(|| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: format!("'{}' is not a decimal with at most 2 fractional digits", s),
        })
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Quantity Type
// =============================================================================

/// A supply quantity in thousandths of its unit (3 fractional digits).
///
/// `Qty::from_milli(500)` is half a kilogram when the supply unit is `kg`.
/// Sellable products keep integer stock and do not use this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Qty(i64);

impl Qty {
    pub const SCALE: i64 = 1000;

    #[inline]
    pub const fn from_milli(milli: i64) -> Self {
        Qty(milli)
    }

    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Qty(units * Self::SCALE)
    }

    #[inline]
    pub const fn milli(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Qty(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Total requirement for a production run:
    /// `per_unit × (1 + loss/100) × count`, rounded half up to the thousandth.
    ///
    /// ## Example
    /// ```rust
    /// use sgir_core::money::{Percent, Qty};
    ///
    /// // 0.5 kg per unit, no loss, 10 units → 5 kg
    /// let req = Qty::from_milli(500).scaled_with_loss(Percent::zero(), 10);
    /// assert_eq!(req, Qty::from_units(5));
    ///
    /// // 0.2 l per unit, 10% loss, 10 units → 2.2 l
    /// let req = Qty::from_milli(200).scaled_with_loss(Percent::from_bps(1000), 10);
    /// assert_eq!(req.milli(), 2200);
    /// ```
    pub fn scaled_with_loss(&self, loss: Percent, count: i64) -> Qty {
        let raw = self.0 as i128 * count as i128 * (10_000 + loss.bps() as i128);
        Qty(((raw + 5000) / 10_000) as i64)
    }
}

impl fmt::Display for Qty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{}{}.{:03}", sign, abs / Self::SCALE, abs % Self::SCALE)
    }
}

impl FromStr for Qty {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed(s, 3).map(Qty).ok_or_else(|| ValidationError::InvalidFormat {
            field: "quantity".to_string(),
            reason: format!("'{}' is not a decimal with at most 3 fractional digits", s),
        })
    }
}

impl Add for Qty {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Qty(self.0 + other.0)
    }
}

impl Sub for Qty {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Qty(self.0 - other.0)
    }
}

// =============================================================================
// Percent
// =============================================================================

/// A percentage in basis points (1 bps = 0.01%, 10000 = 100%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Percent(i64);

impl Percent {
    pub const HUNDRED: Percent = Percent(10_000);

    #[inline]
    pub const fn from_bps(bps: i64) -> Self {
        Percent(bps)
    }

    /// Converts a human percentage (`12.5` → 1250 bps).
    pub fn from_percentage(pct: f64) -> Self {
        Percent((pct * 100.0).round() as i64)
    }

    #[inline]
    pub const fn bps(&self) -> i64 {
        self.0
    }

    /// Display-only conversion back to a human percentage.
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Percent(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

/// Shared fixed-point parser: `digits` is the number of fractional digits kept.
fn parse_fixed(s: &str, digits: u32) -> Option<i64> {
    let s = s.trim();
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if body.is_empty() {
        return None;
    }

    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, f),
        None => (body, ""),
    };
    if frac_part.len() > digits as usize
        || !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
        || (int_part.is_empty() && frac_part.is_empty())
    {
        return None;
    }

    let scale = 10_i64.pow(digits);
    let int_value: i64 = if int_part.is_empty() { 0 } else { int_part.parse().ok()? };
    let mut frac_value: i64 = if frac_part.is_empty() { 0 } else { frac_part.parse().ok()? };
    for _ in frac_part.len()..digits as usize {
        frac_value *= 10;
    }

    let value = int_value.checked_mul(scale)?.checked_add(frac_value)?;
    Some(if negative { -value } else { value })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(2000).to_string(), "20.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Qty::from_milli(2500).to_string(), "2.500");
    }

    #[test]
    fn test_parse_money() {
        assert_eq!("20.00".parse::<Money>().unwrap().cents(), 2000);
        assert_eq!("7.5".parse::<Money>().unwrap().cents(), 750);
        assert_eq!("3".parse::<Money>().unwrap().cents(), 300);
        assert_eq!("-1.25".parse::<Money>().unwrap().cents(), -125);
        assert!("1.234".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!("".parse::<Money>().is_err());
    }

    #[test]
    fn test_parse_qty() {
        assert_eq!("0.5".parse::<Qty>().unwrap().milli(), 500);
        assert_eq!("0.125".parse::<Qty>().unwrap().milli(), 125);
        assert!("0.1255".parse::<Qty>().is_err());
    }

    #[test]
    fn test_percent_of_rounds_to_cent() {
        // 33.33% of 10.00 = 3.333 → 3.33
        let amount = Money::from_cents(1000);
        assert_eq!(amount.percent_of(Percent::from_bps(3333)).cents(), 333);
        // 12.5% of 0.99 = 0.12375 → 0.12
        assert_eq!(Money::from_cents(99).percent_of(Percent::from_bps(1250)).cents(), 12);
        assert_eq!(amount.percent_of(Percent::HUNDRED), amount);
    }

    #[test]
    fn test_non_negative() {
        assert_eq!(Money::from_cents(-10).non_negative(), Money::zero());
        assert_eq!(Money::from_cents(10).non_negative().cents(), 10);
    }

    #[test]
    fn test_scaled_with_loss() {
        let per_unit = Qty::from_milli(500);
        assert_eq!(per_unit.scaled_with_loss(Percent::zero(), 10).milli(), 5000);
        assert_eq!(per_unit.scaled_with_loss(Percent::from_bps(500), 3).milli(), 1575);
    }

    #[test]
    fn test_percent_from_percentage() {
        assert_eq!(Percent::from_percentage(12.5).bps(), 1250);
        assert_eq!(Percent::from_percentage(100.0), Percent::HUNDRED);
    }

    #[test]
    fn test_sum() {
        let total: Money = [100, 250, 50].iter().map(|c| Money::from_cents(*c)).sum();
        assert_eq!(total.cents(), 400);
    }
}
