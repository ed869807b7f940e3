//! # Error Types
//!
//! Domain-specific error types for sgir-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  sgir-core errors (this file)                                           │
//! │  ├── CoreError        - Business rule violations (stable wire codes)    │
//! │  └── ValidationError  - Input validation failures                       │
//! │                                                                         │
//! │  sgir-db errors (separate crate)                                        │
//! │  └── DbError          - Database operation failures                     │
//! │                                                                         │
//! │  sgir-api errors (in app)                                               │
//! │  └── ApiError         - What HTTP callers see                           │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ApiError → {"error": code, ...}    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Codes
//! Every variant exposes a stable snake_case `code()` and an [`ErrorKind`].
//! The HTTP adapter only looks at the kind to pick a status; callers only
//! look at the code.

use serde::Serialize;
use thiserror::Error;

use crate::money::{Money, Qty};

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse classification used by the HTTP adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauth,
    Forbidden,
    NotFound,
    Conflict,
    Gone,
    RateLimited,
    Internal,
}

// =============================================================================
// Shortfalls
// =============================================================================

/// One product line that cannot be covered by current stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shortfall {
    pub product: i64,
    pub name: String,
    pub requested: i64,
    pub available: i64,
}

/// One supply that cannot cover a production run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupplyShortfall {
    pub supply: i64,
    pub name: String,
    pub requested: Qty,
    pub available: Qty,
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations or domain logic failures.
/// A failed operation never leaves partial state behind, so callers can
/// re-read and retry.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity lookup by id failed.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    // -------------------------------------------------------------------------
    // Identity & session gate
    // -------------------------------------------------------------------------
    /// Unknown username, wrong password or unmatched PIN.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The principal exists but `active=false`.
    #[error("Account is disabled")]
    AccountDisabled,

    /// No session, or the session expired.
    #[error("Authentication required")]
    Unauthenticated,

    /// Too many failed PIN attempts from one source address.
    ///
    /// ## When This Occurs
    /// ```text
    /// attempt 1..5 fail within 15 min
    ///      │
    ///      ▼
    /// source blocked for 15 min ──► RateLimited { retry_after_secs }
    /// ```
    #[error("Too many attempts, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: i64 },

    #[error("QR token expired")]
    QrExpired,

    #[error("QR token already used")]
    QrConsumed,

    #[error("QR token is not valid")]
    QrInvalid,

    /// Role or area requirement not met.
    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    /// Waiters and cooks cannot act while no shift is open today.
    #[error("The work day is closed")]
    ShiftClosed,

    /// The secondary PIN did not match any active authoriser.
    #[error("Secondary PIN is not valid")]
    InvalidSecondaryPin,

    // -------------------------------------------------------------------------
    // Tables & accounts
    // -------------------------------------------------------------------------
    #[error("No table available for {guests} guests")]
    NoTableAvailable { guests: i64 },

    #[error("Table {number} is not available (status {status})")]
    TableNotAvailable { number: i64, status: String },

    #[error("{guests} guests exceed table {number} capacity of {capacity}")]
    CapacityExceeded { number: i64, guests: i64, capacity: i64 },

    #[error("Table account {account_id} still has unpaid orders")]
    AccountHasUnpaidOrders { account_id: i64 },

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------
    /// Stock cannot cover the requested lines. Nothing was mutated.
    #[error("Insufficient stock for {} product(s)", shortfalls.len())]
    InsufficientStock { shortfalls: Vec<Shortfall> },

    /// A conditional stock update matched zero rows (lost race).
    #[error("Stock for product {product_id} changed concurrently")]
    StockRace { product_id: i64 },

    #[error("Cannot move {entity} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// Order is already paid; payment or modification rejected.
    #[error("Order {order_id} is already paid")]
    PaymentAlreadyDone { order_id: i64 },

    /// A change would push `total_final` under what was already collected.
    #[error("Total {total} would fall below paid amount {paid}")]
    TotalBelowPaid { total: Money, paid: Money },

    #[error("Line {item_id} has {qty_paid} paid unit(s); reduce it to the paid quantity instead")]
    ItemPartiallyPaid { item_id: i64, qty_paid: i64 },

    #[error("Cannot remove the only item of order {order_id}")]
    LastItem { order_id: i64 },

    // -------------------------------------------------------------------------
    // Inventory & production
    // -------------------------------------------------------------------------
    #[error("Product {product_id} has no active recipe")]
    RecipeMissing { product_id: i64 },

    #[error("Product {product_id} is not manufactured")]
    NotManufactured { product_id: i64 },

    /// Supplies cannot cover a production run. Nothing was mutated.
    #[error("Insufficient supply stock for {} supply(ies)", shortfalls.len())]
    InsufficientSupply { shortfalls: Vec<SupplyShortfall> },

    /// Later sales consumed part of what a production created.
    #[error("Cannot void: product {product_id} has {available}, production made {required}")]
    CannotVoidInsufficientProductStock {
        product_id: i64,
        required: i64,
        available: i64,
    },

    // -------------------------------------------------------------------------
    // Cash register
    // -------------------------------------------------------------------------
    #[error("A shift is already open for this cashier today")]
    ShiftAlreadyOpen,

    #[error("No open shift for this cashier today")]
    ShiftNotOpen,

    /// Split sum differs from the amount due.
    #[error("Amounts do not match: expected {expected}, got {got}")]
    AmountMismatch { expected: Money, got: Money },

    #[error("Refund {requested} exceeds refundable {refundable}")]
    RefundExceedsPaid { requested: Money, refundable: Money },

    /// Generic uniqueness violation (username, table number, ...).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        CoreError::Forbidden {
            reason: reason.into(),
        }
    }

    /// Stable snake_case code returned in the `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NotFound { .. } => "not_found",
            CoreError::InvalidCredentials => "invalid_credentials",
            CoreError::AccountDisabled => "account_disabled",
            CoreError::Unauthenticated => "unauthenticated",
            CoreError::RateLimited { .. } => "rate_limited",
            CoreError::QrExpired => "qr_expired",
            CoreError::QrConsumed => "qr_consumed",
            CoreError::QrInvalid => "qr_invalid",
            CoreError::Forbidden { .. } => "forbidden",
            CoreError::ShiftClosed => "shift_closed",
            CoreError::InvalidSecondaryPin => "invalid_secondary_pin",
            CoreError::NoTableAvailable { .. } => "no_table_available",
            CoreError::TableNotAvailable { .. } => "table_not_available",
            CoreError::CapacityExceeded { .. } => "capacity_exceeded",
            CoreError::AccountHasUnpaidOrders { .. } => "account_has_unpaid_orders",
            CoreError::InsufficientStock { .. } => "insufficient_stock",
            CoreError::StockRace { .. } => "insufficient_stock",
            CoreError::InvalidTransition { .. } => "invalid_transition",
            CoreError::PaymentAlreadyDone { .. } => "payment_already_done",
            CoreError::TotalBelowPaid { .. } => "total_below_paid",
            CoreError::ItemPartiallyPaid { .. } => "item_partially_paid",
            CoreError::LastItem { .. } => "last_item",
            CoreError::RecipeMissing { .. } => "recipe_missing",
            CoreError::NotManufactured { .. } => "not_manufactured",
            CoreError::InsufficientSupply { .. } => "insufficient_stock",
            CoreError::CannotVoidInsufficientProductStock { .. } => {
                "cannot_void_insufficient_product_stock"
            }
            CoreError::ShiftAlreadyOpen => "shift_already_open",
            CoreError::ShiftNotOpen => "shift_not_open",
            CoreError::AmountMismatch { .. } => "amount_mismatch",
            CoreError::RefundExceedsPaid { .. } => "refund_exceeds_paid",
            CoreError::Duplicate { .. } => "duplicate",
            CoreError::Validation(_) => "validation",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::InvalidCredentials | CoreError::Unauthenticated | CoreError::QrInvalid => {
                ErrorKind::Unauth
            }
            CoreError::AccountDisabled
            | CoreError::Forbidden { .. }
            | CoreError::ShiftClosed
            | CoreError::InvalidSecondaryPin => ErrorKind::Forbidden,
            CoreError::RateLimited { .. } => ErrorKind::RateLimited,
            CoreError::QrExpired | CoreError::QrConsumed => ErrorKind::Gone,
            CoreError::CapacityExceeded { .. } | CoreError::Validation(_) => ErrorKind::Validation,
            _ => ErrorKind::Conflict,
        }
    }

    /// Structured detail for the `detail` field, when a variant has any.
    pub fn detail(&self) -> Option<serde_json::Value> {
        match self {
            CoreError::InsufficientStock { shortfalls } => {
                Some(serde_json::json!({ "shortfalls": shortfalls }))
            }
            CoreError::InsufficientSupply { shortfalls } => {
                Some(serde_json::json!({ "shortfalls": shortfalls }))
            }
            CoreError::StockRace { product_id } => {
                Some(serde_json::json!({ "product": product_id, "race": true }))
            }
            CoreError::AmountMismatch { expected, got } => {
                Some(serde_json::json!({ "expected": expected, "got": got }))
            }
            CoreError::CannotVoidInsufficientProductStock {
                product_id,
                required,
                available,
            } => Some(serde_json::json!({
                "product": product_id,
                "required": required,
                "available": available,
            })),
            CoreError::RateLimited { retry_after_secs } => {
                Some(serde_json::json!({ "retry_after_secs": retry_after_secs }))
            }
            CoreError::Validation(v) => Some(serde_json::json!({ "field": v.field() })),
            _ => None,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., malformed date or decimal).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value inside one request (e.g., same supply twice in a recipe).
    #[error("{field} '{value}' is repeated")]
    Repeated { field: String, value: String },
}

impl ValidationError {
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required { field }
            | ValidationError::TooLong { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::MustBePositive { field }
            | ValidationError::MustNotBeNegative { field }
            | ValidationError::InvalidFormat { field, .. }
            | ValidationError::NotAllowed { field, .. }
            | ValidationError::Repeated { field, .. } => field,
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_kinds() {
        let err = CoreError::InsufficientStock { shortfalls: vec![] };
        assert_eq!(err.code(), "insufficient_stock");
        assert_eq!(err.kind(), ErrorKind::Conflict);

        assert_eq!(CoreError::QrConsumed.kind(), ErrorKind::Gone);
        assert_eq!(CoreError::QrInvalid.kind(), ErrorKind::Unauth);
        assert_eq!(CoreError::ShiftClosed.kind(), ErrorKind::Forbidden);
        assert_eq!(
            CoreError::RateLimited { retry_after_secs: 60 }.kind(),
            ErrorKind::RateLimited
        );
    }

    #[test]
    fn test_shortfall_detail() {
        let err = CoreError::InsufficientStock {
            shortfalls: vec![Shortfall {
                product: 1,
                name: "P1".to_string(),
                requested: 2,
                available: 1,
            }],
        };
        let detail = err.detail().unwrap();
        assert_eq!(detail["shortfalls"][0]["product"], 1);
        assert_eq!(detail["shortfalls"][0]["requested"], 2);
        assert_eq!(detail["shortfalls"][0]["available"], 1);
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "username".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert_eq!(core_err.code(), "validation");
        assert_eq!(core_err.kind(), ErrorKind::Validation);
        assert_eq!(core_err.detail().unwrap()["field"], "username");
    }

    #[test]
    fn test_error_messages() {
        let err = CoreError::AmountMismatch {
            expected: Money::from_cents(3000),
            got: Money::from_cents(2900),
        };
        assert_eq!(err.to_string(), "Amounts do not match: expected 30.00, got 29.00");
    }
}
