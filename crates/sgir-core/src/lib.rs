//! # sgir-core: Pure Business Logic for SGIR
//!
//! This crate holds the rules of the restaurant back-of-house engine as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SGIR Architecture                                │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                    HTTP clients                                 │    │
//! │  │   waiter tablets · kitchen board · cash register · QR menus     │    │
//! │  └─────────────────────────────┬───────────────────────────────────┘    │
//! │                                │ JSON                                   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │                    sgir-api (axum)                              │    │
//! │  │   session gate · liveness gate · services · webhook façade      │    │
//! │  └─────────────────────────────┬───────────────────────────────────┘    │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │               ★ sgir-core (THIS CRATE) ★                        │    │
//! │  │                                                                 │    │
//! │  │   types · money · order · table · production · cash             │    │
//! │  │   permissions · history · dashboard · validation                │    │
//! │  │                                                                 │    │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │                    sgir-db (Database Layer)                     │    │
//! │  │              SQLite queries, migrations, repositories           │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Entities and wire enumerations
//! - [`money`] - `Money` (cents), `Qty` (thousandths), `Percent` (bps)
//! - [`error`] - Domain error types with stable wire codes
//! - [`validation`] - Input validation
//! - [`order`] - Order state machine and totals
//! - [`table`] - Seating search, grouping, account status rules
//! - [`production`] - Recipe requirement math and production guards
//! - [`cash`] - Splits, change, invoice numbers, shift reconciliation
//! - [`permissions`] - Role/area requirements
//! - [`history`] - Audit diff helper
//! - [`dashboard`] - Read model views
//!
//! ## Example Usage
//!
//! ```rust
//! use sgir_core::money::{Money, Percent};
//! use sgir_core::order::Totals;
//!
//! let totals = Totals::compute(Money::from_cents(2000), Percent::from_bps(1000), Money::zero());
//! assert_eq!(totals.total_final.cents(), 1800);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cash;
pub mod dashboard;
pub mod error;
pub mod history;
pub mod money;
pub mod order;
pub mod permissions;
pub mod production;
pub mod table;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::{Money, Percent, Qty};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Largest party a single order or table may seat.
pub const MAX_GUESTS: i64 = 50;

/// Maximum quantity on a single order line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (typing 1000 instead of 10).
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Maximum distinct lines in one order request.
pub const MAX_ORDER_LINES: usize = 100;

/// Largest group the seating search or a manual combine may form.
pub const MAX_COMBINED_TABLES: usize = 3;

/// Longest lifetime of a QR login token.
pub const QR_MAX_AGE_MINUTES: i64 = 24 * 60;
