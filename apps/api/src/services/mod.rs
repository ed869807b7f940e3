//! # Service Layer
//!
//! One module per component. Every mutating operation runs inside exactly
//! one write unit and commits at the end; any `?` before the commit drops
//! the unit, which rolls the whole operation back.
//!
//! ```text
//! ┌──────────────┬──────────────────────────────────────────────────────────┐
//! │ identity     │ logins, logout, QR issue, provisioning, secondary PIN    │
//! │ tables       │ assign, combine, accounts, release, debt                 │
//! │ orders       │ create, lines, discount, tip, reassign, cancel, step     │
//! │ inventory    │ catalogue, stock adjust, recipes, productions, alerts    │
//! │ cash         │ shifts, payments (simple / split / items), refunds       │
//! │ reservations │ hold, cancel, no-show sweep                              │
//! │ dashboard    │ versioned read-model snapshots                           │
//! └──────────────┴──────────────────────────────────────────────────────────┘
//! ```

pub mod cash;
pub mod dashboard;
pub mod identity;
pub mod inventory;
pub mod orders;
pub mod reservations;
pub mod tables;

use chrono::{DateTime, Utc};

use sgir_core::{Product, StockTarget};
use sgir_db::{DbResult, Repositories, WriteUnit};

/// Re-evaluates the alerts of a product after its stock changed.
/// Products that do not track inventory never raise alerts.
pub(crate) async fn evaluate_product_alerts(
    unit: &mut WriteUnit,
    product: &Product,
    stock: i64,
    now: DateTime<Utc>,
) -> DbResult<()> {
    if !product.tracks_inventory {
        return Ok(());
    }
    unit.alerts()
        .evaluate(StockTarget::Product, product.id, stock, product.stock_min, now)
        .await
}
