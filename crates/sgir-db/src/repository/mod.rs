//! # Repository Module
//!
//! Database repository implementations for SGIR.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories over one connection                     │
//! │                                                                         │
//! │  Service                                                                │
//! │       │  let mut unit = db.write().await?;                              │
//! │       │  unit.tables().get(3)                                           │
//! │       │  unit.orders().insert(..)                                       │
//! │       │  unit.products().decrement_stock(..)                            │
//! │       │  unit.commit()                                                  │
//! │       ▼                                                                 │
//! │  XRepository<'c> { conn: &'c mut SqliteConnection }                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (same transaction for every repository of the unit)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every repository borrows the unit's connection, so all of them share the
//! unit's transaction. Repositories never commit.
//!
//! ## Available Repositories
//!
//! - [`PrincipalRepository`] - Principals and QR tokens
//! - [`TableRepository`] - Tables and grouping
//! - [`AccountRepository`] - Table accounts
//! - [`ReservationRepository`] - Reservations
//! - [`OrderRepository`] - Orders and order items
//! - [`ProductRepository`] - Products and conditional stock updates
//! - [`SupplyRepository`] - Supplies and conditional stock updates
//! - [`RecipeRepository`] - Recipes and recipe items
//! - [`ProductionRepository`] - Productions and snapshots
//! - [`MovementRepository`] - Stock movements
//! - [`AlertRepository`] - Stock alerts
//! - [`ShiftRepository`] - Cash register shifts
//! - [`PaymentRepository`] - Transactions, splits, refunds
//! - [`HistoryRepository`] - Append-only audit entries
//! - [`DashboardRepository`] - Read-model queries

use sqlx::sqlite::SqliteConnection;

pub mod account;
pub mod alert;
pub mod dashboard;
pub mod history;
pub mod movement;
pub mod order;
pub mod payment;
pub mod principal;
pub mod product;
pub mod production;
pub mod recipe;
pub mod reservation;
pub mod shift;
pub mod supply;
pub mod table;

pub use account::AccountRepository;
pub use alert::{alert_kind_for, AlertRepository, AUTO_RESOLVE_NOTE};
pub use dashboard::DashboardRepository;
pub use history::{HistoryRepository, NewHistoryEntry};
pub use movement::{MovementRepository, NewMovement};
pub use order::{NewOrder, OrderRepository};
pub use payment::PaymentRepository;
pub use principal::{NewPrincipal, PrincipalRepository};
pub use product::{NewProduct, ProductRepository};
pub use production::ProductionRepository;
pub use recipe::RecipeRepository;
pub use reservation::ReservationRepository;
pub use shift::ShiftRepository;
pub use supply::{NewSupply, SupplyRepository};
pub use table::TableRepository;

/// Repository accessors over a single connection.
///
/// Implemented by [`crate::WriteUnit`] and [`crate::ReadUnit`].
pub trait Repositories {
    fn conn(&mut self) -> &mut SqliteConnection;

    fn principals(&mut self) -> PrincipalRepository<'_> {
        PrincipalRepository::new(self.conn())
    }

    fn tables(&mut self) -> TableRepository<'_> {
        TableRepository::new(self.conn())
    }

    fn accounts(&mut self) -> AccountRepository<'_> {
        AccountRepository::new(self.conn())
    }

    fn reservations(&mut self) -> ReservationRepository<'_> {
        ReservationRepository::new(self.conn())
    }

    fn orders(&mut self) -> OrderRepository<'_> {
        OrderRepository::new(self.conn())
    }

    fn products(&mut self) -> ProductRepository<'_> {
        ProductRepository::new(self.conn())
    }

    fn supplies(&mut self) -> SupplyRepository<'_> {
        SupplyRepository::new(self.conn())
    }

    fn recipes(&mut self) -> RecipeRepository<'_> {
        RecipeRepository::new(self.conn())
    }

    fn productions(&mut self) -> ProductionRepository<'_> {
        ProductionRepository::new(self.conn())
    }

    fn movements(&mut self) -> MovementRepository<'_> {
        MovementRepository::new(self.conn())
    }

    fn alerts(&mut self) -> AlertRepository<'_> {
        AlertRepository::new(self.conn())
    }

    fn shifts(&mut self) -> ShiftRepository<'_> {
        ShiftRepository::new(self.conn())
    }

    fn payments(&mut self) -> PaymentRepository<'_> {
        PaymentRepository::new(self.conn())
    }

    fn history(&mut self) -> HistoryRepository<'_> {
        HistoryRepository::new(self.conn())
    }

    fn dashboard(&mut self) -> DashboardRepository<'_> {
        DashboardRepository::new(self.conn())
    }
}
