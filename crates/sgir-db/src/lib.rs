//! # sgir-db: Database Layer for SGIR
//!
//! SQLite persistence for the SGIR restaurant core, through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SGIR Data Flow                                 │
//! │                                                                         │
//! │  HTTP handler → service (sgir-api)                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                     sgir-db (THIS CRATE)                        │    │
//! │  │                                                                 │    │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐    │    │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │    │    │
//! │  │   │   (pool.rs)   │    │ (repository/) │    │  (embedded)  │    │    │
//! │  │   │               │    │               │    │              │    │    │
//! │  │   │ SqlitePool    │    │ tables()      │    │ 001_initial  │    │    │
//! │  │   │ WriteUnit     │◄───│ orders()      │    │ 002_accounts │    │    │
//! │  │   │ ReadUnit      │    │ products() …  │    │              │    │    │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘    │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (WAL)                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool, write units and read units
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - One repository per aggregate plus read-model queries
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sgir_db::{Database, DbConfig, Repositories};
//!
//! let db = Database::new(DbConfig::new("./sgir.db")).await?;
//!
//! let mut unit = db.write().await?;
//! let table = unit.tables().require(3).await?;
//! unit.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig, ReadUnit, WriteUnit};
pub use repository::Repositories;
