//! # Production Repository
//!
//! Production runs and the per-supply snapshots captured when they apply.
//!
//! ## State Updates
//! `mark_applied` and `mark_voided` carry the expected source state in their
//! `WHERE` clause, so a second apply (or void) of the same run observes zero
//! affected rows.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use sgir_core::{Production, ProductionSnapshot, Qty, SupplyUnit};

const PRODUCTION_COLUMNS: &str = "id, product_id, recipe_id, qty_produced, lot, state, notes, \
     created_by, created_at, applied_by, applied_at, voided_by, voided_at, void_reason, \
     secondary_pin_validated";

/// Repository for productions.
pub struct ProductionRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ProductionRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        ProductionRepository { conn }
    }

    /// Registers a production. No stock moves.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
        &mut self,
        product_id: i64,
        recipe_id: i64,
        qty_produced: i64,
        lot: Option<&str>,
        notes: &str,
        created_by: i64,
        now: DateTime<Utc>,
    ) -> DbResult<Production> {
        debug!(product_id, recipe_id, qty_produced, "Registering production");

        let result = sqlx::query(
            r#"
            INSERT INTO productions (
                product_id, recipe_id, qty_produced, lot, state, notes, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, 'registered', ?5, ?6, ?7)
            "#,
        )
        .bind(product_id)
        .bind(recipe_id)
        .bind(qty_produced)
        .bind(lot)
        .bind(notes)
        .bind(created_by)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        self.require(result.last_insert_rowid()).await
    }

    pub async fn get(&mut self, id: i64) -> DbResult<Option<Production>> {
        let sql = format!("SELECT {PRODUCTION_COLUMNS} FROM productions WHERE id = ?1");
        let production = sqlx::query_as::<_, Production>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(production)
    }

    pub async fn require(&mut self, id: i64) -> DbResult<Production> {
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Production", id))
    }

    /// `registered → applied`. Returns `false` if the run was not registered.
    pub async fn mark_applied(&mut self, id: i64, actor: i64, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE productions SET state = 'applied', applied_by = ?2, applied_at = ?3
             WHERE id = ?1 AND state = 'registered'",
        )
        .bind(id)
        .bind(actor)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// `applied → voided`. Returns `false` if the run was not applied.
    pub async fn mark_voided(
        &mut self,
        id: i64,
        actor: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE productions
             SET state = 'voided', voided_by = ?2, voided_at = ?3, void_reason = ?4,
                 secondary_pin_validated = 1
             WHERE id = ?1 AND state = 'applied'",
        )
        .bind(id)
        .bind(actor)
        .bind(now)
        .bind(reason)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn insert_snapshot(
        &mut self,
        production_id: i64,
        supply_id: i64,
        qty_consumed: Qty,
        unit: SupplyUnit,
        stock_before: Qty,
        stock_after: Qty,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO production_snapshots (
                production_id, supply_id, qty_consumed, unit, stock_before, stock_after
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(production_id)
        .bind(supply_id)
        .bind(qty_consumed)
        .bind(unit)
        .bind(stock_before)
        .bind(stock_after)
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    /// Snapshots of a production in ascending supply id order.
    pub async fn snapshots(&mut self, production_id: i64) -> DbResult<Vec<ProductionSnapshot>> {
        let snapshots = sqlx::query_as::<_, ProductionSnapshot>(
            "SELECT id, production_id, supply_id, qty_consumed, unit, stock_before, stock_after
             FROM production_snapshots WHERE production_id = ?1 ORDER BY supply_id",
        )
        .bind(production_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(snapshots)
    }
}
