//! # Supply Repository
//!
//! Ingredients, stocked in thousandths of their unit. Decrements are
//! conditional updates, exactly like products.

use sqlx::sqlite::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use sgir_core::{Qty, Supply, SupplyUnit};

const SUPPLY_COLUMNS: &str = "id, name, category, unit, stock_on_hand, stock_min, active";

#[derive(Debug, Clone)]
pub struct NewSupply {
    pub name: String,
    pub category: Option<String>,
    pub unit: SupplyUnit,
    pub stock_on_hand: Qty,
    pub stock_min: Qty,
}

/// Repository for supplies.
pub struct SupplyRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> SupplyRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        SupplyRepository { conn }
    }

    pub async fn insert(&mut self, new: &NewSupply) -> DbResult<Supply> {
        debug!(name = %new.name, unit = %new.unit, "Inserting supply");

        let result = sqlx::query(
            "INSERT INTO supplies (name, category, unit, stock_on_hand, stock_min, active)
             VALUES (?1, ?2, ?3, ?4, ?5, 1)",
        )
        .bind(&new.name)
        .bind(&new.category)
        .bind(new.unit)
        .bind(new.stock_on_hand)
        .bind(new.stock_min)
        .execute(&mut *self.conn)
        .await?;

        self.require(result.last_insert_rowid()).await
    }

    pub async fn get(&mut self, id: i64) -> DbResult<Option<Supply>> {
        let sql = format!("SELECT {SUPPLY_COLUMNS} FROM supplies WHERE id = ?1");
        let supply = sqlx::query_as::<_, Supply>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(supply)
    }

    pub async fn require(&mut self, id: i64) -> DbResult<Supply> {
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Supply", id))
    }

    /// Loads supplies in ascending id order (the canonical lock order).
    pub async fn require_many(&mut self, ids: &[i64]) -> DbResult<Vec<Supply>> {
        let mut sorted = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut supplies = Vec::with_capacity(sorted.len());
        for id in sorted {
            supplies.push(self.require(id).await?);
        }
        Ok(supplies)
    }

    pub async fn list(&mut self, active_only: bool) -> DbResult<Vec<Supply>> {
        let sql = format!(
            "SELECT {SUPPLY_COLUMNS} FROM supplies
             WHERE (?1 = 0 OR active = 1)
             ORDER BY name, id"
        );
        let supplies = sqlx::query_as::<_, Supply>(&sql)
            .bind(active_only)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(supplies)
    }

    /// Takes `qty` out of stock if enough is on hand.
    ///
    /// ## Returns
    /// * `Ok(Some(stock_after))` - decremented
    /// * `Ok(None)` - not enough stock at write time
    pub async fn decrement_stock(&mut self, id: i64, qty: Qty) -> DbResult<Option<Qty>> {
        debug!(supply_id = id, qty = %qty, "Decrementing supply stock");

        let stock_after = sqlx::query_scalar::<_, i64>(
            "UPDATE supplies SET stock_on_hand = stock_on_hand - ?2
             WHERE id = ?1 AND stock_on_hand >= ?2
             RETURNING stock_on_hand",
        )
        .bind(id)
        .bind(qty)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(stock_after.map(Qty::from_milli))
    }

    pub async fn increment_stock(&mut self, id: i64, qty: Qty) -> DbResult<Qty> {
        debug!(supply_id = id, qty = %qty, "Incrementing supply stock");

        let stock_after = sqlx::query_scalar::<_, i64>(
            "UPDATE supplies SET stock_on_hand = stock_on_hand + ?2
             WHERE id = ?1
             RETURNING stock_on_hand",
        )
        .bind(id)
        .bind(qty)
        .fetch_optional(&mut *self.conn)
        .await?;
        stock_after
            .map(Qty::from_milli)
            .ok_or_else(|| DbError::not_found("Supply", id))
    }
}
