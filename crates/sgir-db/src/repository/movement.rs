//! # Stock Movement Repository
//!
//! One row per signed stock change. Quantities are product units or supply
//! thousandths depending on `target`.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;

use crate::error::DbResult;
use sgir_core::{MovementKind, StockMovement, StockTarget};

#[derive(Debug, Clone)]
pub struct NewMovement {
    pub target: StockTarget,
    pub target_id: i64,
    pub kind: MovementKind,
    pub delta: i64,
    pub stock_after: i64,
    pub order_id: Option<i64>,
    pub production_id: Option<i64>,
    pub actor_id: Option<i64>,
    pub note: String,
}

impl NewMovement {
    pub fn new(target: StockTarget, target_id: i64, kind: MovementKind, delta: i64, stock_after: i64) -> Self {
        NewMovement {
            target,
            target_id,
            kind,
            delta,
            stock_after,
            order_id: None,
            production_id: None,
            actor_id: None,
            note: String::new(),
        }
    }

    pub fn order(mut self, order_id: i64) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn production(mut self, production_id: i64) -> Self {
        self.production_id = Some(production_id);
        self
    }

    pub fn actor(mut self, actor_id: i64) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }
}

/// Repository for stock movements.
pub struct MovementRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> MovementRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        MovementRepository { conn }
    }

    pub async fn insert(&mut self, movement: &NewMovement, now: DateTime<Utc>) -> DbResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO stock_movements (
                target, target_id, kind, delta, stock_after,
                order_id, production_id, actor_id, note, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(movement.target)
        .bind(movement.target_id)
        .bind(movement.kind)
        .bind(movement.delta)
        .bind(movement.stock_after)
        .bind(movement.order_id)
        .bind(movement.production_id)
        .bind(movement.actor_id)
        .bind(&movement.note)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Most recent movements of one product or supply.
    pub async fn for_target(
        &mut self,
        target: StockTarget,
        target_id: i64,
        limit: i64,
    ) -> DbResult<Vec<StockMovement>> {
        let movements = sqlx::query_as::<_, StockMovement>(
            "SELECT id, target, target_id, kind, delta, stock_after, order_id, production_id,
                    actor_id, note, created_at
             FROM stock_movements
             WHERE target = ?1 AND target_id = ?2
             ORDER BY id DESC
             LIMIT ?3",
        )
        .bind(target)
        .bind(target_id)
        .bind(limit)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(movements)
    }

    /// Net of every delta recorded for one target.
    pub async fn net_delta(&mut self, target: StockTarget, target_id: i64) -> DbResult<i64> {
        let net = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(delta), 0) FROM stock_movements WHERE target = ?1 AND target_id = ?2",
        )
        .bind(target)
        .bind(target_id)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(net)
    }
}
