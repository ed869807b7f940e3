//! # Stock Alert Repository
//!
//! ## Evaluation
//! ```text
//! stock_after == 0              → keep/create `out`, resolve `low`
//! 0 < stock_after ≤ stock_min   → keep/create `low`, resolve `out`
//! stock_after > stock_min       → resolve both
//! ```
//!
//! Runs inline, right after the stock change that triggered it, inside the
//! same write unit. A partial unique index keeps one active alert per
//! `(target, kind)`.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use tracing::info;

use crate::error::{DbError, DbResult};
use sgir_core::dashboard::AlertView;
use sgir_core::{AlertKind, StockAlert, StockTarget};

const ALERT_COLUMNS: &str = "id, target, target_id, kind, observed_stock, state, resolved_by, \
     resolved_at, note, created_at";

/// Note written on alerts resolved by a stock change.
pub const AUTO_RESOLVE_NOTE: &str = "auto";

/// Which alert kind, if any, a stock level calls for.
pub fn alert_kind_for(stock: i64, stock_min: i64) -> Option<AlertKind> {
    if stock <= 0 {
        Some(AlertKind::Out)
    } else if stock <= stock_min {
        Some(AlertKind::Low)
    } else {
        None
    }
}

/// Repository for stock alerts.
pub struct AlertRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> AlertRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        AlertRepository { conn }
    }

    /// Re-evaluates the alerts of one target after a stock change.
    pub async fn evaluate(
        &mut self,
        target: StockTarget,
        target_id: i64,
        stock: i64,
        stock_min: i64,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let wanted = alert_kind_for(stock, stock_min);

        for &kind in AlertKind::ALL {
            if Some(kind) == wanted {
                let refreshed = sqlx::query(
                    "UPDATE stock_alerts SET observed_stock = ?4
                     WHERE target = ?1 AND target_id = ?2 AND kind = ?3 AND state = 'active'",
                )
                .bind(target)
                .bind(target_id)
                .bind(kind)
                .bind(stock)
                .execute(&mut *self.conn)
                .await?;

                if refreshed.rows_affected() == 0 {
                    info!(stock_target = %target, target_id, kind = %kind, stock, "Raising stock alert");
                    sqlx::query(
                        "INSERT INTO stock_alerts (target, target_id, kind, observed_stock, state, created_at)
                         VALUES (?1, ?2, ?3, ?4, 'active', ?5)",
                    )
                    .bind(target)
                    .bind(target_id)
                    .bind(kind)
                    .bind(stock)
                    .bind(now)
                    .execute(&mut *self.conn)
                    .await?;
                }
            } else {
                sqlx::query(
                    "UPDATE stock_alerts
                     SET state = 'resolved', resolved_at = ?4, note = ?5, observed_stock = ?6
                     WHERE target = ?1 AND target_id = ?2 AND kind = ?3 AND state = 'active'",
                )
                .bind(target)
                .bind(target_id)
                .bind(kind)
                .bind(now)
                .bind(AUTO_RESOLVE_NOTE)
                .bind(stock)
                .execute(&mut *self.conn)
                .await?;
            }
        }
        Ok(())
    }

    pub async fn get(&mut self, id: i64) -> DbResult<Option<StockAlert>> {
        let sql = format!("SELECT {ALERT_COLUMNS} FROM stock_alerts WHERE id = ?1");
        let alert = sqlx::query_as::<_, StockAlert>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(alert)
    }

    pub async fn require(&mut self, id: i64) -> DbResult<StockAlert> {
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("StockAlert", id))
    }

    /// Manually resolves an active alert. Returns `false` if it was not active.
    pub async fn resolve(
        &mut self,
        id: i64,
        actor: i64,
        note: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE stock_alerts SET state = 'resolved', resolved_by = ?2, resolved_at = ?3, note = ?4
             WHERE id = ?1 AND state = 'active'",
        )
        .bind(id)
        .bind(actor)
        .bind(now)
        .bind(note)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Alerts joined with the name and minimum of their target, newest first.
    pub async fn list_views(&mut self, active_only: bool) -> DbResult<Vec<AlertView>> {
        let sql = format!(
            r#"
            SELECT a.{cols},
                   COALESCE(p.name, s.name, '') AS target_name,
                   COALESCE(p.stock_min, s.stock_min, 0) AS stock_min
            FROM stock_alerts a
            LEFT JOIN products p ON a.target = 'product' AND p.id = a.target_id
            LEFT JOIN supplies s ON a.target = 'supply' AND s.id = a.target_id
            WHERE (?1 = 0 OR a.state = 'active')
            ORDER BY a.created_at DESC, a.id DESC
            "#,
            cols = ALERT_COLUMNS.replace(", ", ", a."),
        );
        let rows = sqlx::query_as::<_, AlertViewRow>(&sql)
            .bind(active_only)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(rows.into_iter().map(AlertView::from).collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AlertViewRow {
    #[sqlx(flatten)]
    alert: StockAlert,
    target_name: String,
    stock_min: i64,
}

impl From<AlertViewRow> for AlertView {
    fn from(row: AlertViewRow) -> Self {
        AlertView {
            alert: row.alert,
            target_name: row.target_name,
            stock_min: row.stock_min,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_kind_for() {
        assert_eq!(alert_kind_for(0, 5), Some(AlertKind::Out));
        assert_eq!(alert_kind_for(0, 0), Some(AlertKind::Out));
        assert_eq!(alert_kind_for(3, 5), Some(AlertKind::Low));
        assert_eq!(alert_kind_for(5, 5), Some(AlertKind::Low));
        assert_eq!(alert_kind_for(6, 5), None);
        assert_eq!(alert_kind_for(1, 0), None);
    }
}
