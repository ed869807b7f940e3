//! # Shift Repository
//!
//! Cash register shifts. A partial unique index on `(cashier_id, date)`
//! where `state = 'open'` keeps at most one open shift per cashier and day;
//! a second `open()` fails with a unique violation on `shifts.cashier_id`.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteConnection;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use sgir_core::cash::ShiftClose;
use sgir_core::{Money, Shift, ShiftTurn};

const SHIFT_COLUMNS: &str = "id, cashier_id, date, turn, state, cash_start, cash_expected, \
     cash_real, diff, total_cash, total_card, total_qr, total_mobile, total_sales, \
     total_discounts, total_tips, order_count, opened_at, closed_at, notes";

/// Repository for shifts.
pub struct ShiftRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ShiftRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        ShiftRepository { conn }
    }

    pub async fn open(
        &mut self,
        cashier_id: i64,
        date: NaiveDate,
        turn: ShiftTurn,
        cash_start: Money,
        notes: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Shift> {
        info!(cashier_id, %date, turn = %turn, "Opening shift");

        let result = sqlx::query(
            r#"
            INSERT INTO shifts (cashier_id, date, turn, state, cash_start, cash_expected, opened_at, notes)
            VALUES (?1, ?2, ?3, 'open', ?4, ?4, ?5, ?6)
            "#,
        )
        .bind(cashier_id)
        .bind(date)
        .bind(turn)
        .bind(cash_start)
        .bind(now)
        .bind(notes)
        .execute(&mut *self.conn)
        .await?;

        self.require(result.last_insert_rowid()).await
    }

    pub async fn get(&mut self, id: i64) -> DbResult<Option<Shift>> {
        let sql = format!("SELECT {SHIFT_COLUMNS} FROM shifts WHERE id = ?1");
        let shift = sqlx::query_as::<_, Shift>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(shift)
    }

    pub async fn require(&mut self, id: i64) -> DbResult<Shift> {
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Shift", id))
    }

    /// The cashier's open shift for `date`, if any.
    pub async fn find_open(&mut self, cashier_id: i64, date: NaiveDate) -> DbResult<Option<Shift>> {
        let sql = format!(
            "SELECT {SHIFT_COLUMNS} FROM shifts
             WHERE cashier_id = ?1 AND date = ?2 AND state = 'open'"
        );
        let shift = sqlx::query_as::<_, Shift>(&sql)
            .bind(cashier_id)
            .bind(date)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(shift)
    }

    /// Whether any shift is open on `date` (the work-day flag).
    pub async fn any_open_on(&mut self, date: NaiveDate) -> DbResult<bool> {
        let open = sqlx::query_scalar::<_, i64>(
            "SELECT EXISTS(SELECT 1 FROM shifts WHERE date = ?1 AND state = 'open')",
        )
        .bind(date)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(open == 1)
    }

    pub async fn count_open_on(&mut self, date: NaiveDate) -> DbResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM shifts WHERE date = ?1 AND state = 'open'",
        )
        .bind(date)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(count)
    }

    /// Writes the reconciliation and closes the shift. Returns `false` if the
    /// shift was not open.
    pub async fn close(&mut self, id: i64, close: &ShiftClose, now: DateTime<Utc>) -> DbResult<bool> {
        debug!(shift_id = id, diff = %close.diff, "Closing shift");

        let result = sqlx::query(
            r#"
            UPDATE shifts SET
                state = 'closed',
                cash_expected = ?2,
                cash_real = ?3,
                diff = ?4,
                total_cash = ?5,
                total_card = ?6,
                total_qr = ?7,
                total_mobile = ?8,
                total_sales = ?9,
                total_discounts = ?10,
                total_tips = ?11,
                order_count = ?12,
                closed_at = ?13
            WHERE id = ?1 AND state = 'open'
            "#,
        )
        .bind(id)
        .bind(close.cash_expected)
        .bind(close.cash_real)
        .bind(close.diff)
        .bind(close.totals.cash)
        .bind(close.totals.card)
        .bind(close.totals.qr)
        .bind(close.totals.mobile)
        .bind(close.total_sales)
        .bind(close.total_discounts)
        .bind(close.total_tips)
        .bind(close.order_count)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
