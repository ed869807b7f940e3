//! # Table Account Repository
//!
//! The financial aggregate of one seating. A partial unique index keeps at
//! most one `open` account per table; a second `open()` for the same table
//! fails with `DbError::UniqueViolation`.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use sgir_core::table::AccountRecalc;
use sgir_core::{AccountStatus, TableAccount};

const ACCOUNT_COLUMNS: &str = "id, table_number, status, total_accumulated, total_paid, \
     opened_at, closed_at, opened_by, closed_by, debt_authorized, notes";

/// Repository for table accounts.
pub struct AccountRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> AccountRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        AccountRepository { conn }
    }

    /// Opens a new account on `table`.
    pub async fn open(
        &mut self,
        table_number: i64,
        opened_by: Option<i64>,
        now: DateTime<Utc>,
    ) -> DbResult<TableAccount> {
        debug!(table = table_number, "Opening table account");

        let result = sqlx::query(
            "INSERT INTO table_accounts (table_number, status, opened_at, opened_by)
             VALUES (?1, 'open', ?2, ?3)",
        )
        .bind(table_number)
        .bind(now)
        .bind(opened_by)
        .execute(&mut *self.conn)
        .await?;

        self.require(result.last_insert_rowid()).await
    }

    pub async fn get(&mut self, id: i64) -> DbResult<Option<TableAccount>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM table_accounts WHERE id = ?1");
        let account = sqlx::query_as::<_, TableAccount>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(account)
    }

    pub async fn require(&mut self, id: i64) -> DbResult<TableAccount> {
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("TableAccount", id))
    }

    /// The table's `open` account, if any.
    pub async fn find_open(&mut self, table_number: i64) -> DbResult<Option<TableAccount>> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM table_accounts
             WHERE table_number = ?1 AND status = 'open'"
        );
        let account = sqlx::query_as::<_, TableAccount>(&sql)
            .bind(table_number)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(account)
    }

    /// Accounts of a table, newest first.
    pub async fn for_table(&mut self, table_number: i64) -> DbResult<Vec<TableAccount>> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM table_accounts
             WHERE table_number = ?1 ORDER BY opened_at DESC, id DESC"
        );
        let accounts = sqlx::query_as::<_, TableAccount>(&sql)
            .bind(table_number)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(accounts)
    }

    /// Writes a recalculation. Stamps `closed_at`/`closed_by` the first time
    /// the account reaches `closed`.
    pub async fn apply_recalc(
        &mut self,
        id: i64,
        recalc: &AccountRecalc,
        actor: Option<i64>,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let closing = recalc.status == AccountStatus::Closed;

        let result = sqlx::query(
            r#"
            UPDATE table_accounts SET
                total_accumulated = ?2,
                total_paid = ?3,
                status = ?4,
                closed_at = CASE WHEN ?5 AND closed_at IS NULL THEN ?6 ELSE closed_at END,
                closed_by = CASE WHEN ?5 AND closed_at IS NULL THEN ?7 ELSE closed_by END
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(recalc.total_accumulated)
        .bind(recalc.total_paid)
        .bind(recalc.status)
        .bind(closing)
        .bind(now)
        .bind(actor)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("TableAccount", id));
        }
        Ok(())
    }

    /// Records that an authoriser accepted the account's debt.
    pub async fn authorize_debt(&mut self, id: i64, note: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE table_accounts
             SET debt_authorized = 1,
                 notes = CASE WHEN notes = '' THEN ?2 ELSE notes || char(10) || ?2 END
             WHERE id = ?1",
        )
        .bind(id)
        .bind(note)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("TableAccount", id));
        }
        Ok(())
    }
}
