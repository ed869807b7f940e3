//! # Payment Repository
//!
//! Transactions, their split rows and refunds, plus the ledger queries a
//! shift close reconciles.
//!
//! ## Ledger Expansion
//! ```text
//! transactions (processed, cashier, window)
//!   method ≠ mixed ──────────────► (method, amount)
//!   method = mixed ──► splits ───► (split.method, split.amount) per split
//! ```

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use sgir_core::cash::SplitLine;
use sgir_core::{Money, PaymentMethod, PaymentSplit, Refund, Transaction};

const TRANSACTION_COLUMNS: &str =
    "id, order_id, cashier_id, amount, method, state, invoice_no, external_ref, created_at";

const REFUND_COLUMNS: &str =
    "id, order_id, amount, method, reason, created_by, authorized_by, created_at";

/// Repository for transactions, splits and refunds.
pub struct PaymentRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> PaymentRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        PaymentRepository { conn }
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Inserts a processed transaction.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - invoice number collision
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_transaction(
        &mut self,
        order_id: i64,
        cashier_id: i64,
        amount: Money,
        method: PaymentMethod,
        invoice_no: &str,
        external_ref: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<Transaction> {
        debug!(order_id, invoice_no, amount = %amount, method = %method, "Inserting transaction");

        let result = sqlx::query(
            r#"
            INSERT INTO transactions (
                order_id, cashier_id, amount, method, state, invoice_no, external_ref, created_at
            ) VALUES (?1, ?2, ?3, ?4, 'processed', ?5, ?6, ?7)
            "#,
        )
        .bind(order_id)
        .bind(cashier_id)
        .bind(amount)
        .bind(method)
        .bind(invoice_no)
        .bind(external_ref)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        self.require_transaction(result.last_insert_rowid()).await
    }

    pub async fn require_transaction(&mut self, id: i64) -> DbResult<Transaction> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1");
        sqlx::query_as::<_, Transaction>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| DbError::not_found("Transaction", id))
    }

    pub async fn insert_split(&mut self, transaction_id: i64, split: &SplitLine) -> DbResult<PaymentSplit> {
        let result = sqlx::query(
            "INSERT INTO payment_splits (transaction_id, method, amount, reference)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(transaction_id)
        .bind(split.method)
        .bind(split.amount)
        .bind(&split.reference)
        .execute(&mut *self.conn)
        .await?;

        Ok(PaymentSplit {
            id: result.last_insert_rowid(),
            transaction_id,
            method: split.method,
            amount: split.amount,
            reference: split.reference.clone(),
        })
    }

    pub async fn transactions_for_order(&mut self, order_id: i64) -> DbResult<Vec<Transaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE order_id = ?1 ORDER BY id"
        );
        let transactions = sqlx::query_as::<_, Transaction>(&sql)
            .bind(order_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(transactions)
    }

    pub async fn splits(&mut self, transaction_id: i64) -> DbResult<Vec<PaymentSplit>> {
        let splits = sqlx::query_as::<_, PaymentSplit>(
            "SELECT id, transaction_id, method, amount, reference
             FROM payment_splits WHERE transaction_id = ?1 ORDER BY id",
        )
        .bind(transaction_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(splits)
    }

    // =========================================================================
    // Ledger
    // =========================================================================

    /// `(method, amount)` of a cashier's processed payments in `[from, to]`,
    /// mixed transactions expanded into their splits.
    pub async fn ledger_payments(
        &mut self,
        cashier_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<(PaymentMethod, Money)>> {
        let rows = sqlx::query_as::<_, (PaymentMethod, Money)>(
            r#"
            SELECT t.method, t.amount FROM transactions t
            WHERE t.cashier_id = ?1 AND t.state = 'processed' AND t.method <> 'mixed'
              AND t.created_at >= ?2 AND t.created_at <= ?3
            UNION ALL
            SELECT s.method, s.amount FROM payment_splits s
            JOIN transactions t ON t.id = s.transaction_id
            WHERE t.cashier_id = ?1 AND t.state = 'processed' AND t.method = 'mixed'
              AND t.created_at >= ?2 AND t.created_at <= ?3
            "#,
        )
        .bind(cashier_id)
        .bind(from)
        .bind(to)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(rows)
    }

    /// `(discount, tip)` of each distinct order the cashier took money for
    /// in `[from, to]`.
    pub async fn ledger_orders(
        &mut self,
        cashier_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<(Money, Money)>> {
        let rows = sqlx::query_as::<_, (Money, Money)>(
            r#"
            SELECT o.discount, o.tip FROM orders o
            WHERE o.id IN (
                SELECT t.order_id FROM transactions t
                WHERE t.cashier_id = ?1 AND t.state = 'processed'
                  AND t.created_at >= ?2 AND t.created_at <= ?3
            )
            ORDER BY o.id
            "#,
        )
        .bind(cashier_id)
        .bind(from)
        .bind(to)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(rows)
    }

    /// `(method, amount)` of refunds the cashier issued in `[from, to]`.
    pub async fn ledger_refunds(
        &mut self,
        cashier_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<(PaymentMethod, Money)>> {
        let rows = sqlx::query_as::<_, (PaymentMethod, Money)>(
            "SELECT method, amount FROM refunds
             WHERE created_by = ?1 AND created_at >= ?2 AND created_at <= ?3
             ORDER BY id",
        )
        .bind(cashier_id)
        .bind(from)
        .bind(to)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(rows)
    }

    // =========================================================================
    // Refunds
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_refund(
        &mut self,
        order_id: i64,
        amount: Money,
        method: PaymentMethod,
        reason: &str,
        created_by: i64,
        authorized_by: i64,
        now: DateTime<Utc>,
    ) -> DbResult<Refund> {
        debug!(order_id, amount = %amount, method = %method, "Inserting refund");

        let result = sqlx::query(
            r#"
            INSERT INTO refunds (order_id, amount, method, reason, created_by, authorized_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(order_id)
        .bind(amount)
        .bind(method)
        .bind(reason)
        .bind(created_by)
        .bind(authorized_by)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        let sql = format!("SELECT {REFUND_COLUMNS} FROM refunds WHERE id = ?1");
        let refund = sqlx::query_as::<_, Refund>(&sql)
            .bind(result.last_insert_rowid())
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(refund)
    }

    /// Total already refunded on an order.
    pub async fn refunded_total(&mut self, order_id: i64) -> DbResult<Money> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(amount), 0) FROM refunds WHERE order_id = ?1",
        )
        .bind(order_id)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(Money::from_cents(total))
    }
}
