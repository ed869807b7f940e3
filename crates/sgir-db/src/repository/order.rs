//! # Order Repository
//!
//! Orders and their line items.
//!
//! ## Write Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Service (inside a WriteUnit)                                           │
//! │                                                                         │
//! │  1. insert(NewOrder)            → order row with zero totals            │
//! │  2. insert_item(..) per line    → unit_price snapshot from the product  │
//! │  3. Totals::from_items(..)      → computed in sgir-core                 │
//! │  4. update(&order)              → totals, state, payment fields         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Orders are never deleted. Items are deleted only while unpaid.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use sgir_core::{Money, Order, OrderItem};

const ORDER_COLUMNS: &str = "id, table_number, account_id, state, waiter_id, cashier_id, \
     guest_count, subtotal, discount, discount_pct, tip, total_final, paid_amount, \
     payment_method, payment_state, opened_at, paid_at, notes, notes_cashier, modified, \
     modified_by, reassigned";

const ITEM_COLUMNS: &str = "id, order_id, product_id, qty_total, qty_paid, unit_price, subtotal";

/// Header of an order about to be created.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub table_number: i64,
    pub account_id: i64,
    pub waiter_id: Option<i64>,
    pub guest_count: i64,
    pub notes: String,
    pub opened_at: DateTime<Utc>,
}

/// Repository for orders and order items.
pub struct OrderRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> OrderRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        OrderRepository { conn }
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Inserts an order in state `created` with zero totals.
    pub async fn insert(&mut self, new: &NewOrder) -> DbResult<Order> {
        debug!(table = new.table_number, account_id = new.account_id, "Inserting order");

        let result = sqlx::query(
            r#"
            INSERT INTO orders (
                table_number, account_id, state, waiter_id, guest_count,
                payment_state, opened_at, notes
            ) VALUES (?1, ?2, 'created', ?3, ?4, 'pending', ?5, ?6)
            "#,
        )
        .bind(new.table_number)
        .bind(new.account_id)
        .bind(new.waiter_id)
        .bind(new.guest_count)
        .bind(new.opened_at)
        .bind(&new.notes)
        .execute(&mut *self.conn)
        .await?;

        self.require(result.last_insert_rowid()).await
    }

    pub async fn get(&mut self, id: i64) -> DbResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1");
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(order)
    }

    pub async fn require(&mut self, id: i64) -> DbResult<Order> {
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", id))
    }

    /// Every order attached to an account, oldest first.
    pub async fn for_account(&mut self, account_id: i64) -> DbResult<Vec<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE account_id = ?1 ORDER BY id");
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(account_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(orders)
    }

    /// Writes every mutable column of an order.
    ///
    /// ## Returns
    /// * `Err(DbError::ConstraintViolation)` - `paid_amount > total_final`
    pub async fn update(&mut self, order: &Order) -> DbResult<()> {
        debug!(order_id = order.id, state = %order.state, "Updating order");

        let result = sqlx::query(
            r#"
            UPDATE orders SET
                table_number = ?2,
                account_id = ?3,
                state = ?4,
                cashier_id = ?5,
                guest_count = ?6,
                subtotal = ?7,
                discount = ?8,
                discount_pct = ?9,
                tip = ?10,
                total_final = ?11,
                paid_amount = ?12,
                payment_method = ?13,
                payment_state = ?14,
                paid_at = ?15,
                notes = ?16,
                notes_cashier = ?17,
                modified = ?18,
                modified_by = ?19,
                reassigned = ?20
            WHERE id = ?1
            "#,
        )
        .bind(order.id)
        .bind(order.table_number)
        .bind(order.account_id)
        .bind(order.state)
        .bind(order.cashier_id)
        .bind(order.guest_count)
        .bind(order.subtotal)
        .bind(order.discount)
        .bind(order.discount_pct)
        .bind(order.tip)
        .bind(order.total_final)
        .bind(order.paid_amount)
        .bind(order.payment_method)
        .bind(order.payment_state)
        .bind(order.paid_at)
        .bind(&order.notes)
        .bind(&order.notes_cashier)
        .bind(order.modified)
        .bind(order.modified_by)
        .bind(order.reassigned)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Order", order.id));
        }
        Ok(())
    }

    // =========================================================================
    // Items
    // =========================================================================

    pub async fn insert_item(
        &mut self,
        order_id: i64,
        product_id: i64,
        qty: i64,
        unit_price: Money,
    ) -> DbResult<OrderItem> {
        let result = sqlx::query(
            "INSERT INTO order_items (order_id, product_id, qty_total, qty_paid, unit_price, subtotal)
             VALUES (?1, ?2, ?3, 0, ?4, ?5)",
        )
        .bind(order_id)
        .bind(product_id)
        .bind(qty)
        .bind(unit_price)
        .bind(unit_price.multiply_quantity(qty))
        .execute(&mut *self.conn)
        .await?;

        self.require_item(result.last_insert_rowid()).await
    }

    pub async fn item(&mut self, item_id: i64) -> DbResult<Option<OrderItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM order_items WHERE id = ?1");
        let item = sqlx::query_as::<_, OrderItem>(&sql)
            .bind(item_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(item)
    }

    pub async fn require_item(&mut self, item_id: i64) -> DbResult<OrderItem> {
        self.item(item_id)
            .await?
            .ok_or_else(|| DbError::not_found("OrderItem", item_id))
    }

    /// Lines of an order in insertion order.
    pub async fn items(&mut self, order_id: i64) -> DbResult<Vec<OrderItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ?1 ORDER BY id");
        let items = sqlx::query_as::<_, OrderItem>(&sql)
            .bind(order_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(items)
    }

    /// Sets a line's total quantity (subtotal follows the snapshot price).
    pub async fn set_item_qty(&mut self, item: &OrderItem, qty_total: i64) -> DbResult<OrderItem> {
        sqlx::query("UPDATE order_items SET qty_total = ?2, subtotal = ?3 WHERE id = ?1")
            .bind(item.id)
            .bind(qty_total)
            .bind(item.unit_price.multiply_quantity(qty_total))
            .execute(&mut *self.conn)
            .await?;
        self.require_item(item.id).await
    }

    /// Marks `qty` more units of a line as paid. Conditional on the unpaid
    /// portion still covering `qty`; returns `false` otherwise.
    pub async fn mark_item_paid(&mut self, item_id: i64, qty: i64) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE order_items SET qty_paid = qty_paid + ?2
             WHERE id = ?1 AND qty_total - qty_paid >= ?2",
        )
        .bind(item_id)
        .bind(qty)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Marks every line of an order fully paid.
    pub async fn mark_all_paid(&mut self, order_id: i64) -> DbResult<()> {
        sqlx::query("UPDATE order_items SET qty_paid = qty_total WHERE order_id = ?1")
            .bind(order_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    /// Deletes an unpaid line.
    pub async fn delete_item(&mut self, item_id: i64) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM order_items WHERE id = ?1 AND qty_paid = 0")
            .bind(item_id)
            .execute(&mut *self.conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("OrderItem", item_id));
        }
        Ok(())
    }
}
