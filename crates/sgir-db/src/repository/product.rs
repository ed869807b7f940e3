//! # Product Repository
//!
//! Sellable products and their integer stock.
//!
//! ## Conditional Stock Updates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    Stock Update Strategy                            │
//! │                                                                     │
//! │  ❌ WRONG: read, check in Rust, write absolute value                │
//! │     UPDATE products SET stock_on_hand = 3 WHERE id = ?              │
//! │                                                                     │
//! │  ✅ CORRECT: precondition inside the WHERE clause                   │
//! │     UPDATE products SET stock_on_hand = stock_on_hand - ?2          │
//! │     WHERE id = ?1 AND stock_on_hand >= ?2                           │
//! │     RETURNING stock_on_hand                                         │
//! │                                                                     │
//! │  No row back ⇒ the racer lost; the caller aborts the whole unit.    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::sqlite::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use sgir_core::{Money, Product};

const PRODUCT_COLUMNS: &str = "id, name, category, price, available, active, tracks_inventory, \
     stock_on_hand, stock_min, is_manufactured, image";

/// Fields of a product about to be created.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub category: Option<String>,
    pub price: Money,
    pub tracks_inventory: bool,
    pub stock_on_hand: i64,
    pub stock_min: i64,
    pub is_manufactured: bool,
    pub image: Option<String>,
}

/// Repository for product database operations.
pub struct ProductRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ProductRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        ProductRepository { conn }
    }

    pub async fn insert(&mut self, new: &NewProduct) -> DbResult<Product> {
        debug!(name = %new.name, "Inserting product");

        let result = sqlx::query(
            r#"
            INSERT INTO products (
                name, category, price, available, active, tracks_inventory,
                stock_on_hand, stock_min, is_manufactured, image
            ) VALUES (?1, ?2, ?3, 1, 1, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&new.name)
        .bind(&new.category)
        .bind(new.price)
        .bind(new.tracks_inventory)
        .bind(new.stock_on_hand)
        .bind(new.stock_min)
        .bind(new.is_manufactured)
        .bind(&new.image)
        .execute(&mut *self.conn)
        .await?;

        self.require(result.last_insert_rowid()).await
    }

    pub async fn get(&mut self, id: i64) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(product)
    }

    pub async fn require(&mut self, id: i64) -> DbResult<Product> {
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Loads products in ascending id order (the canonical lock order).
    pub async fn require_many(&mut self, ids: &[i64]) -> DbResult<Vec<Product>> {
        let mut sorted = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut products = Vec::with_capacity(sorted.len());
        for id in sorted {
            products.push(self.require(id).await?);
        }
        Ok(products)
    }

    /// Lists products sorted by name.
    pub async fn list(&mut self, active_only: bool) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products
             WHERE (?1 = 0 OR active = 1)
             ORDER BY name, id"
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(active_only)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(products)
    }

    /// Takes `qty` units out of stock if at least `qty` are on hand.
    ///
    /// ## Returns
    /// * `Ok(Some(stock_after))` - decremented
    /// * `Ok(None)` - not enough stock at write time (race lost)
    pub async fn decrement_stock(&mut self, id: i64, qty: i64) -> DbResult<Option<i64>> {
        debug!(product_id = id, qty, "Decrementing product stock");

        let stock_after = sqlx::query_scalar::<_, i64>(
            "UPDATE products SET stock_on_hand = stock_on_hand - ?2
             WHERE id = ?1 AND stock_on_hand >= ?2
             RETURNING stock_on_hand",
        )
        .bind(id)
        .bind(qty)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(stock_after)
    }

    /// Puts `qty` units back into stock. Returns the new level.
    pub async fn increment_stock(&mut self, id: i64, qty: i64) -> DbResult<i64> {
        debug!(product_id = id, qty, "Incrementing product stock");

        let stock_after = sqlx::query_scalar::<_, i64>(
            "UPDATE products SET stock_on_hand = stock_on_hand + ?2
             WHERE id = ?1
             RETURNING stock_on_hand",
        )
        .bind(id)
        .bind(qty)
        .fetch_optional(&mut *self.conn)
        .await?;
        stock_after.ok_or_else(|| DbError::not_found("Product", id))
    }

    pub async fn set_flags(&mut self, id: i64, available: bool, active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE products SET available = ?2, active = ?3 WHERE id = ?1")
            .bind(id)
            .bind(available)
            .bind(active)
            .execute(&mut *self.conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        Ok(())
    }
}
