//! # Recipe Repository
//!
//! Recipes are versioned by row: an update deactivates the current recipe
//! and inserts the next version with its own items, so productions keep
//! pointing at the exact recipe they were registered against.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use sgir_core::validation::RecipeLine;
use sgir_core::{Recipe, RecipeDetail, RecipeItem};

const RECIPE_COLUMNS: &str = "id, product_id, version, active, created_at";

/// Repository for recipes and recipe items.
pub struct RecipeRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> RecipeRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        RecipeRepository { conn }
    }

    /// Inserts an active recipe at `version` together with its lines.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - the product already has an active
    ///   recipe, or a supply is repeated
    pub async fn insert(
        &mut self,
        product_id: i64,
        version: i64,
        lines: &[RecipeLine],
        now: DateTime<Utc>,
    ) -> DbResult<RecipeDetail> {
        debug!(product_id, version, lines = lines.len(), "Inserting recipe");

        let result = sqlx::query(
            "INSERT INTO recipes (product_id, version, active, created_at) VALUES (?1, ?2, 1, ?3)",
        )
        .bind(product_id)
        .bind(version)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;
        let recipe_id = result.last_insert_rowid();

        for (supply_id, qty_per_unit, loss_pct) in lines {
            sqlx::query(
                "INSERT INTO recipe_items (recipe_id, supply_id, qty_per_unit, loss_pct)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(recipe_id)
            .bind(supply_id)
            .bind(qty_per_unit)
            .bind(loss_pct)
            .execute(&mut *self.conn)
            .await?;
        }

        self.require_detail(recipe_id).await
    }

    pub async fn get(&mut self, id: i64) -> DbResult<Option<Recipe>> {
        let sql = format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1");
        let recipe = sqlx::query_as::<_, Recipe>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(recipe)
    }

    pub async fn require_detail(&mut self, id: i64) -> DbResult<RecipeDetail> {
        let recipe = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Recipe", id))?;
        let items = self.items(id).await?;
        Ok(RecipeDetail { recipe, items })
    }

    /// The product's active recipe, if any.
    pub async fn active_for_product(&mut self, product_id: i64) -> DbResult<Option<Recipe>> {
        let sql = format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE product_id = ?1 AND active = 1"
        );
        let recipe = sqlx::query_as::<_, Recipe>(&sql)
            .bind(product_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(recipe)
    }

    pub async fn items(&mut self, recipe_id: i64) -> DbResult<Vec<RecipeItem>> {
        let items = sqlx::query_as::<_, RecipeItem>(
            "SELECT id, recipe_id, supply_id, qty_per_unit, loss_pct
             FROM recipe_items WHERE recipe_id = ?1 ORDER BY supply_id",
        )
        .bind(recipe_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(items)
    }

    pub async fn deactivate(&mut self, recipe_id: i64) -> DbResult<()> {
        sqlx::query("UPDATE recipes SET active = 0 WHERE id = ?1")
            .bind(recipe_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }
}
