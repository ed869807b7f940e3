//! # Database Migrations
//!
//! Embedded SQL migrations for SGIR.
//!
//! ## Migration Set
//! ```text
//! migrations/sqlite/
//! ├── 001_initial_schema.sql  # every entity, orders without accounts
//! └── 002_table_accounts.sql  # TableAccount aggregate + legacy backfill
//! ```
//!
//! ## Adding New Migrations
//!
//! 1. Create a new file in `migrations/sqlite/` with the next sequence number
//! 2. Name format: `NNN_description.sql`
//! 3. **NEVER** modify existing migrations - always add new ones

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Embedded migrations from the `migrations/sqlite` directory.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Runs all pending database migrations.
///
/// ## Safety
/// - Idempotent: safe to run multiple times
/// - Transactional: each migration runs in a transaction
/// - Ordered: migrations run in filename order (001, 002, ...)
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!("Checking for pending migrations");

    MIGRATOR.run(pool).await?;

    info!("All migrations applied successfully");
    Ok(())
}

/// Returns `(total_migrations, applied_migrations)` for diagnostics.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((total, applied as usize))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_all_migrations_applied() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (total, applied) = migration_status(db.pool()).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(applied, 2);
    }

    /// Applies 001, writes legacy orders, then applies 002 and checks the
    /// accounts it backfilled.
    #[tokio::test]
    async fn test_table_account_backfill() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::raw_sql(include_str!("../../../migrations/sqlite/001_initial_schema.sql"))
            .execute(&pool)
            .await
            .unwrap();

        sqlx::raw_sql(
            r#"
            INSERT INTO dining_tables (number, capacity) VALUES (1, 4), (2, 4);

            -- table 1, day one: fully paid
            INSERT INTO orders (table_number, state, subtotal, total_final, paid_amount, payment_state, opened_at, paid_at)
            VALUES (1, 'entregado', 1000, 1000, 1000, 'paid', '2024-01-01T12:00:00+00:00', '2024-01-01T13:00:00+00:00');

            -- table 1, day two: one unpaid, one cancelled
            INSERT INTO orders (table_number, state, subtotal, total_final, paid_amount, payment_state, opened_at)
            VALUES (1, 'pendiente', 2000, 2000, 0, 'pending', '2024-01-02T12:00:00+00:00');
            INSERT INTO orders (table_number, state, subtotal, total_final, paid_amount, payment_state, opened_at)
            VALUES (1, 'cancelado', 500, 500, 0, 'cancelled', '2024-01-02T12:30:00+00:00');

            -- table 2: unpaid on two days
            INSERT INTO orders (table_number, state, subtotal, total_final, paid_amount, payment_state, opened_at)
            VALUES (2, 'listo', 700, 700, 0, 'pending', '2024-01-01T20:00:00+00:00');
            INSERT INTO orders (table_number, state, subtotal, total_final, paid_amount, payment_state, opened_at)
            VALUES (2, 'en preparacion', 900, 900, 0, 'pending', '2024-01-03T20:00:00+00:00');
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        sqlx::raw_sql(include_str!("../../../migrations/sqlite/002_table_accounts.sql"))
            .execute(&pool)
            .await
            .unwrap();

        let accounts: Vec<(i64, String, i64, i64, i64)> = sqlx::query_as(
            "SELECT table_number, status, total_accumulated, total_paid, debt_authorized
             FROM table_accounts ORDER BY table_number, opened_at",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        assert_eq!(
            accounts,
            vec![
                (1, "closed".to_string(), 1000, 1000, 0),
                (1, "open".to_string(), 2000, 0, 0),
                (2, "in_debt".to_string(), 700, 0, 1),
                (2, "open".to_string(), 900, 0, 0),
            ]
        );

        let unattached: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE account_id IS NULL")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(unattached, 0);

        let states: Vec<String> = sqlx::query_scalar("SELECT state FROM orders ORDER BY id")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(
            states,
            vec!["delivered", "created", "cancelled", "ready", "in_preparation"]
        );
    }
}
