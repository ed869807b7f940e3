//! # Table Repository
//!
//! Physical tables, their status and grouping.
//!
//! ## Grouping
//! ```text
//! combine([2, 5])                       uncombine([2, 5])
//! ┌───────────┐ ┌───────────┐           ┌───────────┐ ┌───────────┐
//! │ 2  cap 4  │ │ 5  cap 2  │    ──►    │ 2  cap 4  │ │ 5  cap 2  │
//! │ with [2,5]│ │ with [2,5]│           │ with []   │ │ with []   │
//! │ comb. 6   │ │ comb. 6   │           │ comb. 0   │ │ comb. 0   │
//! └───────────┘ └───────────┘           └───────────┘ └───────────┘
//! ```
//!
//! `combined_with` is stored as a sorted JSON array.

use sqlx::sqlite::SqliteConnection;
use sqlx::FromRow;
use tracing::debug;

use crate::error::{DbError, DbResult};
use sgir_core::{Table, TableStatus};

const TABLE_COLUMNS: &str =
    "number, capacity, status, combined, combined_with, combined_capacity, map_x, map_y";

#[derive(Debug, FromRow)]
struct TableRow {
    number: i64,
    capacity: i64,
    status: TableStatus,
    combined: bool,
    combined_with: String,
    combined_capacity: i64,
    map_x: i64,
    map_y: i64,
}

impl TryFrom<TableRow> for Table {
    type Error = DbError;

    fn try_from(row: TableRow) -> Result<Self, Self::Error> {
        let combined_with: Vec<i64> = serde_json::from_str(&row.combined_with)
            .map_err(|e| DbError::corrupt("dining_tables.combined_with", e))?;
        Ok(Table {
            number: row.number,
            capacity: row.capacity,
            status: row.status,
            combined: row.combined,
            combined_with,
            combined_capacity: row.combined_capacity,
            map_x: row.map_x,
            map_y: row.map_y,
        })
    }
}

/// Repository for dining tables.
pub struct TableRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> TableRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        TableRepository { conn }
    }

    /// Inserts a table.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - the number is taken
    pub async fn insert(&mut self, number: i64, capacity: i64, map_x: i64, map_y: i64) -> DbResult<Table> {
        debug!(table = number, capacity, "Inserting table");

        sqlx::query(
            "INSERT INTO dining_tables (number, capacity, map_x, map_y) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(number)
        .bind(capacity)
        .bind(map_x)
        .bind(map_y)
        .execute(&mut *self.conn)
        .await?;

        self.require(number).await
    }

    pub async fn get(&mut self, number: i64) -> DbResult<Option<Table>> {
        let sql = format!("SELECT {TABLE_COLUMNS} FROM dining_tables WHERE number = ?1");
        let row = sqlx::query_as::<_, TableRow>(&sql)
            .bind(number)
            .fetch_optional(&mut *self.conn)
            .await?;
        row.map(Table::try_from).transpose()
    }

    pub async fn require(&mut self, number: i64) -> DbResult<Table> {
        self.get(number)
            .await?
            .ok_or_else(|| DbError::not_found("Table", number))
    }

    /// Every table ordered by number.
    pub async fn list(&mut self) -> DbResult<Vec<Table>> {
        let sql = format!("SELECT {TABLE_COLUMNS} FROM dining_tables ORDER BY number");
        let rows = sqlx::query_as::<_, TableRow>(&sql)
            .fetch_all(&mut *self.conn)
            .await?;
        rows.into_iter().map(Table::try_from).collect()
    }

    /// Members of the seating unit `table` belongs to (itself if uncombined).
    pub async fn group_of(&mut self, number: i64) -> DbResult<Vec<i64>> {
        let table = self.require(number).await?;
        if table.combined && !table.combined_with.is_empty() {
            Ok(table.combined_with)
        } else {
            Ok(vec![table.number])
        }
    }

    pub async fn set_status(&mut self, numbers: &[i64], status: TableStatus) -> DbResult<()> {
        for number in numbers {
            let result = sqlx::query("UPDATE dining_tables SET status = ?2 WHERE number = ?1")
                .bind(number)
                .bind(status)
                .execute(&mut *self.conn)
                .await?;
            if result.rows_affected() == 0 {
                return Err(DbError::not_found("Table", number));
            }
        }
        Ok(())
    }

    /// Marks every member as part of one group with the given status.
    pub async fn combine(&mut self, members: &[i64], capacity: i64, status: TableStatus) -> DbResult<()> {
        debug!(?members, capacity, "Combining tables");

        let json = serde_json::to_string(members)?;
        for number in members {
            let result = sqlx::query(
                "UPDATE dining_tables
                 SET combined = 1, combined_with = ?2, combined_capacity = ?3, status = ?4
                 WHERE number = ?1",
            )
            .bind(number)
            .bind(&json)
            .bind(capacity)
            .bind(status)
            .execute(&mut *self.conn)
            .await?;
            if result.rows_affected() == 0 {
                return Err(DbError::not_found("Table", number));
            }
        }
        Ok(())
    }

    /// Dissolves the group of each listed member. Status is left untouched.
    pub async fn uncombine(&mut self, members: &[i64]) -> DbResult<()> {
        for number in members {
            sqlx::query(
                "UPDATE dining_tables
                 SET combined = 0, combined_with = '[]', combined_capacity = 0
                 WHERE number = ?1",
            )
            .bind(number)
            .execute(&mut *self.conn)
            .await?;
        }
        Ok(())
    }

    pub async fn set_position(&mut self, number: i64, map_x: i64, map_y: i64) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE dining_tables SET map_x = ?2, map_y = ?3 WHERE number = ?1")
                .bind(number)
                .bind(map_x)
                .bind(map_y)
                .execute(&mut *self.conn)
                .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Table", number));
        }
        Ok(())
    }
}
