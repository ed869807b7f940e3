//! # History Repository
//!
//! Append-only audit entries. Triggers reject every `UPDATE` and `DELETE`
//! on `history_entries`, so this repository only appends and reads.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteConnection;
use sqlx::FromRow;

use crate::error::{DbError, DbResult};
use sgir_core::{HistoryEntry, HistoryKind};

const HISTORY_COLUMNS: &str =
    "id, order_id, production_id, actor_id, kind, before, after, reason, created_at";

#[derive(Debug, FromRow)]
struct HistoryRow {
    id: i64,
    order_id: Option<i64>,
    production_id: Option<i64>,
    actor_id: Option<i64>,
    kind: HistoryKind,
    before: String,
    after: String,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = DbError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        Ok(HistoryEntry {
            id: row.id,
            order_id: row.order_id,
            production_id: row.production_id,
            actor_id: row.actor_id,
            kind: row.kind,
            before: serde_json::from_str(&row.before)
                .map_err(|e| DbError::corrupt("history_entries.before", e))?,
            after: serde_json::from_str(&row.after)
                .map_err(|e| DbError::corrupt("history_entries.after", e))?,
            reason: row.reason,
            created_at: row.created_at,
        })
    }
}

/// An entry about to be appended.
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub order_id: Option<i64>,
    pub production_id: Option<i64>,
    pub actor_id: Option<i64>,
    pub kind: HistoryKind,
    pub before: Value,
    pub after: Value,
    pub reason: Option<String>,
}

impl NewHistoryEntry {
    pub fn for_order(order_id: i64, actor_id: i64, kind: HistoryKind, before: Value, after: Value) -> Self {
        NewHistoryEntry {
            order_id: Some(order_id),
            production_id: None,
            actor_id: Some(actor_id),
            kind,
            before,
            after,
            reason: None,
        }
    }

    pub fn for_production(production_id: i64, actor_id: i64, before: Value, after: Value) -> Self {
        NewHistoryEntry {
            order_id: None,
            production_id: Some(production_id),
            actor_id: Some(actor_id),
            kind: HistoryKind::ProductionState,
            before,
            after,
            reason: None,
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Repository for history entries.
pub struct HistoryRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> HistoryRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        HistoryRepository { conn }
    }

    pub async fn append(&mut self, entry: &NewHistoryEntry, now: DateTime<Utc>) -> DbResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO history_entries (
                order_id, production_id, actor_id, kind, before, after, reason, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(entry.order_id)
        .bind(entry.production_id)
        .bind(entry.actor_id)
        .bind(entry.kind)
        .bind(serde_json::to_string(&entry.before)?)
        .bind(serde_json::to_string(&entry.after)?)
        .bind(&entry.reason)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Entries of an order, oldest first.
    pub async fn for_order(&mut self, order_id: i64) -> DbResult<Vec<HistoryEntry>> {
        let sql = format!(
            "SELECT {HISTORY_COLUMNS} FROM history_entries WHERE order_id = ?1 ORDER BY id"
        );
        let rows = sqlx::query_as::<_, HistoryRow>(&sql)
            .bind(order_id)
            .fetch_all(&mut *self.conn)
            .await?;
        rows.into_iter().map(HistoryEntry::try_from).collect()
    }

    /// Entries of a production, oldest first.
    pub async fn for_production(&mut self, production_id: i64) -> DbResult<Vec<HistoryEntry>> {
        let sql = format!(
            "SELECT {HISTORY_COLUMNS} FROM history_entries WHERE production_id = ?1 ORDER BY id"
        );
        let rows = sqlx::query_as::<_, HistoryRow>(&sql)
            .bind(production_id)
            .fetch_all(&mut *self.conn)
            .await?;
        rows.into_iter().map(HistoryEntry::try_from).collect()
    }
}
