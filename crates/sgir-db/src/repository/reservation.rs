//! # Reservation Repository

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use sgir_core::{Reservation, ReservationState};

const RESERVATION_COLUMNS: &str = "id, table_number, customer_name, guest_count, reserved_for, \
     duration_minutes, state, created_by, created_at";

/// Repository for reservations.
pub struct ReservationRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ReservationRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        ReservationRepository { conn }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
        &mut self,
        table_number: i64,
        customer_name: &str,
        guest_count: i64,
        reserved_for: DateTime<Utc>,
        duration_minutes: i64,
        created_by: i64,
        now: DateTime<Utc>,
    ) -> DbResult<Reservation> {
        debug!(table = table_number, %reserved_for, "Inserting reservation");

        let result = sqlx::query(
            r#"
            INSERT INTO reservations (
                table_number, customer_name, guest_count, reserved_for,
                duration_minutes, state, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 'confirmed', ?6, ?7)
            "#,
        )
        .bind(table_number)
        .bind(customer_name)
        .bind(guest_count)
        .bind(reserved_for)
        .bind(duration_minutes)
        .bind(created_by)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        self.require(result.last_insert_rowid()).await
    }

    pub async fn get(&mut self, id: i64) -> DbResult<Option<Reservation>> {
        let sql = format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = ?1");
        let reservation = sqlx::query_as::<_, Reservation>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(reservation)
    }

    pub async fn require(&mut self, id: i64) -> DbResult<Reservation> {
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Reservation", id))
    }

    /// Confirmed reservations of a table, earliest first.
    pub async fn confirmed_for_table(&mut self, table_number: i64) -> DbResult<Vec<Reservation>> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations
             WHERE table_number = ?1 AND state = 'confirmed'
             ORDER BY reserved_for, id"
        );
        let reservations = sqlx::query_as::<_, Reservation>(&sql)
            .bind(table_number)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(reservations)
    }

    /// Every confirmed reservation, earliest first.
    pub async fn confirmed(&mut self) -> DbResult<Vec<Reservation>> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations
             WHERE state = 'confirmed' ORDER BY reserved_for, id"
        );
        let reservations = sqlx::query_as::<_, Reservation>(&sql)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(reservations)
    }

    /// Moves a confirmed reservation to `state`. Returns `false` if it was no
    /// longer confirmed.
    pub async fn finish(&mut self, id: i64, state: ReservationState) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE reservations SET state = ?2 WHERE id = ?1 AND state = 'confirmed'",
        )
        .bind(id)
        .bind(state)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
