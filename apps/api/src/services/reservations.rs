//! Reservations: hold a table, cancel, and the no-show sweep.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use sgir_core::table::check_capacity;
use sgir_core::validation::{validate_guest_count, validate_name};
use sgir_core::{CoreError, Reservation, ReservationState, TableStatus, ValidationError};
use sgir_db::{Repositories, WriteUnit};

use crate::error::ApiResult;
use crate::services::tables::find_seating_account;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ReservationRequest {
    pub table_number: i64,
    pub customer_name: String,
    pub guest_count: i64,
    pub reserved_for: DateTime<Utc>,
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SweepResult {
    pub no_shows: Vec<i64>,
    pub tables_freed: Vec<i64>,
}

/// Holds an available table for a party.
#[instrument(skip(state, req), fields(table = req.table_number, guests = req.guest_count))]
pub async fn create(state: &AppState, req: &ReservationRequest, actor: i64) -> ApiResult<Reservation> {
    validate_name("customer_name", &req.customer_name)?;
    validate_guest_count(req.guest_count)?;
    let max = state.config.reservation_max_minutes;
    let duration = req.duration_minutes.unwrap_or(max);
    if !(1..=max).contains(&duration) {
        return Err(ValidationError::OutOfRange {
            field: "duration_minutes".to_string(),
            min: 1,
            max,
        }
        .into());
    }

    let now = Utc::now();
    let mut unit = state.db.write().await?;
    let table = unit.tables().require(req.table_number).await?;
    if table.status != TableStatus::Available {
        return Err(CoreError::TableNotAvailable {
            number: table.number,
            status: table.status.to_string(),
        }
        .into());
    }
    check_capacity(&table, req.guest_count)?;

    let reservation = unit
        .reservations()
        .insert(
            table.number,
            req.customer_name.trim(),
            req.guest_count,
            req.reserved_for,
            duration,
            actor,
            now,
        )
        .await?;
    let group = unit.tables().group_of(table.number).await?;
    unit.tables().set_status(&group, TableStatus::Reserved).await?;
    unit.commit().await?;

    info!(reservation_id = reservation.id, table = table.number, reserved_for = %reservation.reserved_for, "Reservation created");
    Ok(reservation)
}

pub async fn list(state: &AppState) -> ApiResult<Vec<Reservation>> {
    let mut unit = state.db.read().await?;
    Ok(unit.reservations().confirmed().await?)
}

#[instrument(skip(state))]
pub async fn cancel(state: &AppState, reservation_id: i64) -> ApiResult<Reservation> {
    let mut unit = state.db.write().await?;
    let reservation = unit.reservations().require(reservation_id).await?;
    if !unit
        .reservations()
        .finish(reservation_id, ReservationState::Cancelled)
        .await?
    {
        return Err(CoreError::InvalidTransition {
            entity: "reservation",
            from: reservation.state.to_string(),
            to: ReservationState::Cancelled.to_string(),
        }
        .into());
    }
    free_if_unheld(&mut unit, reservation.table_number).await?;
    let cancelled = unit.reservations().require(reservation_id).await?;
    unit.commit().await?;

    info!(reservation_id, table = reservation.table_number, "Reservation cancelled");
    Ok(cancelled)
}

/// Marks confirmed reservations past `reserved_for + grace` as no-shows and
/// frees their tables when nothing else holds them.
#[instrument(skip(state))]
pub async fn sweep(state: &AppState) -> ApiResult<SweepResult> {
    let now = Utc::now();
    let grace = Duration::minutes(state.config.reservation_noshow_grace_minutes);

    let mut unit = state.db.write().await?;
    let mut result = SweepResult {
        no_shows: Vec::new(),
        tables_freed: Vec::new(),
    };
    for reservation in unit.reservations().confirmed().await? {
        if reservation.reserved_for + grace > now {
            continue;
        }
        if unit
            .reservations()
            .finish(reservation.id, ReservationState::NoShow)
            .await?
        {
            result.no_shows.push(reservation.id);
            if free_if_unheld(&mut unit, reservation.table_number).await? {
                result.tables_freed.push(reservation.table_number);
            }
        }
    }
    unit.commit().await?;

    if !result.no_shows.is_empty() {
        info!(no_shows = result.no_shows.len(), freed = ?result.tables_freed, "No-show sweep");
    }
    Ok(result)
}

/// Returns a reserved table to `available` unless another confirmed
/// reservation or an open account still holds it.
async fn free_if_unheld(unit: &mut WriteUnit, number: i64) -> ApiResult<bool> {
    let table = unit.tables().require(number).await?;
    if table.status != TableStatus::Reserved
        || !unit.reservations().confirmed_for_table(number).await?.is_empty()
        || find_seating_account(unit, number).await?.is_some()
    {
        return Ok(false);
    }
    let group = unit.tables().group_of(number).await?;
    unit.tables().set_status(&group, TableStatus::Available).await?;
    Ok(true)
}
