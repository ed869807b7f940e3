//! Floor routes: tables, table accounts and reservations.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use sgir_core::permissions::Requirement;
use sgir_core::table::Assignment;
use sgir_core::{Reservation, Table, TableAccount};

use crate::error::ApiResult;
use crate::gate::Caller;
use crate::services::reservations::{self, ReservationRequest, SweepResult};
use crate::services::tables::{self, AccountView, DebtRequest, NewTableRequest};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tables", get(list_tables).post(create_table))
        .route("/tables/assign", post(assign))
        .route("/tables/combine", post(combine))
        .route("/tables/{n}/uncombine", post(uncombine))
        .route("/tables/{n}/release", post(release))
        .route("/tables/{n}/account", post(open_account))
        .route("/accounts/{id}", get(get_account))
        .route("/accounts/{id}/recalculate", post(recalculate))
        .route("/accounts/{id}/debt", post(authorize_debt))
        .route("/reservations", get(list_reservations).post(create_reservation))
        .route("/reservations/sweep", post(sweep_reservations))
        .route("/reservations/{id}/cancel", post(cancel_reservation))
}

#[derive(Debug, Deserialize)]
struct AssignRequest {
    guest_count: i64,
}

#[derive(Debug, Deserialize)]
struct CombineRequest {
    tables: Vec<i64>,
}

// =============================================================================
// Tables
// =============================================================================

async fn list_tables(State(state): State<Arc<AppState>>, caller: Caller) -> ApiResult<Json<Vec<Table>>> {
    caller.require(&state, &Requirement::FLOOR_READ).await?;
    Ok(Json(tables::list_tables(&state).await?))
}

async fn create_table(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<NewTableRequest>,
) -> ApiResult<(StatusCode, Json<Table>)> {
    caller.require(&state, &Requirement::CATALOGUE_WRITE).await?;
    Ok((StatusCode::CREATED, Json(tables::create_table(&state, &req).await?)))
}

async fn assign(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<AssignRequest>,
) -> ApiResult<Json<Assignment>> {
    caller.require(&state, &Requirement::FLOOR_WRITE).await?;
    Ok(Json(tables::assign(&state, req.guest_count).await?))
}

async fn combine(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<CombineRequest>,
) -> ApiResult<Json<Vec<Table>>> {
    caller.require(&state, &Requirement::FLOOR_WRITE).await?;
    Ok(Json(tables::combine(&state, &req.tables).await?))
}

async fn uncombine(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(n): Path<i64>,
) -> ApiResult<Json<Vec<Table>>> {
    caller.require(&state, &Requirement::FLOOR_WRITE).await?;
    Ok(Json(tables::uncombine(&state, n).await?))
}

async fn release(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(n): Path<i64>,
) -> ApiResult<Json<Table>> {
    caller.require(&state, &Requirement::FLOOR_WRITE).await?;
    Ok(Json(tables::release(&state, n, caller.id()).await?))
}

// =============================================================================
// Accounts
// =============================================================================

async fn open_account(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(n): Path<i64>,
) -> ApiResult<Json<TableAccount>> {
    caller.require(&state, &Requirement::FLOOR_WRITE).await?;
    Ok(Json(tables::open_account(&state, n, caller.id()).await?))
}

async fn get_account(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
) -> ApiResult<Json<AccountView>> {
    caller.require(&state, &Requirement::FLOOR_READ).await?;
    Ok(Json(tables::get_account(&state, id).await?))
}

async fn recalculate(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
) -> ApiResult<Json<TableAccount>> {
    caller.require(&state, &Requirement::FLOOR_WRITE).await?;
    Ok(Json(tables::recalculate(&state, id, caller.id()).await?))
}

async fn authorize_debt(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(req): Json<DebtRequest>,
) -> ApiResult<Json<TableAccount>> {
    caller.require(&state, &Requirement::FLOOR_WRITE).await?;
    Ok(Json(tables::authorize_debt(&state, id, &req, caller.id()).await?))
}

// =============================================================================
// Reservations
// =============================================================================

async fn list_reservations(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> ApiResult<Json<Vec<Reservation>>> {
    caller.require(&state, &Requirement::FLOOR_READ).await?;
    Ok(Json(reservations::list(&state).await?))
}

async fn create_reservation(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<ReservationRequest>,
) -> ApiResult<(StatusCode, Json<Reservation>)> {
    caller.require(&state, &Requirement::FLOOR_WRITE).await?;
    let reservation = reservations::create(&state, &req, caller.id()).await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

async fn cancel_reservation(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
) -> ApiResult<Json<Reservation>> {
    caller.require(&state, &Requirement::FLOOR_WRITE).await?;
    Ok(Json(reservations::cancel(&state, id).await?))
}

async fn sweep_reservations(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> ApiResult<Json<SweepResult>> {
    caller.require(&state, &Requirement::FLOOR_WRITE).await?;
    Ok(Json(reservations::sweep(&state).await?))
}
