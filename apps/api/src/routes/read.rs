//! Read-model routes. Every body is a versioned [`Snapshot`] so pollers can
//! skip unchanged payloads.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;

use sgir_core::dashboard::{AlertView, DayStats, KanbanBoard, PendingPayment, TableMapEntry};
use sgir_core::permissions::Requirement;

use crate::error::ApiResult;
use crate::gate::{business_date, Caller};
use crate::services::dashboard::{self, Snapshot};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tables/map", get(table_map))
        .route("/orders/pending-payment", get(pending_payments))
        .route("/kanban", get(kanban))
        .route("/stats/day", get(day_stats))
        .route("/stock/alerts", get(stock_alerts))
}

#[derive(Debug, Deserialize)]
pub(crate) struct DateQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct AlertQuery {
    #[serde(default = "default_true")]
    active_only: bool,
}

fn default_true() -> bool {
    true
}

async fn table_map(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> ApiResult<Json<Snapshot<Vec<TableMapEntry>>>> {
    caller.require(&state, &Requirement::FLOOR_READ).await?;
    Ok(Json(dashboard::table_map(&state).await?))
}

async fn pending_payments(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> ApiResult<Json<Snapshot<Vec<PendingPayment>>>> {
    caller.require(&state, &Requirement::CASH_READ).await?;
    Ok(Json(dashboard::pending_payments(&state).await?))
}

async fn kanban(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> ApiResult<Json<Snapshot<KanbanBoard>>> {
    caller.require(&state, &Requirement::KITCHEN_READ).await?;
    Ok(Json(dashboard::kanban(&state).await?))
}

async fn day_stats(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(q): Query<DateQuery>,
) -> ApiResult<Json<Snapshot<DayStats>>> {
    caller.require(&state, &Requirement::REPORTS).await?;
    let date = q.date.unwrap_or_else(business_date);
    Ok(Json(dashboard::day_stats(&state, date).await?))
}

async fn stock_alerts(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(q): Query<AlertQuery>,
) -> ApiResult<Json<Snapshot<Vec<AlertView>>>> {
    caller.require(&state, &Requirement::KITCHEN_READ).await?;
    Ok(Json(dashboard::stock_alerts(&state, q.active_only).await?))
}
