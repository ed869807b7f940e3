//! Order routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};

use sgir_core::permissions::Requirement;
use sgir_core::{HistoryEntry, Order, OrderDetail};

use crate::error::ApiResult;
use crate::gate::Caller;
use crate::services::orders::{
    self, CancelRequest, CreateOrderRequest, DiscountRequest, LineRequest, QtyRequest,
    ReassignRequest, StateRequest, TipRequest,
};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/history", get(history))
        .route("/orders/{id}/items", post(add_item))
        .route("/orders/{id}/items/{item_id}", patch(modify_qty).delete(remove_item))
        .route("/orders/{id}/discount", post(apply_discount))
        .route("/orders/{id}/tip", post(apply_tip))
        .route("/orders/{id}/reassign", post(reassign))
        .route("/orders/{id}/cancel", post(cancel))
        .route("/orders/{id}/state", post(step_state))
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<OrderDetail>)> {
    caller.require(&state, &Requirement::ORDER_WRITE).await?;
    let order = orders::create_order(&state, &caller.principal, &req).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
) -> ApiResult<Json<OrderDetail>> {
    caller.require(&state, &Requirement::READ_ANY).await?;
    Ok(Json(orders::get_order(&state, id).await?))
}

async fn history(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<HistoryEntry>>> {
    caller.require(&state, &Requirement::FLOOR_READ).await?;
    Ok(Json(orders::history(&state, id).await?))
}

async fn add_item(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(req): Json<LineRequest>,
) -> ApiResult<Json<OrderDetail>> {
    caller.require(&state, &Requirement::ORDER_WRITE).await?;
    Ok(Json(orders::add_item(&state, id, &req, caller.id()).await?))
}

async fn modify_qty(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path((id, item_id)): Path<(i64, i64)>,
    Json(req): Json<QtyRequest>,
) -> ApiResult<Json<OrderDetail>> {
    caller.require(&state, &Requirement::ORDER_WRITE).await?;
    Ok(Json(orders::modify_qty(&state, id, item_id, req.qty, caller.id()).await?))
}

async fn remove_item(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path((id, item_id)): Path<(i64, i64)>,
) -> ApiResult<Json<OrderDetail>> {
    caller.require(&state, &Requirement::ORDER_WRITE).await?;
    Ok(Json(orders::remove_item(&state, id, item_id, caller.id()).await?))
}

async fn apply_discount(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(req): Json<DiscountRequest>,
) -> ApiResult<Json<Order>> {
    caller.require(&state, &Requirement::FLOOR_WRITE).await?;
    Ok(Json(orders::apply_discount(&state, id, &req, caller.id()).await?))
}

async fn apply_tip(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(req): Json<TipRequest>,
) -> ApiResult<Json<Order>> {
    caller.require(&state, &Requirement::FLOOR_WRITE).await?;
    Ok(Json(orders::apply_tip(&state, id, &req, caller.id()).await?))
}

async fn reassign(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(req): Json<ReassignRequest>,
) -> ApiResult<Json<Order>> {
    caller.require(&state, &Requirement::FLOOR_WRITE).await?;
    Ok(Json(orders::reassign(&state, id, &req, caller.id()).await?))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(req): Json<CancelRequest>,
) -> ApiResult<Json<Order>> {
    caller.require(&state, &Requirement::FLOOR_WRITE).await?;
    Ok(Json(orders::cancel(&state, id, &req, caller.id()).await?))
}

async fn step_state(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(req): Json<StateRequest>,
) -> ApiResult<Json<Order>> {
    caller.require(&state, &Requirement::ORDER_STEP).await?;
    Ok(Json(orders::step_state(&state, id, req.state, caller.id()).await?))
}
