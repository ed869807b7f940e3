//! Cash register routes: shifts, payments, refunds.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use sgir_core::permissions::Requirement;
use sgir_core::{Refund, Shift};

use crate::error::ApiResult;
use crate::gate::Caller;
use crate::services::cash::{
    self, CloseShiftRequest, ItemPaymentRequest, OpenShiftRequest, PaymentReceipt, RefundRequest,
    SimplePaymentRequest, SplitPaymentRequest,
};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shifts/open", post(open_shift))
        .route("/shifts/close", post(close_shift))
        .route("/shifts/{id}", get(get_shift))
        .route("/payments/simple", post(pay_simple))
        .route("/payments/split", post(pay_split))
        .route("/payments/items", post(pay_items))
        .route("/refunds", post(refund))
}

async fn open_shift(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<OpenShiftRequest>,
) -> ApiResult<(StatusCode, Json<Shift>)> {
    caller.require(&state, &Requirement::CASH_WRITE).await?;
    let shift = cash::open_shift(&state, &caller.principal, &req).await?;
    Ok((StatusCode::CREATED, Json(shift)))
}

async fn close_shift(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<CloseShiftRequest>,
) -> ApiResult<Json<Shift>> {
    caller.require(&state, &Requirement::CASH_WRITE).await?;
    Ok(Json(cash::close_shift(&state, &caller.principal, &req).await?))
}

async fn get_shift(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
) -> ApiResult<Json<Shift>> {
    caller.require(&state, &Requirement::CASH_READ).await?;
    Ok(Json(cash::get_shift(&state, id).await?))
}

async fn pay_simple(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<SimplePaymentRequest>,
) -> ApiResult<Json<PaymentReceipt>> {
    caller.require(&state, &Requirement::CASH_WRITE).await?;
    Ok(Json(cash::pay_simple(&state, &caller.principal, &req).await?))
}

async fn pay_split(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<SplitPaymentRequest>,
) -> ApiResult<Json<PaymentReceipt>> {
    caller.require(&state, &Requirement::CASH_WRITE).await?;
    Ok(Json(cash::pay_split(&state, &caller.principal, &req).await?))
}

async fn pay_items(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<ItemPaymentRequest>,
) -> ApiResult<Json<PaymentReceipt>> {
    caller.require(&state, &Requirement::CASH_WRITE).await?;
    Ok(Json(cash::pay_items(&state, &caller.principal, &req).await?))
}

async fn refund(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<RefundRequest>,
) -> ApiResult<(StatusCode, Json<Refund>)> {
    caller.require(&state, &Requirement::CASH_WRITE).await?;
    let refund = cash::refund(&state, &caller.principal, &req).await?;
    Ok((StatusCode::CREATED, Json(refund)))
}
