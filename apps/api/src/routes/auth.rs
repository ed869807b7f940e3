//! Identity routes: logins, logout, QR credentials and principals.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header::SET_COOKIE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use sgir_core::permissions::Requirement;
use sgir_core::{Principal, QrToken};

use crate::auth::{expired_session_cookie, session_cookie};
use crate::error::ApiResult;
use crate::gate::{Caller, SourceAddr};
use crate::services::identity::{
    self, LoginResponse, PasswordLogin, PinLogin, ProvisionRequest, QrIssueRequest,
};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/password", post(login_password))
        .route("/auth/pin", post(login_pin))
        .route("/auth/qr/issue", post(issue_qr))
        .route("/auth/qr/{token}", get(login_qr))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/principals", get(list_principals).post(provision))
        .route("/principals/{id}/active", post(set_active))
}

fn with_cookie(login: LoginResponse) -> Response {
    let cookie = session_cookie(&login.token);
    ([(SET_COOKIE, cookie)], Json(login)).into_response()
}

async fn login_password(
    State(state): State<Arc<AppState>>,
    SourceAddr(source): SourceAddr,
    Json(req): Json<PasswordLogin>,
) -> ApiResult<Response> {
    Ok(with_cookie(identity::login_password(&state, &req, &source).await?))
}

async fn login_pin(
    State(state): State<Arc<AppState>>,
    SourceAddr(source): SourceAddr,
    Json(req): Json<PinLogin>,
) -> ApiResult<Response> {
    Ok(with_cookie(identity::login_pin(&state, &req, &source).await?))
}

async fn login_qr(
    State(state): State<Arc<AppState>>,
    SourceAddr(source): SourceAddr,
    Path(token): Path<String>,
) -> ApiResult<Response> {
    Ok(with_cookie(identity::login_qr(&state, &token, &source).await?))
}

async fn logout(State(state): State<Arc<AppState>>, caller: Caller) -> Response {
    identity::logout(&state, &caller.session_id).await;
    (StatusCode::NO_CONTENT, [(SET_COOKIE, expired_session_cookie())]).into_response()
}

async fn me(caller: Caller) -> Json<Principal> {
    Json(caller.principal)
}

async fn issue_qr(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    SourceAddr(source): SourceAddr,
    Json(req): Json<QrIssueRequest>,
) -> ApiResult<(StatusCode, Json<QrToken>)> {
    caller.require(&state, &Requirement::ISSUE_CREDENTIALS).await?;
    let qr = identity::issue_qr(&state, &caller.principal, &req, &source).await?;
    Ok((StatusCode::CREATED, Json(qr)))
}

async fn list_principals(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> ApiResult<Json<Vec<Principal>>> {
    caller.require(&state, &Requirement::ADMIN).await?;
    Ok(Json(identity::list_principals(&state).await?))
}

async fn provision(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<ProvisionRequest>,
) -> ApiResult<(StatusCode, Json<Principal>)> {
    caller.require(&state, &Requirement::ADMIN).await?;
    let principal = identity::provision(&state, &req).await?;
    Ok((StatusCode::CREATED, Json(principal)))
}

#[derive(Debug, Deserialize)]
struct ActiveRequest {
    active: bool,
}

async fn set_active(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(req): Json<ActiveRequest>,
) -> ApiResult<Json<Principal>> {
    caller.require(&state, &Requirement::ADMIN).await?;
    Ok(Json(identity::set_active(&state, id, req.active).await?))
}
