//! # Integrations Façade
//!
//! Read-only projection of the dashboards for automation tools. No session:
//! every call carries the shared secret in `X-API-KEY`.
//!
//! ```text
//! X-API-KEY ──► HMAC(secret_key, provided) == HMAC(secret_key, configured)?
//!                  │                              (constant time)
//!                  ├─ no key configured ─► 403
//!                  ├─ mismatch ──────────► 403
//!                  └─ match ─────────────► handler
//! ```
//!
//! Both sides are MACed first so the comparison runs over equal-length
//! digests whatever the provided key's length.

use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::warn;

use sgir_core::dashboard::{AlertView, DayStats};
use sgir_core::ErrorKind;

use crate::error::{ApiError, ApiResult};
use crate::gate::{business_date, SourceAddr};
use crate::routes::read::DateQuery;
use crate::services::dashboard::{self, Snapshot};
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

pub const API_KEY_HEADER: &str = "x-api-key";

pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/inventory/low-stock", get(low_stock))
        .route("/cash/day-summary", get(day_summary))
        .layer(middleware::from_fn_with_state(state, webhook_guard))
}

/// Constant-time check of `provided` against `configured`.
pub fn key_matches(secret: &str, configured: &str, provided: &str) -> bool {
    let Ok(mut expected) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    expected.update(configured.as_bytes());
    let expected = expected.finalize().into_bytes();

    let Ok(mut candidate) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    candidate.update(provided.as_bytes());
    candidate.verify_slice(&expected).is_ok()
}

async fn webhook_guard(
    State(state): State<Arc<AppState>>,
    SourceAddr(source): SourceAddr,
    req: Request,
    next: Next,
) -> Response {
    let provided = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let allowed = match &state.config.webhook_api_key {
        Some(configured) => key_matches(&state.config.secret_key, configured, provided),
        None => false,
    };
    if !allowed {
        warn!(source = %source, "Integration call rejected");
        return ApiError::new(ErrorKind::Forbidden, "forbidden", "Forbidden").into_response();
    }
    next.run(req).await
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let database = state.db.health_check().await;
    Json(json!({
        "status": if database { "ok" } else { "degraded" },
        "database": database,
        "business_date": business_date(),
    }))
}

async fn low_stock(State(state): State<Arc<AppState>>) -> ApiResult<Json<Snapshot<Vec<AlertView>>>> {
    Ok(Json(dashboard::stock_alerts(&state, true).await?))
}

async fn day_summary(
    State(state): State<Arc<AppState>>,
    Query(q): Query<DateQuery>,
) -> ApiResult<Json<Snapshot<DayStats>>> {
    let date = q.date.unwrap_or_else(business_date);
    Ok(Json(dashboard::day_stats(&state, date).await?))
}
