//! # HTTP Routes
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────────────────────────────┐
//! │ /health          │ liveness, no session                                 │
//! │ /auth            │ password, PIN, QR login, logout, QR issue            │
//! │ /principals      │ provisioning (admin)                                 │
//! │ /tables          │ floor: assign, combine, release, accounts            │
//! │ /accounts        │ table accounts                                       │
//! │ /reservations    │ hold, cancel, no-show sweep                          │
//! │ /orders          │ order lifecycle and lines                            │
//! │ /shifts          │ open, close, report                                  │
//! │ /payments        │ simple, split, items                                 │
//! │ /refunds         │ secondary-PIN refunds                                │
//! │ /products …      │ catalogue, recipes, productions, stock               │
//! │ /kanban /stats … │ read-model snapshots                                 │
//! │ /integrations    │ read-only façade behind X-API-KEY                    │
//! └──────────────────┴──────────────────────────────────────────────────────┘
//! ```
//! Layers, outermost first: trace, CORS, host check.

mod auth;
mod cash;
mod floor;
mod integrations;
mod inventory;
mod orders;
mod read;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::HOST;
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use sgir_core::ErrorKind;

use crate::error::ApiError;
use crate::AppState;

/// Builds the complete router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(auth::routes())
        .merge(floor::routes())
        .merge(orders::routes())
        .merge(cash::routes())
        .merge(inventory::routes())
        .merge(read::routes())
        .nest("/integrations", integrations::routes(state.clone()))
        .layer(middleware::from_fn_with_state(state.clone(), host_guard))
        .layer(cors_layer(&state.config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let database = state.db.health_check().await;
    Json(json!({
        "status": if database { "ok" } else { "degraded" },
        "database": database,
    }))
}

/// Rejects requests whose `Host` is not in the allowed list.
async fn host_guard(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !host.is_empty() && !state.config.host_allowed(host) {
        warn!(host, "Request for a host that is not allowed");
        return ApiError::new(ErrorKind::Validation, "invalid_host", "Host not allowed").into_response();
    }
    next.run(req).await
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}
