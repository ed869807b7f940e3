//! Catalogue, recipe, production and stock routes.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;

use sgir_core::permissions::Requirement;
use sgir_core::{ErrorKind, Product, Production, RecipeDetail, Supply};

use crate::error::{ApiError, ApiResult};
use crate::gate::Caller;
use crate::services::inventory::{
    self, AdjustRequest, AdjustResult, NewProductRequest, NewSupplyRequest, ProductFlagsRequest,
    ProductionView, RecipeRequest, RegisterProductionRequest, VoidRequest,
};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/{id}/flags", post(set_product_flags))
        .route("/supplies", get(list_supplies).post(create_supply))
        .route("/stock/adjust", post(adjust_stock))
        .route("/stock/alerts/{id}/resolve", post(resolve_alert))
        .route("/recipes", post(create_recipe))
        .route("/recipes/{product}", put(update_recipe))
        .route("/productions", post(register_production))
        .route("/productions/{id}", get(get_production))
        .route("/productions/{id}/apply", post(apply_production))
        .route("/productions/{id}/void", post(void_production))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    all: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ResolveRequest {
    #[serde(default)]
    note: String,
}

// =============================================================================
// Catalogue
// =============================================================================

async fn list_products(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<Vec<Product>>> {
    caller.require(&state, &Requirement::READ_ANY).await?;
    Ok(Json(inventory::list_products(&state, !q.all).await?))
}

async fn create_product(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<NewProductRequest>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    caller.require(&state, &Requirement::CATALOGUE_WRITE).await?;
    Ok((StatusCode::CREATED, Json(inventory::create_product(&state, &req).await?)))
}

async fn set_product_flags(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(req): Json<ProductFlagsRequest>,
) -> ApiResult<Json<Product>> {
    caller.require(&state, &Requirement::CATALOGUE_WRITE).await?;
    Ok(Json(inventory::set_product_flags(&state, id, &req).await?))
}

async fn list_supplies(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<Vec<Supply>>> {
    caller.require(&state, &Requirement::KITCHEN_READ).await?;
    Ok(Json(inventory::list_supplies(&state, !q.all).await?))
}

async fn create_supply(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<NewSupplyRequest>,
) -> ApiResult<(StatusCode, Json<Supply>)> {
    caller.require(&state, &Requirement::CATALOGUE_WRITE).await?;
    Ok((StatusCode::CREATED, Json(inventory::create_supply(&state, &req).await?)))
}

// =============================================================================
// Stock
// =============================================================================

async fn adjust_stock(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<AdjustRequest>,
) -> ApiResult<Json<AdjustResult>> {
    caller.require(&state, &Requirement::CATALOGUE_WRITE).await?;
    Ok(Json(inventory::adjust_stock(&state, &req, caller.id()).await?))
}

async fn resolve_alert(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    caller.require(&state, &Requirement::KITCHEN_WRITE).await?;
    // The note is optional; an empty body resolves without one
    let req: ResolveRequest = if body.is_empty() {
        ResolveRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::new(ErrorKind::Validation, "validation", e.to_string()))?
    };
    inventory::resolve_alert(&state, id, caller.id(), &req.note).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Recipes / Productions
// =============================================================================

async fn create_recipe(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<RecipeRequest>,
) -> ApiResult<(StatusCode, Json<RecipeDetail>)> {
    caller.require(&state, &Requirement::KITCHEN_WRITE).await?;
    Ok((StatusCode::CREATED, Json(inventory::create_recipe(&state, &req).await?)))
}

async fn update_recipe(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(product): Path<i64>,
    Json(req): Json<RecipeRequest>,
) -> ApiResult<Json<RecipeDetail>> {
    caller.require(&state, &Requirement::KITCHEN_WRITE).await?;
    Ok(Json(inventory::update_recipe(&state, product, &req).await?))
}

async fn register_production(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<RegisterProductionRequest>,
) -> ApiResult<(StatusCode, Json<Production>)> {
    caller.require(&state, &Requirement::KITCHEN_WRITE).await?;
    let production = inventory::register_production(&state, &caller.principal, &req).await?;
    Ok((StatusCode::CREATED, Json(production)))
}

async fn get_production(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
) -> ApiResult<Json<ProductionView>> {
    caller.require(&state, &Requirement::KITCHEN_READ).await?;
    Ok(Json(inventory::get_production(&state, id).await?))
}

async fn apply_production(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
) -> ApiResult<Json<Production>> {
    caller.require(&state, &Requirement::KITCHEN_WRITE).await?;
    Ok(Json(inventory::apply_production(&state, id, caller.id()).await?))
}

async fn void_production(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(req): Json<VoidRequest>,
) -> ApiResult<Json<Production>> {
    caller.require(&state, &Requirement::KITCHEN_WRITE).await?;
    Ok(Json(inventory::void_production(&state, id, &req, caller.id()).await?))
}
