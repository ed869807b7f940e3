//! # Inventory Service
//!
//! Catalogue, manual stock adjustments, recipes, the two-phase production
//! workflow and stock alerts.
//!
//! ## Production
//! ```text
//! register ──► registered        no stock moves
//!                  │
//!                apply           supplies −required (snapshot each)
//!                  │             product  +qty_produced
//!                  ▼
//!               applied
//!                  │
//!          void (secondary PIN)  supplies +qty_consumed (from snapshots)
//!                  │             product  −qty_produced (refused if sold)
//!                  ▼
//!               voided
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};

use sgir_core::error::{Shortfall, SupplyShortfall};
use sgir_core::production::{check_state, check_supplies, check_void_stock, requirements};
use sgir_core::validation::{
    validate_name, validate_notes, validate_price, validate_reason, validate_recipe_lines,
    validate_stock_level, RecipeLine,
};
use sgir_core::{
    CoreError, HistoryEntry, MovementKind, Money, Percent, Principal, Product,
    Production, ProductionSnapshot, ProductionState, Qty, RecipeDetail, StockMovement, StockTarget,
    Supply, SupplyUnit, ValidationError,
};
use sgir_db::repository::{NewHistoryEntry, NewMovement, NewProduct, NewSupply};
use sgir_db::{Repositories, WriteUnit};

use crate::error::ApiResult;
use crate::services::evaluate_product_alerts;
use crate::services::identity::verify_secondary_pin;
use crate::AppState;

/// Movements returned with a stock adjustment.
const RECENT_MOVEMENTS: i64 = 20;

// =============================================================================
// Requests / Views
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct NewProductRequest {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub price: Money,
    #[serde(default = "default_true")]
    pub tracks_inventory: bool,
    #[serde(default)]
    pub stock_on_hand: i64,
    #[serde(default)]
    pub stock_min: i64,
    #[serde(default)]
    pub is_manufactured: bool,
    #[serde(default)]
    pub image: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ProductFlagsRequest {
    pub available: bool,
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct NewSupplyRequest {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub unit: SupplyUnit,
    #[serde(default = "Qty::zero")]
    pub stock_on_hand: Qty,
    #[serde(default = "Qty::zero")]
    pub stock_min: Qty,
}

/// Manual stock change. `delta` is in product units or supply thousandths.
#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    pub target: StockTarget,
    pub target_id: i64,
    pub delta: i64,
    pub note: String,
}

#[derive(Debug, Serialize)]
pub struct AdjustResult {
    pub target: StockTarget,
    pub target_id: i64,
    pub stock_on_hand: i64,
    pub movements: Vec<StockMovement>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RecipeLineRequest {
    pub supply_id: i64,
    pub qty_per_unit: Qty,
    #[serde(default)]
    pub loss_pct: Percent,
}

#[derive(Debug, Deserialize)]
pub struct RecipeRequest {
    pub product_id: i64,
    pub items: Vec<RecipeLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterProductionRequest {
    pub product_id: i64,
    pub qty_produced: i64,
    #[serde(default)]
    pub lot: Option<String>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct VoidRequest {
    pub secondary_pin: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct ProductionView {
    #[serde(flatten)]
    pub production: Production,
    pub snapshots: Vec<ProductionSnapshot>,
    pub history: Vec<HistoryEntry>,
}

// =============================================================================
// Catalogue
// =============================================================================

#[instrument(skip(state, req), fields(name = %req.name))]
pub async fn create_product(state: &AppState, req: &NewProductRequest) -> ApiResult<Product> {
    validate_name("name", &req.name)?;
    validate_price(req.price)?;
    validate_stock_level("stock_on_hand", req.stock_on_hand)?;
    validate_stock_level("stock_min", req.stock_min)?;

    let now = Utc::now();
    let mut unit = state.db.write().await?;
    let product = unit
        .products()
        .insert(&NewProduct {
            name: req.name.trim().to_string(),
            category: req.category.clone(),
            price: req.price,
            tracks_inventory: req.tracks_inventory,
            stock_on_hand: req.stock_on_hand,
            stock_min: req.stock_min,
            is_manufactured: req.is_manufactured,
            image: req.image.clone(),
        })
        .await?;
    evaluate_product_alerts(&mut unit, &product, product.stock_on_hand, now).await?;
    unit.commit().await?;

    info!(product_id = product.id, price = %product.price, "Product created");
    Ok(product)
}

pub async fn list_products(state: &AppState, active_only: bool) -> ApiResult<Vec<Product>> {
    let mut unit = state.db.read().await?;
    Ok(unit.products().list(active_only).await?)
}

#[instrument(skip(state, req))]
pub async fn set_product_flags(
    state: &AppState,
    product_id: i64,
    req: &ProductFlagsRequest,
) -> ApiResult<Product> {
    let mut unit = state.db.write().await?;
    unit.products()
        .set_flags(product_id, req.available, req.active)
        .await?;
    let product = unit.products().require(product_id).await?;
    unit.commit().await?;

    info!(product_id, available = req.available, active = req.active, "Product flags changed");
    Ok(product)
}

#[instrument(skip(state, req), fields(name = %req.name))]
pub async fn create_supply(state: &AppState, req: &NewSupplyRequest) -> ApiResult<Supply> {
    validate_name("name", &req.name)?;
    validate_stock_level("stock_on_hand", req.stock_on_hand.milli())?;
    validate_stock_level("stock_min", req.stock_min.milli())?;

    let now = Utc::now();
    let mut unit = state.db.write().await?;
    let supply = unit
        .supplies()
        .insert(&NewSupply {
            name: req.name.trim().to_string(),
            category: req.category.clone(),
            unit: req.unit,
            stock_on_hand: req.stock_on_hand,
            stock_min: req.stock_min,
        })
        .await?;
    evaluate_supply_alerts(&mut unit, &supply, supply.stock_on_hand, now).await?;
    unit.commit().await?;

    info!(supply_id = supply.id, unit = %supply.unit, "Supply created");
    Ok(supply)
}

pub async fn list_supplies(state: &AppState, active_only: bool) -> ApiResult<Vec<Supply>> {
    let mut unit = state.db.read().await?;
    Ok(unit.supplies().list(active_only).await?)
}

/// Restock (positive) or write-off (negative) with an adjustment movement.
///
/// ## Returns
/// * `Err(insufficient_stock)` / `Err(insufficient_supply)` - a write-off
///   larger than what is on hand
#[instrument(skip(state, req), fields(target = %req.target, target_id = req.target_id, delta = req.delta))]
pub async fn adjust_stock(state: &AppState, req: &AdjustRequest, actor: i64) -> ApiResult<AdjustResult> {
    if req.delta == 0 {
        return Err(ValidationError::InvalidFormat {
            field: "delta".to_string(),
            reason: "must not be zero".to_string(),
        }
        .into());
    }
    validate_reason(&req.note)?;

    let now = Utc::now();
    let mut unit = state.db.write().await?;
    let stock_after = match req.target {
        StockTarget::Product => {
            let product = unit.products().require(req.target_id).await?;
            let after = if req.delta > 0 {
                unit.products().increment_stock(product.id, req.delta).await?
            } else {
                unit.products()
                    .decrement_stock(product.id, -req.delta)
                    .await?
                    .ok_or_else(|| CoreError::InsufficientStock {
                        shortfalls: vec![Shortfall {
                            product: product.id,
                            name: product.name.clone(),
                            requested: -req.delta,
                            available: product.stock_on_hand,
                        }],
                    })?
            };
            evaluate_product_alerts(&mut unit, &product, after, now).await?;
            after
        }
        StockTarget::Supply => {
            let supply = unit.supplies().require(req.target_id).await?;
            let delta = Qty::from_milli(req.delta.abs());
            let after = if req.delta > 0 {
                unit.supplies().increment_stock(supply.id, delta).await?
            } else {
                unit.supplies()
                    .decrement_stock(supply.id, delta)
                    .await?
                    .ok_or_else(|| CoreError::InsufficientSupply {
                        shortfalls: vec![SupplyShortfall {
                            supply: supply.id,
                            name: supply.name.clone(),
                            requested: delta,
                            available: supply.stock_on_hand,
                        }],
                    })?
            };
            evaluate_supply_alerts(&mut unit, &supply, after, now).await?;
            after.milli()
        }
    };

    unit.movements()
        .insert(
            &NewMovement::new(req.target, req.target_id, MovementKind::Adjustment, req.delta, stock_after)
                .actor(actor)
                .note(req.note.trim()),
            now,
        )
        .await?;
    let movements = unit
        .movements()
        .for_target(req.target, req.target_id, RECENT_MOVEMENTS)
        .await?;
    unit.commit().await?;

    info!(target = %req.target, target_id = req.target_id, delta = req.delta, stock_after, "Stock adjusted");
    Ok(AdjustResult {
        target: req.target,
        target_id: req.target_id,
        stock_on_hand: stock_after,
        movements,
    })
}

// =============================================================================
// Recipes
// =============================================================================

fn recipe_lines(items: &[RecipeLineRequest]) -> Vec<RecipeLine> {
    items
        .iter()
        .map(|i| (i.supply_id, i.qty_per_unit, i.loss_pct))
        .collect()
}

/// Creates version 1 of a manufactured product's recipe.
#[instrument(skip(state, req), fields(product_id = req.product_id, lines = req.items.len()))]
pub async fn create_recipe(state: &AppState, req: &RecipeRequest) -> ApiResult<RecipeDetail> {
    let lines = recipe_lines(&req.items);
    validate_recipe_lines(&lines)?;

    let mut unit = state.db.write().await?;
    let product = unit.products().require(req.product_id).await?;
    if !product.is_manufactured {
        return Err(CoreError::NotManufactured {
            product_id: product.id,
        }
        .into());
    }
    if let Some(existing) = unit.recipes().active_for_product(product.id).await? {
        return Err(CoreError::Duplicate {
            field: "recipe".to_string(),
            value: format!("product {} already has recipe v{}", product.id, existing.version),
        }
        .into());
    }
    require_supplies(&mut unit, &lines).await?;

    let recipe = unit.recipes().insert(product.id, 1, &lines, Utc::now()).await?;
    unit.commit().await?;

    info!(product_id = product.id, recipe_id = recipe.recipe.id, "Recipe created");
    Ok(recipe)
}

/// Replaces a product's active recipe with a new version.
#[instrument(skip(state, req), fields(lines = req.items.len()))]
pub async fn update_recipe(state: &AppState, product_id: i64, req: &RecipeRequest) -> ApiResult<RecipeDetail> {
    if req.product_id != product_id {
        return Err(ValidationError::InvalidFormat {
            field: "product_id".to_string(),
            reason: "does not match the path".to_string(),
        }
        .into());
    }
    let lines = recipe_lines(&req.items);
    validate_recipe_lines(&lines)?;

    let mut unit = state.db.write().await?;
    let product = unit.products().require(product_id).await?;
    let current = unit
        .recipes()
        .active_for_product(product.id)
        .await?
        .ok_or(CoreError::RecipeMissing { product_id })?;
    require_supplies(&mut unit, &lines).await?;

    unit.recipes().deactivate(current.id).await?;
    let recipe = unit
        .recipes()
        .insert(product.id, current.version + 1, &lines, Utc::now())
        .await?;
    unit.commit().await?;

    info!(product_id, version = recipe.recipe.version, "Recipe updated");
    Ok(recipe)
}

async fn require_supplies(unit: &mut WriteUnit, lines: &[RecipeLine]) -> ApiResult<()> {
    let ids: Vec<i64> = lines.iter().map(|(id, _, _)| *id).collect();
    for supply in unit.supplies().require_many(&ids).await? {
        if !supply.active {
            return Err(CoreError::not_found("supply", supply.id).into());
        }
    }
    Ok(())
}

// =============================================================================
// Productions
// =============================================================================

#[instrument(skip(state, caller, req), fields(product_id = req.product_id, qty = req.qty_produced))]
pub async fn register_production(
    state: &AppState,
    caller: &Principal,
    req: &RegisterProductionRequest,
) -> ApiResult<Production> {
    if req.qty_produced < 1 {
        return Err(ValidationError::MustBePositive {
            field: "qty_produced".to_string(),
        }
        .into());
    }
    validate_notes(&req.notes)?;

    let now = Utc::now();
    let mut unit = state.db.write().await?;
    let product = unit.products().require(req.product_id).await?;
    if !product.is_manufactured {
        return Err(CoreError::NotManufactured {
            product_id: product.id,
        }
        .into());
    }
    let recipe = unit
        .recipes()
        .active_for_product(product.id)
        .await?
        .ok_or(CoreError::RecipeMissing {
            product_id: product.id,
        })?;

    let production = unit
        .productions()
        .insert(
            product.id,
            recipe.id,
            req.qty_produced,
            req.lot.as_deref(),
            req.notes.trim(),
            caller.id,
            now,
        )
        .await?;
    append_production_history(&mut unit, &production, caller.id, None, ProductionState::Registered, None, now)
        .await?;
    unit.commit().await?;

    info!(production_id = production.id, recipe_id = recipe.id, "Production registered");
    Ok(production)
}

/// Consumes supplies and credits the product.
///
/// ## Returns
/// * `Err(insufficient_supply)` - every short supply is listed; nothing moves
#[instrument(skip(state))]
pub async fn apply_production(state: &AppState, production_id: i64, actor: i64) -> ApiResult<Production> {
    let now = Utc::now();
    let mut unit = state.db.write().await?;
    let production = unit.productions().require(production_id).await?;
    check_state(&production, ProductionState::Registered, ProductionState::Applied)?;

    let items = unit.recipes().items(production.recipe_id).await?;
    let reqs = requirements(&items, production.qty_produced);
    let ids: Vec<i64> = reqs.iter().map(|r| r.supply_id).collect();
    let supplies = unit.supplies().require_many(&ids).await?;
    check_supplies(&reqs, &supplies)?;

    for req in &reqs {
        let Some(supply) = supplies.iter().find(|s| s.id == req.supply_id) else {
            return Err(CoreError::not_found("supply", req.supply_id).into());
        };
        let Some(stock_after) = unit.supplies().decrement_stock(supply.id, req.required).await? else {
            return Err(CoreError::InsufficientSupply {
                shortfalls: vec![SupplyShortfall {
                    supply: supply.id,
                    name: supply.name.clone(),
                    requested: req.required,
                    available: supply.stock_on_hand,
                }],
            }
            .into());
        };
        unit.productions()
            .insert_snapshot(
                production.id,
                supply.id,
                req.required,
                supply.unit,
                supply.stock_on_hand,
                stock_after,
            )
            .await?;
        unit.movements()
            .insert(
                &NewMovement::new(
                    StockTarget::Supply,
                    supply.id,
                    MovementKind::ProductionConsume,
                    -req.required.milli(),
                    stock_after.milli(),
                )
                .production(production.id)
                .actor(actor),
                now,
            )
            .await?;
        evaluate_supply_alerts(&mut unit, supply, stock_after, now).await?;
    }

    let product = unit.products().require(production.product_id).await?;
    let product_after = unit
        .products()
        .increment_stock(product.id, production.qty_produced)
        .await?;
    unit.movements()
        .insert(
            &NewMovement::new(
                StockTarget::Product,
                product.id,
                MovementKind::ProductionOutput,
                production.qty_produced,
                product_after,
            )
            .production(production.id)
            .actor(actor),
            now,
        )
        .await?;
    evaluate_product_alerts(&mut unit, &product, product_after, now).await?;

    if !unit.productions().mark_applied(production.id, actor, now).await? {
        return Err(CoreError::InvalidTransition {
            entity: "production",
            from: production.state.to_string(),
            to: ProductionState::Applied.to_string(),
        }
        .into());
    }
    append_production_history(
        &mut unit,
        &production,
        actor,
        Some(ProductionState::Registered),
        ProductionState::Applied,
        None,
        now,
    )
    .await?;
    let applied = unit.productions().require(production.id).await?;
    unit.commit().await?;

    info!(
        production_id,
        product_id = product.id,
        qty = production.qty_produced,
        supplies = reqs.len(),
        "Production applied"
    );
    Ok(applied)
}

/// Reverses an applied production from its snapshots.
///
/// ## Returns
/// * `Err(invalid_secondary_pin)` - no authoriser matches the PIN
/// * `Err(cannot_void_insufficient_product_stock)` - the output was sold
#[instrument(skip(state, req))]
pub async fn void_production(
    state: &AppState,
    production_id: i64,
    req: &VoidRequest,
    actor: i64,
) -> ApiResult<Production> {
    validate_reason(&req.reason)?;

    let now = Utc::now();
    let mut unit = state.db.write().await?;
    let production = unit.productions().require(production_id).await?;
    check_state(&production, ProductionState::Applied, ProductionState::Voided)?;
    let authoriser = verify_secondary_pin(&mut unit, &state.hasher, &req.secondary_pin).await?;

    let product = unit.products().require(production.product_id).await?;
    check_void_stock(&production, product.stock_on_hand)?;

    for snapshot in unit.productions().snapshots(production.id).await? {
        let supply = unit.supplies().require(snapshot.supply_id).await?;
        let stock_after = unit
            .supplies()
            .increment_stock(supply.id, snapshot.qty_consumed)
            .await?;
        unit.movements()
            .insert(
                &NewMovement::new(
                    StockTarget::Supply,
                    supply.id,
                    MovementKind::ProductionVoid,
                    snapshot.qty_consumed.milli(),
                    stock_after.milli(),
                )
                .production(production.id)
                .actor(actor),
                now,
            )
            .await?;
        evaluate_supply_alerts(&mut unit, &supply, stock_after, now).await?;
    }

    let product_after = unit
        .products()
        .decrement_stock(product.id, production.qty_produced)
        .await?
        .ok_or(CoreError::CannotVoidInsufficientProductStock {
            product_id: product.id,
            required: production.qty_produced,
            available: product.stock_on_hand,
        })?;
    unit.movements()
        .insert(
            &NewMovement::new(
                StockTarget::Product,
                product.id,
                MovementKind::ProductionVoid,
                -production.qty_produced,
                product_after,
            )
            .production(production.id)
            .actor(actor),
            now,
        )
        .await?;
    evaluate_product_alerts(&mut unit, &product, product_after, now).await?;

    let reason = req.reason.trim();
    if !unit
        .productions()
        .mark_voided(production.id, actor, reason, now)
        .await?
    {
        return Err(CoreError::InvalidTransition {
            entity: "production",
            from: production.state.to_string(),
            to: ProductionState::Voided.to_string(),
        }
        .into());
    }
    append_production_history(
        &mut unit,
        &production,
        actor,
        Some(ProductionState::Applied),
        ProductionState::Voided,
        Some((reason, authoriser.id)),
        now,
    )
    .await?;
    let voided = unit.productions().require(production.id).await?;
    unit.commit().await?;

    warn!(production_id, authoriser = authoriser.id, reason, "Production voided");
    Ok(voided)
}

pub async fn get_production(state: &AppState, production_id: i64) -> ApiResult<ProductionView> {
    let mut unit = state.db.read().await?;
    let production = unit.productions().require(production_id).await?;
    let snapshots = unit.productions().snapshots(production_id).await?;
    let history = unit.history().for_production(production_id).await?;
    Ok(ProductionView {
        production,
        snapshots,
        history,
    })
}

async fn append_production_history(
    unit: &mut WriteUnit,
    production: &Production,
    actor: i64,
    from: Option<ProductionState>,
    to: ProductionState,
    void: Option<(&str, i64)>,
    now: DateTime<Utc>,
) -> ApiResult<()> {
    let before = json!({ "state": from });
    let mut after = json!({ "state": to, "qty_produced": production.qty_produced });
    let mut entry = match void {
        Some((reason, authoriser)) => {
            after["authorised_by"] = json!(authoriser);
            NewHistoryEntry::for_production(production.id, actor, before, after).reason(reason)
        }
        None => NewHistoryEntry::for_production(production.id, actor, before, after),
    };
    if from.is_none() {
        entry.after["recipe_id"] = json!(production.recipe_id);
    }
    unit.history().append(&entry, now).await?;
    Ok(())
}

// =============================================================================
// Alerts
// =============================================================================

#[instrument(skip(state, note))]
pub async fn resolve_alert(state: &AppState, alert_id: i64, actor: i64, note: &str) -> ApiResult<()> {
    validate_notes(note)?;

    let mut unit = state.db.write().await?;
    let alert = unit.alerts().require(alert_id).await?;
    if !unit.alerts().resolve(alert_id, actor, note.trim(), Utc::now()).await? {
        return Err(CoreError::InvalidTransition {
            entity: "stock_alert",
            from: alert.state.to_string(),
            to: "resolved".to_string(),
        }
        .into());
    }
    unit.commit().await?;

    info!(alert_id, "Stock alert resolved");
    Ok(())
}

async fn evaluate_supply_alerts(
    unit: &mut WriteUnit,
    supply: &Supply,
    stock: Qty,
    now: DateTime<Utc>,
) -> ApiResult<()> {
    unit.alerts()
        .evaluate(
            StockTarget::Supply,
            supply.id,
            stock.milli(),
            supply.stock_min.milli(),
            now,
        )
        .await?;
    Ok(())
}
