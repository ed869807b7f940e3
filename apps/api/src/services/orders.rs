//! # Order Service
//!
//! Order creation and every later modification. Stock is taken once, when
//! a line first appears, and only deltas move afterwards.
//!
//! ## Create Order
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │ write unit                                                         │
//! │  1. table ── capacity check, reservation seated                    │
//! │  2. account ── find open or open                                   │
//! │  3. products (ascending id) ── fail-fast shortfall list            │
//! │  4. order row                                                      │
//! │  5. per line: conditional decrement ─► movement ─► alerts ─► item  │
//! │  6. totals, history, account recalculation, table occupied         │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//! A lost decrement race (`stock_race`) or any other error drops the unit
//! and nothing is written.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use sgir_core::error::Shortfall;
use sgir_core::history::changed_fields;
use sgir_core::order::{
    check_cancel, check_modifiable, check_removal, check_state_step, merge_lines,
    qty_change_delta, Totals,
};
use sgir_core::table::check_capacity;
use sgir_core::validation::{
    validate_discount_pct, validate_guest_count, validate_line_count, validate_line_qty,
    validate_non_negative_money, validate_notes, validate_reason,
};
use sgir_core::{
    CoreError, HistoryEntry, HistoryKind, Money, MovementKind, Order, OrderDetail, OrderItem,
    OrderState, PaymentState, Percent, Principal, Product, ReservationState, Role, StockTarget,
    TableStatus, ValidationError,
};
use sgir_db::repository::{NewHistoryEntry, NewMovement, NewOrder};
use sgir_db::{Repositories, WriteUnit};

use crate::error::ApiResult;
use crate::services::evaluate_product_alerts;
use crate::services::tables::{occupy_group, refresh_account, seating_account};
use crate::AppState;

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LineRequest {
    pub product_id: i64,
    pub qty: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub table_number: i64,
    pub guest_count: i64,
    pub lines: Vec<LineRequest>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct QtyRequest {
    pub qty: i64,
}

#[derive(Debug, Deserialize)]
pub struct DiscountRequest {
    pub discount_pct: Percent,
}

#[derive(Debug, Deserialize)]
pub struct TipRequest {
    pub tip: Money,
}

#[derive(Debug, Deserialize)]
pub struct ReassignRequest {
    pub table_number: i64,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct StateRequest {
    pub state: OrderState,
}

// =============================================================================
// Create
// =============================================================================

/// Creates an order on a table, taking stock for every line.
///
/// ## Returns
/// * `Err(capacity_exceeded)` - guests do not fit the table or its group
/// * `Err(insufficient_stock)` - one or more lines short; all listed
/// * `Err(stock_race)` - a conditional decrement lost to a concurrent writer
#[instrument(skip(state, caller, req), fields(table = req.table_number, caller = caller.id))]
pub async fn create_order(
    state: &AppState,
    caller: &Principal,
    req: &CreateOrderRequest,
) -> ApiResult<OrderDetail> {
    validate_guest_count(req.guest_count)?;
    validate_line_count(req.lines.len())?;
    for line in &req.lines {
        validate_line_qty(line.qty)?;
    }
    validate_notes(&req.notes)?;
    let lines = merge_lines(
        &req.lines
            .iter()
            .map(|l| (l.product_id, l.qty))
            .collect::<Vec<_>>(),
    );
    for (_, qty) in &lines {
        validate_line_qty(*qty)?;
    }

    let now = Utc::now();
    let mut unit = state.db.write().await?;

    let table = unit.tables().require(req.table_number).await?;
    check_capacity(&table, req.guest_count)?;
    if table.status == TableStatus::Reserved {
        let reservations = unit.reservations().confirmed_for_table(table.number).await?;
        if let Some(reservation) = reservations.first() {
            unit.reservations()
                .finish(reservation.id, ReservationState::Seated)
                .await?;
            debug!(reservation_id = reservation.id, table = table.number, "Reservation seated");
        }
    }

    let account = seating_account(&mut unit, table.number, caller.id, now).await?;

    let ids: Vec<i64> = lines.iter().map(|(id, _)| *id).collect();
    let products = sellable_products(&mut unit, &ids).await?;
    ensure_stock(&products, &lines)?;

    let mut order = unit
        .orders()
        .insert(&NewOrder {
            table_number: table.number,
            account_id: account.id,
            waiter_id: (caller.role != Role::Customer).then_some(caller.id),
            guest_count: req.guest_count,
            notes: req.notes.trim().to_string(),
            opened_at: now,
        })
        .await?;

    let mut items = Vec::with_capacity(lines.len());
    for (product_id, qty) in &lines {
        let product = &products[product_id];
        take_stock(&mut unit, product, *qty, order.id, caller.id, now).await?;
        items.push(
            unit.orders()
                .insert_item(order.id, product.id, *qty, product.price)
                .await?,
        );
    }

    Totals::from_items(&items, order.discount_pct, order.tip).apply_to(&mut order);
    unit.orders().update(&order).await?;
    unit.history()
        .append(
            &NewHistoryEntry::for_order(
                order.id,
                caller.id,
                HistoryKind::StateChange,
                json!({ "state": null }),
                audit_fields(&order),
            ),
            now,
        )
        .await?;

    refresh_account(&mut unit, account.id, Some(caller.id), false, now).await?;
    occupy_group(&mut unit, table.number).await?;
    unit.commit().await?;

    info!(
        order_id = order.id,
        table = order.table_number,
        account_id = order.account_id,
        lines = items.len(),
        total = %order.total_final,
        "Order created"
    );
    Ok(OrderDetail { order, items })
}

// =============================================================================
// Lines
// =============================================================================

/// Adds `qty` of a product, merging into an existing line of the same
/// product.
#[instrument(skip(state, line), fields(product_id = line.product_id, qty = line.qty))]
pub async fn add_item(
    state: &AppState,
    order_id: i64,
    line: &LineRequest,
    actor: i64,
) -> ApiResult<OrderDetail> {
    validate_line_qty(line.qty)?;

    let now = Utc::now();
    let mut unit = state.db.write().await?;
    let mut order = unit.orders().require(order_id).await?;
    check_modifiable(&order)?;
    let items = unit.orders().items(order_id).await?;

    let existing = items.iter().find(|i| i.product_id == line.product_id).cloned();
    match &existing {
        Some(item) => validate_line_qty(item.qty_total + line.qty)?,
        None => validate_line_count(items.len() + 1)?,
    }

    let products = sellable_products(&mut unit, &[line.product_id]).await?;
    ensure_stock(&products, &[(line.product_id, line.qty)])?;
    let product = &products[&line.product_id];
    take_stock(&mut unit, product, line.qty, order_id, actor, now).await?;

    let (before_qty, item) = match existing {
        Some(item) => {
            let updated = unit
                .orders()
                .set_item_qty(&item, item.qty_total + line.qty)
                .await?;
            (json!(item.qty_total), updated)
        }
        None => (
            Value::Null,
            unit.orders()
                .insert_item(order_id, product.id, line.qty, product.price)
                .await?,
        ),
    };

    let before = audit_fields(&order);
    let items = unit.orders().items(order_id).await?;
    let totals = Totals::from_items(&items, order.discount_pct, order.tip);
    totals.ensure_covers(order.paid_amount)?;
    totals.apply_to(&mut order);
    mark_modified(&mut order, actor);
    unit.orders().update(&order).await?;

    let (mut b, mut a) = changed_fields(&before, &audit_fields(&order));
    b["product_id"] = json!(product.id);
    b["qty"] = before_qty;
    a["product_id"] = json!(product.id);
    a["qty"] = json!(item.qty_total);
    append_history(&mut unit, order_id, actor, HistoryKind::AddItem, b, a, None, now).await?;

    refresh_account(&mut unit, order.account_id, Some(actor), false, now).await?;
    unit.commit().await?;

    info!(order_id, item_id = item.id, qty = item.qty_total, "Order line added");
    Ok(OrderDetail { order, items })
}

/// Sets a line's total quantity. The paid part of a line never shrinks.
#[instrument(skip(state))]
pub async fn modify_qty(
    state: &AppState,
    order_id: i64,
    item_id: i64,
    new_qty: i64,
    actor: i64,
) -> ApiResult<OrderDetail> {
    validate_line_qty(new_qty)?;

    let now = Utc::now();
    let mut unit = state.db.write().await?;
    let mut order = unit.orders().require(order_id).await?;
    check_modifiable(&order)?;
    let item = require_line(&mut unit, order_id, item_id).await?;
    let delta = qty_change_delta(&item, new_qty)?;
    if delta == 0 {
        let items = unit.orders().items(order_id).await?;
        return Ok(OrderDetail { order, items });
    }

    let product = unit.products().require(item.product_id).await?;
    if delta > 0 {
        let products = HashMap::from([(product.id, product.clone())]);
        ensure_stock(&products, &[(product.id, delta)])?;
        take_stock(&mut unit, &product, delta, order_id, actor, now).await?;
    } else {
        return_stock(&mut unit, &product, -delta, order_id, actor, now).await?;
    }
    let updated = unit.orders().set_item_qty(&item, new_qty).await?;

    let before = audit_fields(&order);
    let items = unit.orders().items(order_id).await?;
    let totals = Totals::from_items(&items, order.discount_pct, order.tip);
    totals.ensure_covers(order.paid_amount)?;
    totals.apply_to(&mut order);
    mark_modified(&mut order, actor);
    unit.orders().update(&order).await?;

    let (mut b, mut a) = changed_fields(&before, &audit_fields(&order));
    b["item_id"] = json!(item.id);
    b["qty"] = json!(item.qty_total);
    a["item_id"] = json!(item.id);
    a["qty"] = json!(updated.qty_total);
    append_history(&mut unit, order_id, actor, HistoryKind::ModifyQty, b, a, None, now).await?;

    refresh_account(&mut unit, order.account_id, Some(actor), false, now).await?;
    unit.commit().await?;

    info!(order_id, item_id, from = item.qty_total, to = new_qty, "Order line quantity changed");
    Ok(OrderDetail { order, items })
}

/// Deletes an unpaid line and returns its stock. The last line of an
/// order cannot be removed.
#[instrument(skip(state))]
pub async fn remove_item(
    state: &AppState,
    order_id: i64,
    item_id: i64,
    actor: i64,
) -> ApiResult<OrderDetail> {
    let now = Utc::now();
    let mut unit = state.db.write().await?;
    let mut order = unit.orders().require(order_id).await?;
    check_modifiable(&order)?;
    let item = require_line(&mut unit, order_id, item_id).await?;
    let line_count = unit.orders().items(order_id).await?.len();
    check_removal(&item, line_count)?;

    let product = unit.products().require(item.product_id).await?;
    return_stock(&mut unit, &product, item.qty_total, order_id, actor, now).await?;
    unit.orders().delete_item(item.id).await?;

    let before = audit_fields(&order);
    let items = unit.orders().items(order_id).await?;
    let totals = Totals::from_items(&items, order.discount_pct, order.tip);
    totals.ensure_covers(order.paid_amount)?;
    totals.apply_to(&mut order);
    mark_modified(&mut order, actor);
    unit.orders().update(&order).await?;

    let (mut b, mut a) = changed_fields(&before, &audit_fields(&order));
    b["item_id"] = json!(item.id);
    b["product_id"] = json!(item.product_id);
    b["qty"] = json!(item.qty_total);
    a["item_id"] = json!(item.id);
    a["qty"] = Value::Null;
    append_history(&mut unit, order_id, actor, HistoryKind::RemoveItem, b, a, None, now).await?;

    refresh_account(&mut unit, order.account_id, Some(actor), false, now).await?;
    unit.commit().await?;

    info!(order_id, item_id, qty = item.qty_total, "Order line removed");
    Ok(OrderDetail { order, items })
}

// =============================================================================
// Money Adjustments
// =============================================================================

#[instrument(skip(state, req), fields(pct_bps = req.discount_pct.bps()))]
pub async fn apply_discount(
    state: &AppState,
    order_id: i64,
    req: &DiscountRequest,
    actor: i64,
) -> ApiResult<Order> {
    validate_discount_pct(req.discount_pct)?;
    adjust_totals(state, order_id, actor, HistoryKind::ApplyDiscount, |order| {
        order.discount_pct = req.discount_pct;
    })
    .await
}

#[instrument(skip(state, req), fields(tip = %req.tip))]
pub async fn apply_tip(state: &AppState, order_id: i64, req: &TipRequest, actor: i64) -> ApiResult<Order> {
    validate_non_negative_money("tip", req.tip)?;
    adjust_totals(state, order_id, actor, HistoryKind::AddTip, |order| {
        order.tip = req.tip;
    })
    .await
}

async fn adjust_totals(
    state: &AppState,
    order_id: i64,
    actor: i64,
    kind: HistoryKind,
    change: impl FnOnce(&mut Order),
) -> ApiResult<Order> {
    let now = Utc::now();
    let mut unit = state.db.write().await?;
    let mut order = unit.orders().require(order_id).await?;
    check_modifiable(&order)?;
    let before = audit_fields(&order);

    change(&mut order);
    let items = unit.orders().items(order_id).await?;
    let totals = Totals::from_items(&items, order.discount_pct, order.tip);
    totals.ensure_covers(order.paid_amount)?;
    totals.apply_to(&mut order);
    mark_modified(&mut order, actor);
    unit.orders().update(&order).await?;

    let (b, a) = changed_fields(&before, &audit_fields(&order));
    append_history(&mut unit, order_id, actor, kind, b, a, None, now).await?;
    refresh_account(&mut unit, order.account_id, Some(actor), false, now).await?;
    unit.commit().await?;

    info!(order_id, kind = %kind, total = %order.total_final, "Order totals adjusted");
    Ok(order)
}

// =============================================================================
// Table Moves / Lifecycle
// =============================================================================

/// Moves an order to another table. The source account is recalculated
/// (and closed, freeing its table, when nothing is left on it) and the
/// target is seated.
#[instrument(skip(state, req), fields(target = req.table_number))]
pub async fn reassign(
    state: &AppState,
    order_id: i64,
    req: &ReassignRequest,
    actor: i64,
) -> ApiResult<Order> {
    let now = Utc::now();
    let mut unit = state.db.write().await?;

    let target = unit.tables().require(req.table_number).await?;
    let mut order = unit.orders().require(order_id).await?;
    check_modifiable(&order)?;
    if order.table_number == target.number {
        return Err(ValidationError::InvalidFormat {
            field: "table_number".to_string(),
            reason: "order is already on this table".to_string(),
        }
        .into());
    }
    let source_group = unit.tables().group_of(order.table_number).await?;
    if source_group.contains(&target.number) {
        return Err(ValidationError::InvalidFormat {
            field: "table_number".to_string(),
            reason: "target belongs to the same table group".to_string(),
        }
        .into());
    }
    check_capacity(&target, order.guest_count)?;

    let target_account = seating_account(&mut unit, target.number, actor, now).await?;

    let before = audit_fields(&order);
    let source_account = order.account_id;
    order.table_number = target.number;
    order.account_id = target_account.id;
    order.reassigned = true;
    mark_modified(&mut order, actor);
    unit.orders().update(&order).await?;

    let (b, a) = changed_fields(&before, &audit_fields(&order));
    append_history(&mut unit, order_id, actor, HistoryKind::ReassignTable, b, a, None, now).await?;

    refresh_account(&mut unit, source_account, Some(actor), true, now).await?;
    refresh_account(&mut unit, target_account.id, Some(actor), false, now).await?;
    occupy_group(&mut unit, target.number).await?;
    unit.commit().await?;

    info!(order_id, to = target.number, "Order reassigned");
    Ok(order)
}

/// Cancels an unpaid order in `created` or `confirmed` and returns its stock.
#[instrument(skip(state, req))]
pub async fn cancel(state: &AppState, order_id: i64, req: &CancelRequest, actor: i64) -> ApiResult<Order> {
    validate_reason(&req.reason)?;

    let now = Utc::now();
    let mut unit = state.db.write().await?;
    let mut order = unit.orders().require(order_id).await?;
    check_cancel(&order)?;

    let items = unit.orders().items(order_id).await?;
    let ids: Vec<i64> = items.iter().map(|i| i.product_id).collect();
    let products: HashMap<i64, Product> = unit
        .products()
        .require_many(&ids)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
    for item in &items {
        let returned = item.qty_unpaid();
        if returned > 0 {
            if let Some(product) = products.get(&item.product_id) {
                return_stock(&mut unit, product, returned, order_id, actor, now).await?;
            }
        }
    }

    let before = audit_fields(&order);
    order.state = OrderState::Cancelled;
    order.payment_state = PaymentState::Cancelled;
    mark_modified(&mut order, actor);
    unit.orders().update(&order).await?;

    let (b, a) = changed_fields(&before, &audit_fields(&order));
    append_history(
        &mut unit,
        order_id,
        actor,
        HistoryKind::StateChange,
        b,
        a,
        Some(req.reason.trim()),
        now,
    )
    .await?;
    refresh_account(&mut unit, order.account_id, Some(actor), true, now).await?;
    unit.commit().await?;

    warn!(order_id, reason = %req.reason.trim(), "Order cancelled");
    Ok(order)
}

/// One forward step on the kitchen board (or `closed` once paid).
#[instrument(skip(state), fields(next = %next))]
pub async fn step_state(state: &AppState, order_id: i64, next: OrderState, actor: i64) -> ApiResult<Order> {
    let now = Utc::now();
    let mut unit = state.db.write().await?;
    let mut order = unit.orders().require(order_id).await?;
    check_state_step(&order, next)?;

    let before = audit_fields(&order);
    order.state = next;
    unit.orders().update(&order).await?;

    let (b, a) = changed_fields(&before, &audit_fields(&order));
    append_history(&mut unit, order_id, actor, HistoryKind::StateChange, b, a, None, now).await?;
    unit.commit().await?;

    info!(order_id, state = %next, "Order state changed");
    Ok(order)
}

// =============================================================================
// Reads
// =============================================================================

pub async fn get_order(state: &AppState, order_id: i64) -> ApiResult<OrderDetail> {
    let mut unit = state.db.read().await?;
    let order = unit.orders().require(order_id).await?;
    let items = unit.orders().items(order_id).await?;
    Ok(OrderDetail { order, items })
}

pub async fn history(state: &AppState, order_id: i64) -> ApiResult<Vec<HistoryEntry>> {
    let mut unit = state.db.read().await?;
    unit.orders().require(order_id).await?;
    Ok(unit.history().for_order(order_id).await?)
}

// =============================================================================
// Helpers
// =============================================================================

/// Order fields tracked in history entries.
pub(crate) fn audit_fields(order: &Order) -> Value {
    json!({
        "state": order.state,
        "payment_state": order.payment_state,
        "table_number": order.table_number,
        "account_id": order.account_id,
        "subtotal": order.subtotal,
        "discount_pct": order.discount_pct,
        "discount": order.discount,
        "tip": order.tip,
        "total_final": order.total_final,
        "paid_amount": order.paid_amount,
        "payment_method": order.payment_method,
        "cashier_id": order.cashier_id,
    })
}

#[allow(clippy::too_many_arguments)]
pub(crate) async fn append_history(
    unit: &mut WriteUnit,
    order_id: i64,
    actor: i64,
    kind: HistoryKind,
    before: Value,
    after: Value,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> ApiResult<()> {
    let mut entry = NewHistoryEntry::for_order(order_id, actor, kind, before, after);
    if let Some(reason) = reason {
        entry = entry.reason(reason);
    }
    unit.history().append(&entry, now).await?;
    Ok(())
}

fn mark_modified(order: &mut Order, actor: i64) {
    order.modified = true;
    order.modified_by = Some(actor);
}

async fn require_line(unit: &mut WriteUnit, order_id: i64, item_id: i64) -> ApiResult<OrderItem> {
    let item = unit.orders().require_item(item_id).await?;
    if item.order_id != order_id {
        return Err(CoreError::not_found("order_item", item_id).into());
    }
    Ok(item)
}

/// Loads products for sale: inactive ones do not exist for ordering,
/// unavailable ones are refused.
async fn sellable_products(unit: &mut WriteUnit, ids: &[i64]) -> ApiResult<HashMap<i64, Product>> {
    let products = unit.products().require_many(ids).await?;
    let mut by_id = HashMap::with_capacity(products.len());
    for product in products {
        if !product.active {
            return Err(CoreError::not_found("product", product.id).into());
        }
        if !product.available {
            return Err(ValidationError::InvalidFormat {
                field: "product_id".to_string(),
                reason: format!("{} is not available", product.name),
            }
            .into());
        }
        by_id.insert(product.id, product);
    }
    Ok(by_id)
}

/// Fail-fast stock check listing every short line.
fn ensure_stock(products: &HashMap<i64, Product>, lines: &[(i64, i64)]) -> ApiResult<()> {
    let shortfalls: Vec<Shortfall> = lines
        .iter()
        .filter_map(|(id, qty)| products.get(id).map(|p| (p, *qty)))
        .filter(|(p, qty)| p.tracks_inventory && p.stock_on_hand < *qty)
        .map(|(p, qty)| Shortfall {
            product: p.id,
            name: p.name.clone(),
            requested: qty,
            available: p.stock_on_hand,
        })
        .collect();

    if shortfalls.is_empty() {
        Ok(())
    } else {
        warn!(lines = shortfalls.len(), "Insufficient stock");
        Err(CoreError::InsufficientStock { shortfalls }.into())
    }
}

/// Conditional decrement plus its sale movement and alert check.
async fn take_stock(
    unit: &mut WriteUnit,
    product: &Product,
    qty: i64,
    order_id: i64,
    actor: i64,
    now: DateTime<Utc>,
) -> ApiResult<()> {
    if !product.tracks_inventory {
        return Ok(());
    }
    let Some(stock_after) = unit.products().decrement_stock(product.id, qty).await? else {
        warn!(product_id = product.id, qty, "Stock decrement lost a race");
        return Err(CoreError::StockRace {
            product_id: product.id,
        }
        .into());
    };
    unit.movements()
        .insert(
            &NewMovement::new(StockTarget::Product, product.id, MovementKind::Sale, -qty, stock_after)
                .order(order_id)
                .actor(actor),
            now,
        )
        .await?;
    evaluate_product_alerts(unit, product, stock_after, now).await?;
    Ok(())
}

/// Puts sold units back.
async fn return_stock(
    unit: &mut WriteUnit,
    product: &Product,
    qty: i64,
    order_id: i64,
    actor: i64,
    now: DateTime<Utc>,
) -> ApiResult<()> {
    if !product.tracks_inventory {
        return Ok(());
    }
    let stock_after = unit.products().increment_stock(product.id, qty).await?;
    unit.movements()
        .insert(
            &NewMovement::new(
                StockTarget::Product,
                product.id,
                MovementKind::SaleReturn,
                qty,
                stock_after,
            )
            .order(order_id)
            .actor(actor),
            now,
        )
        .await?;
    evaluate_product_alerts(unit, product, stock_after, now).await?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: i64, stock: i64, tracks: bool) -> Product {
        Product {
            id,
            name: format!("P{}", id),
            category: None,
            price: Money::from_cents(1000),
            available: true,
            active: true,
            tracks_inventory: tracks,
            stock_on_hand: stock,
            stock_min: 0,
            is_manufactured: false,
            image: None,
        }
    }

    #[test]
    fn test_ensure_stock_lists_every_shortfall() {
        let products = HashMap::from([
            (1, product(1, 1, true)),
            (2, product(2, 0, true)),
            (3, product(3, 10, true)),
        ]);
        let err = ensure_stock(&products, &[(1, 3), (2, 1), (3, 2)]).unwrap_err();
        assert_eq!(err.code, "insufficient_stock");
        let detail = err.detail.unwrap();
        assert_eq!(detail["shortfalls"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_untracked_products_never_short() {
        let products = HashMap::from([(1, product(1, 0, false))]);
        assert!(ensure_stock(&products, &[(1, 50)]).is_ok());
    }
}
