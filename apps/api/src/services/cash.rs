//! # Cash Register Service
//!
//! Shifts, payments and refunds. Every payment needs the acting cashier to
//! hold an open shift dated today.
//!
//! ## Payment Flow
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌─────────────┐   ┌──────────────────┐
//! │ shift    │──►│ order      │──►│ transaction │──►│ order settled    │
//! │ open?    │   │ payable?   │   │ FACT-…      │   │ account recalc   │
//! └──────────┘   └────────────┘   │ (+ splits)  │   │ table released   │
//!                                 └─────────────┘   │ when closed      │
//!                                                   └──────────────────┘
//! ```
//! Stock was taken when the lines were ordered and is not touched here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use sgir_core::cash::{
    cash_change, check_refund, check_splits, invoice_number, item_charge, reconcile_shift,
    ShiftLedger, SplitLine,
};
use sgir_core::order::{check_payable, payment_state_for};
use sgir_core::validation::{validate_non_negative_money, validate_notes, validate_reason};
use sgir_core::{
    CoreError, HistoryKind, Money, Order, PaymentMethod, PaymentSplit, PaymentState, Principal,
    Refund, Shift, ShiftTurn, TableAccount, Transaction, ValidationError,
};
use sgir_db::{Repositories, WriteUnit};

use crate::error::{ApiError, ApiResult};
use crate::gate::business_date;
use crate::services::identity::verify_secondary_pin;
use crate::services::orders::{append_history, audit_fields};
use crate::services::tables::refresh_account;
use crate::AppState;

/// Fresh invoice numbers tried before giving up.
const INVOICE_ATTEMPTS: usize = 5;

// =============================================================================
// Requests / Responses
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct OpenShiftRequest {
    #[serde(default = "default_turn")]
    pub turn: ShiftTurn,
    pub cash_start: Money,
    #[serde(default)]
    pub notes: String,
}

fn default_turn() -> ShiftTurn {
    ShiftTurn::Full
}

#[derive(Debug, Deserialize)]
pub struct CloseShiftRequest {
    pub cash_real: Money,
}

#[derive(Debug, Deserialize)]
pub struct SimplePaymentRequest {
    pub order_id: i64,
    pub method: PaymentMethod,
    #[serde(default)]
    pub amount_tendered: Option<Money>,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SplitPaymentRequest {
    pub order_id: i64,
    pub splits: Vec<SplitLine>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ItemPayment {
    pub item_id: i64,
    pub qty: i64,
}

#[derive(Debug, Deserialize)]
pub struct ItemPaymentRequest {
    pub order_id: i64,
    pub lines: Vec<ItemPayment>,
    pub method: PaymentMethod,
    #[serde(default)]
    pub amount_tendered: Option<Money>,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub order_id: i64,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reason: String,
    pub secondary_pin: String,
}

/// Result of any payment.
#[derive(Debug, Serialize)]
pub struct PaymentReceipt {
    pub transaction: Transaction,
    pub splits: Vec<PaymentSplit>,
    /// Cash handed back; never persisted
    pub change: Money,
    pub order: Order,
    pub account: TableAccount,
}

// =============================================================================
// Shifts
// =============================================================================

/// Opens today's shift for the caller.
///
/// ## Returns
/// * `Err(shift_already_open)` - the caller already has an open shift today
#[instrument(skip(state, caller, req), fields(cashier = caller.id))]
pub async fn open_shift(state: &AppState, caller: &Principal, req: &OpenShiftRequest) -> ApiResult<Shift> {
    validate_non_negative_money("cash_start", req.cash_start)?;
    validate_notes(&req.notes)?;

    let today = business_date();
    let mut unit = state.db.write().await?;
    if unit.shifts().find_open(caller.id, today).await?.is_some() {
        return Err(CoreError::ShiftAlreadyOpen.into());
    }
    let shift = unit
        .shifts()
        .open(caller.id, today, req.turn, req.cash_start, req.notes.trim(), Utc::now())
        .await
        .map_err(|e| {
            if e.is_unique_on("shifts.cashier_id") {
                ApiError::from(CoreError::ShiftAlreadyOpen)
            } else {
                ApiError::from(e)
            }
        })?;
    unit.commit().await?;
    state.work_day.invalidate().await;

    info!(shift_id = shift.id, cashier = caller.id, turn = %shift.turn, cash_start = %shift.cash_start, "Shift opened");
    Ok(shift)
}

/// Closes the caller's open shift and reconciles it against counted cash.
#[instrument(skip(state, caller, req), fields(cashier = caller.id))]
pub async fn close_shift(state: &AppState, caller: &Principal, req: &CloseShiftRequest) -> ApiResult<Shift> {
    validate_non_negative_money("cash_real", req.cash_real)?;

    let now = Utc::now();
    let mut unit = state.db.write().await?;
    let shift = unit
        .shifts()
        .find_open(caller.id, business_date())
        .await?
        .ok_or(CoreError::ShiftNotOpen)?;

    let ledger = ShiftLedger {
        cash_start: shift.cash_start,
        payments: unit.payments().ledger_payments(caller.id, shift.opened_at, now).await?,
        refunds: unit.payments().ledger_refunds(caller.id, shift.opened_at, now).await?,
        orders: unit.payments().ledger_orders(caller.id, shift.opened_at, now).await?,
    };
    let close = reconcile_shift(&ledger, req.cash_real);
    if !unit.shifts().close(shift.id, &close, now).await? {
        return Err(CoreError::ShiftNotOpen.into());
    }
    let closed = unit.shifts().require(shift.id).await?;
    unit.commit().await?;
    state.work_day.invalidate().await;

    if close.diff.is_zero() {
        info!(shift_id = shift.id, sales = %close.total_sales, "Shift closed");
    } else {
        warn!(
            shift_id = shift.id,
            expected = %close.cash_expected,
            counted = %close.cash_real,
            diff = %close.diff,
            "Shift closed with cash difference"
        );
    }
    Ok(closed)
}

pub async fn get_shift(state: &AppState, shift_id: i64) -> ApiResult<Shift> {
    let mut unit = state.db.read().await?;
    Ok(unit.shifts().require(shift_id).await?)
}

// =============================================================================
// Payments
// =============================================================================

/// Settles the order's remaining balance with one method.
#[instrument(skip(state, caller, req), fields(order_id = req.order_id, method = %req.method))]
pub async fn pay_simple(
    state: &AppState,
    caller: &Principal,
    req: &SimplePaymentRequest,
) -> ApiResult<PaymentReceipt> {
    reject_mixed(req.method)?;

    let now = Utc::now();
    let mut unit = state.db.write().await?;
    require_open_shift(&mut unit, caller.id).await?;
    let mut order = unit.orders().require(req.order_id).await?;
    check_payable(&order)?;

    let due = order.balance();
    let change = match req.method {
        PaymentMethod::Cash => cash_change(req.amount_tendered, due)?,
        _ => Money::zero(),
    };
    let transaction = insert_transaction(
        &mut unit,
        order.id,
        caller.id,
        due,
        req.method,
        req.reference.as_deref(),
        now,
    )
    .await?;

    let account = settle(&mut unit, &mut order, caller.id, req.method, due, now).await?;
    unit.commit().await?;

    info!(
        order_id = order.id,
        invoice = %transaction.invoice_no,
        amount = %due,
        method = %req.method,
        "Payment processed"
    );
    Ok(PaymentReceipt {
        transaction,
        splits: Vec::new(),
        change,
        order,
        account,
    })
}

/// Settles the remaining balance across several methods.
///
/// ## Returns
/// * `Err(amount_mismatch)` - the parts do not add up to the balance
#[instrument(skip(state, caller, req), fields(order_id = req.order_id, parts = req.splits.len()))]
pub async fn pay_split(
    state: &AppState,
    caller: &Principal,
    req: &SplitPaymentRequest,
) -> ApiResult<PaymentReceipt> {
    let now = Utc::now();
    let mut unit = state.db.write().await?;
    require_open_shift(&mut unit, caller.id).await?;
    let mut order = unit.orders().require(req.order_id).await?;
    check_payable(&order)?;

    let due = order.balance();
    check_splits(&req.splits, due)?;
    let transaction = insert_transaction(
        &mut unit,
        order.id,
        caller.id,
        due,
        PaymentMethod::Mixed,
        None,
        now,
    )
    .await?;
    let mut splits = Vec::with_capacity(req.splits.len());
    for line in &req.splits {
        splits.push(unit.payments().insert_split(transaction.id, line).await?);
    }

    let account = settle(&mut unit, &mut order, caller.id, PaymentMethod::Mixed, due, now).await?;
    unit.commit().await?;

    info!(
        order_id = order.id,
        invoice = %transaction.invoice_no,
        amount = %due,
        parts = splits.len(),
        "Split payment processed"
    );
    Ok(PaymentReceipt {
        transaction,
        splits,
        change: Money::zero(),
        order,
        account,
    })
}

/// Pays for some units of some lines. The order becomes `partial` (its
/// table `settling`) until the last unit is paid.
#[instrument(skip(state, caller, req), fields(order_id = req.order_id, lines = req.lines.len()))]
pub async fn pay_items(
    state: &AppState,
    caller: &Principal,
    req: &ItemPaymentRequest,
) -> ApiResult<PaymentReceipt> {
    reject_mixed(req.method)?;
    if req.lines.is_empty() {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        }
        .into());
    }

    let now = Utc::now();
    let mut unit = state.db.write().await?;
    require_open_shift(&mut unit, caller.id).await?;
    let mut order = unit.orders().require(req.order_id).await?;
    check_payable(&order)?;
    let before = audit_fields(&order);

    let mut lines_amount = Money::zero();
    for line in &req.lines {
        let item = unit.orders().require_item(line.item_id).await?;
        if item.order_id != order.id {
            return Err(CoreError::not_found("order_item", line.item_id).into());
        }
        if line.qty < 1 || !unit.orders().mark_item_paid(item.id, line.qty).await? {
            return Err(ValidationError::OutOfRange {
                field: "qty".to_string(),
                min: 1,
                max: item.qty_unpaid(),
            }
            .into());
        }
        lines_amount += item.unit_price.multiply_quantity(line.qty);
    }

    let items = unit.orders().items(order.id).await?;
    let clears_order = items.iter().all(|i| i.qty_unpaid() == 0);
    let amount = item_charge(lines_amount, order.discount_pct, order.balance(), clears_order);
    let change = match req.method {
        PaymentMethod::Cash => cash_change(req.amount_tendered, amount)?,
        _ => Money::zero(),
    };
    let transaction = insert_transaction(
        &mut unit,
        order.id,
        caller.id,
        amount,
        req.method,
        req.reference.as_deref(),
        now,
    )
    .await?;

    order.paid_amount += amount;
    order.payment_state = payment_state_for(order.paid_amount, order.total_final);
    order.cashier_id = Some(caller.id);
    order.payment_method = Some(merged_method(order.payment_method, req.method));
    if order.payment_state == PaymentState::Paid {
        // Money covers the order even if units were left unmarked
        unit.orders().mark_all_paid(order.id).await?;
        order.paid_at = Some(now);
    }
    unit.orders().update(&order).await?;

    let (b, a) = sgir_core::history::changed_fields(&before, &audit_fields(&order));
    append_history(&mut unit, order.id, caller.id, HistoryKind::Payment, b, a, None, now).await?;
    let account = refresh_account(&mut unit, order.account_id, Some(caller.id), false, now).await?;
    unit.commit().await?;

    info!(
        order_id = order.id,
        invoice = %transaction.invoice_no,
        amount = %amount,
        payment_state = %order.payment_state,
        "Item payment processed"
    );
    Ok(PaymentReceipt {
        transaction,
        splits: Vec::new(),
        change,
        order,
        account,
    })
}

// =============================================================================
// Refunds
// =============================================================================

/// Returns money on a paid or partly paid order. Needs an authoriser's
/// secondary PIN; stock is not returned.
///
/// ## Returns
/// * `Err(refund_exceeds_paid)` - more than paid minus earlier refunds
#[instrument(skip(state, caller, req), fields(order_id = req.order_id, amount = %req.amount))]
pub async fn refund(state: &AppState, caller: &Principal, req: &RefundRequest) -> ApiResult<Refund> {
    reject_mixed(req.method)?;
    validate_reason(&req.reason)?;

    let now = Utc::now();
    let mut unit = state.db.write().await?;
    require_open_shift(&mut unit, caller.id).await?;
    let order = unit.orders().require(req.order_id).await?;
    let already = unit.payments().refunded_total(order.id).await?;
    check_refund(req.amount, order.paid_amount, already)?;
    let authoriser = verify_secondary_pin(&mut unit, &state.hasher, &req.secondary_pin).await?;

    let refund = unit
        .payments()
        .insert_refund(
            order.id,
            req.amount,
            req.method,
            req.reason.trim(),
            caller.id,
            authoriser.id,
            now,
        )
        .await?;
    append_history(
        &mut unit,
        order.id,
        caller.id,
        HistoryKind::Payment,
        json!({ "refunded": already }),
        json!({
            "refunded": already + req.amount,
            "refund_method": req.method,
            "authorised_by": authoriser.id,
        }),
        Some(req.reason.trim()),
        now,
    )
    .await?;
    unit.commit().await?;

    warn!(
        order_id = order.id,
        refund_id = refund.id,
        amount = %req.amount,
        authoriser = authoriser.id,
        "Refund issued"
    );
    Ok(refund)
}

// =============================================================================
// Helpers
// =============================================================================

fn reject_mixed(method: PaymentMethod) -> ApiResult<()> {
    if method == PaymentMethod::Mixed {
        return Err(ValidationError::NotAllowed {
            field: "method".to_string(),
            allowed: PaymentMethod::ALL
                .iter()
                .filter(|m| **m != PaymentMethod::Mixed)
                .map(|m| m.to_string())
                .collect(),
        }
        .into());
    }
    Ok(())
}

async fn require_open_shift(unit: &mut WriteUnit, cashier_id: i64) -> ApiResult<Shift> {
    unit.shifts()
        .find_open(cashier_id, business_date())
        .await?
        .ok_or_else(|| CoreError::ShiftNotOpen.into())
}

/// A method recorded on top of an earlier, different one becomes `mixed`.
fn merged_method(previous: Option<PaymentMethod>, method: PaymentMethod) -> PaymentMethod {
    match previous {
        Some(p) if p != method => PaymentMethod::Mixed,
        _ => method,
    }
}

/// Inserts a processed transaction under a fresh invoice number, retrying
/// on the rare collision.
async fn insert_transaction(
    unit: &mut WriteUnit,
    order_id: i64,
    cashier_id: i64,
    amount: Money,
    method: PaymentMethod,
    reference: Option<&str>,
    now: DateTime<Utc>,
) -> ApiResult<Transaction> {
    for attempt in 1..=INVOICE_ATTEMPTS {
        let invoice = invoice_number(now.date_naive(), Uuid::new_v4());
        match unit
            .payments()
            .insert_transaction(order_id, cashier_id, amount, method, &invoice, reference, now)
            .await
        {
            Ok(transaction) => return Ok(transaction),
            Err(e) if e.is_unique_on("transactions.invoice_no") => {
                warn!(attempt, invoice = %invoice, "Invoice number collision");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(ApiError::internal("invoice numbers exhausted"))
}

/// Marks the order fully paid and recalculates its account.
async fn settle(
    unit: &mut WriteUnit,
    order: &mut Order,
    cashier_id: i64,
    method: PaymentMethod,
    amount: Money,
    now: DateTime<Utc>,
) -> ApiResult<TableAccount> {
    let before = audit_fields(order);

    unit.orders().mark_all_paid(order.id).await?;
    order.paid_amount = order.total_final;
    order.payment_state = PaymentState::Paid;
    order.cashier_id = Some(cashier_id);
    order.paid_at = Some(now);
    order.payment_method = Some(if order.paid_amount == amount {
        method
    } else {
        merged_method(order.payment_method, method)
    });
    unit.orders().update(order).await?;

    let (b, a) = sgir_core::history::changed_fields(&before, &audit_fields(order));
    append_history(unit, order.id, cashier_id, HistoryKind::Payment, b, a, None, now).await?;
    refresh_account(unit, order.account_id, Some(cashier_id), false, now).await
}
