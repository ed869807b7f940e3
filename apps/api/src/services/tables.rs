//! # Table Service
//!
//! Seating, table groups and table accounts.
//!
//! ## Table Status Effects
//! ```text
//! assign ────────────────────► reserved (combined when more than one table)
//! order placed ──────────────► occupied
//! partial payment ───────────► settling
//! account closed / in_debt ──► group dissolved, every member available
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use sgir_core::table::{find_assignment, plan_combine, recalculate_account, Assignment};
use sgir_core::validation::{validate_capacity, validate_guest_count, validate_notes};
use sgir_core::{
    AccountStatus, CoreError, Order, OrderState, PaymentState, Table, TableAccount, TableStatus,
    ValidationError,
};
use sgir_db::{Repositories, WriteUnit};

use crate::error::ApiResult;
use crate::services::identity::verify_secondary_pin;
use crate::AppState;

// =============================================================================
// Requests / Views
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct NewTableRequest {
    pub number: i64,
    pub capacity: i64,
    #[serde(default)]
    pub map_x: i64,
    #[serde(default)]
    pub map_y: i64,
}

#[derive(Debug, Deserialize)]
pub struct DebtRequest {
    pub secondary_pin: String,
    #[serde(default)]
    pub note: String,
}

/// An account with its orders.
#[derive(Debug, Serialize)]
pub struct AccountView {
    #[serde(flatten)]
    pub account: TableAccount,
    pub orders: Vec<Order>,
}

// =============================================================================
// Tables
// =============================================================================

#[instrument(skip(state, req), fields(table = req.number))]
pub async fn create_table(state: &AppState, req: &NewTableRequest) -> ApiResult<Table> {
    if req.number < 1 {
        return Err(ValidationError::MustBePositive {
            field: "number".to_string(),
        }
        .into());
    }
    validate_capacity(req.capacity)?;

    let mut unit = state.db.write().await?;
    let table = unit
        .tables()
        .insert(req.number, req.capacity, req.map_x, req.map_y)
        .await?;
    unit.commit().await?;

    info!(table = table.number, capacity = table.capacity, "Table created");
    Ok(table)
}

pub async fn list_tables(state: &AppState) -> ApiResult<Vec<Table>> {
    let mut unit = state.db.read().await?;
    Ok(unit.tables().list().await?)
}

/// Picks the best seating for `guests` and holds it as `reserved`.
///
/// ## Returns
/// * `Err(no_table_available)` - no single table, pair or triple fits
#[instrument(skip(state))]
pub async fn assign(state: &AppState, guests: i64) -> ApiResult<Assignment> {
    validate_guest_count(guests)?;

    let mut unit = state.db.write().await?;
    let tables = unit.tables().list().await?;
    let assignment =
        find_assignment(&tables, guests).ok_or(CoreError::NoTableAvailable { guests })?;

    match &assignment {
        Assignment::Single { table } => {
            unit.tables()
                .set_status(&[*table], TableStatus::Reserved)
                .await?;
        }
        Assignment::Combined { tables: numbers } => {
            let members: Vec<Table> = tables
                .iter()
                .filter(|t| numbers.contains(&t.number))
                .cloned()
                .collect();
            let plan = plan_combine(&members)?;
            unit.tables()
                .combine(&plan.members, plan.capacity, TableStatus::Reserved)
                .await?;
        }
    }
    unit.commit().await?;

    info!(guests, tables = ?assignment.numbers(), "Seating assigned");
    Ok(assignment)
}

/// Merges the listed tables (and any group they already belong to).
///
/// At most one member may carry an open account; the group takes the
/// busiest member status.
#[instrument(skip(state))]
pub async fn combine(state: &AppState, numbers: &[i64]) -> ApiResult<Vec<Table>> {
    let mut unit = state.db.write().await?;

    let mut members: Vec<i64> = Vec::new();
    for number in numbers {
        for member in unit.tables().group_of(*number).await? {
            if !members.contains(&member) {
                members.push(member);
            }
        }
    }
    let mut tables = Vec::with_capacity(members.len());
    for member in &members {
        tables.push(unit.tables().require(*member).await?);
    }
    let plan = plan_combine(&tables)?;

    let mut seated = Vec::new();
    for table in &tables {
        if unit.accounts().find_open(table.number).await?.is_some() {
            seated.push(table);
        }
    }
    if let Some(second) = seated.get(1) {
        return Err(CoreError::TableNotAvailable {
            number: second.number,
            status: second.status.to_string(),
        }
        .into());
    }

    let status = tables
        .iter()
        .map(|t| t.status)
        .max_by_key(|s| status_rank(*s))
        .unwrap_or(TableStatus::Available);
    unit.tables()
        .combine(&plan.members, plan.capacity, status)
        .await?;

    let mut combined = Vec::with_capacity(plan.members.len());
    for member in &plan.members {
        combined.push(unit.tables().require(*member).await?);
    }
    unit.commit().await?;

    info!(members = ?plan.members, capacity = plan.capacity, "Tables combined");
    Ok(combined)
}

/// Dissolves the group of `number`. Members that neither hold the group's
/// open account nor carry one of its unpaid orders return to `available`.
#[instrument(skip(state))]
pub async fn uncombine(state: &AppState, number: i64) -> ApiResult<Vec<Table>> {
    let mut unit = state.db.write().await?;
    let group = unit.tables().group_of(number).await?;

    let mut held: Vec<i64> = Vec::new();
    if let Some(account) = find_seating_account(&mut unit, number).await? {
        held.push(account.table_number);
        for order in unit.orders().for_account(account.id).await? {
            if is_unpaid_live(&order) && !held.contains(&order.table_number) {
                held.push(order.table_number);
            }
        }
    }
    unit.tables().uncombine(&group).await?;

    let mut tables = Vec::with_capacity(group.len());
    for member in &group {
        if !held.contains(member) {
            unit.tables()
                .set_status(&[*member], TableStatus::Available)
                .await?;
        }
        tables.push(unit.tables().require(*member).await?);
    }
    unit.commit().await?;

    info!(members = ?group, "Table group dissolved");
    Ok(tables)
}

/// Frees the table (and its group). An open account is closed first; it
/// must not hold unpaid orders.
#[instrument(skip(state))]
pub async fn release(state: &AppState, number: i64, actor: i64) -> ApiResult<Table> {
    let now = Utc::now();
    let mut unit = state.db.write().await?;
    let group = unit.tables().group_of(number).await?;

    for member in &group {
        let Some(account) = unit.accounts().find_open(*member).await? else {
            continue;
        };
        let orders = unit.orders().for_account(account.id).await?;
        if orders.iter().any(is_unpaid_live) {
            return Err(CoreError::AccountHasUnpaidOrders {
                account_id: account.id,
            }
            .into());
        }
        refresh_account(&mut unit, account.id, Some(actor), true, now).await?;
    }
    release_group(&mut unit, number).await?;

    let table = unit.tables().require(number).await?;
    unit.commit().await?;

    info!(table = number, "Table released");
    Ok(table)
}

// =============================================================================
// Accounts
// =============================================================================

/// Returns the open account of a table's seating, opening one if none
/// exists. Members of a combined group share one account.
#[instrument(skip(state))]
pub async fn open_account(state: &AppState, number: i64, actor: i64) -> ApiResult<TableAccount> {
    let mut unit = state.db.write().await?;
    unit.tables().require(number).await?;

    if let Some(account) = find_seating_account(&mut unit, number).await? {
        return Ok(account);
    }
    let account = unit.accounts().open(number, Some(actor), Utc::now()).await?;
    unit.commit().await?;

    info!(table = number, account_id = account.id, "Table account opened");
    Ok(account)
}

pub async fn get_account(state: &AppState, account_id: i64) -> ApiResult<AccountView> {
    let mut unit = state.db.read().await?;
    let account = unit.accounts().require(account_id).await?;
    let orders = unit.orders().for_account(account_id).await?;
    Ok(AccountView { account, orders })
}

#[instrument(skip(state))]
pub async fn recalculate(state: &AppState, account_id: i64, actor: i64) -> ApiResult<TableAccount> {
    let mut unit = state.db.write().await?;
    let account = refresh_account(&mut unit, account_id, Some(actor), false, Utc::now()).await?;
    unit.commit().await?;
    Ok(account)
}

/// Accepts an open account's unpaid balance as debt (secondary PIN).
/// The account moves to `in_debt` and its table is freed.
#[instrument(skip(state, req))]
pub async fn authorize_debt(
    state: &AppState,
    account_id: i64,
    req: &DebtRequest,
    actor: i64,
) -> ApiResult<TableAccount> {
    validate_notes(&req.note)?;

    let mut unit = state.db.write().await?;
    let account = unit.accounts().require(account_id).await?;
    if account.status != AccountStatus::Open {
        return Err(CoreError::InvalidTransition {
            entity: "table_account",
            from: account.status.to_string(),
            to: AccountStatus::InDebt.to_string(),
        }
        .into());
    }

    let authoriser = verify_secondary_pin(&mut unit, &state.hasher, &req.secondary_pin).await?;
    let note = if req.note.trim().is_empty() {
        format!("debt authorised by {}", authoriser.username)
    } else {
        format!("debt authorised by {}: {}", authoriser.username, req.note.trim())
    };
    unit.accounts().authorize_debt(account_id, &note).await?;
    let account = refresh_account(&mut unit, account_id, Some(actor), false, Utc::now()).await?;
    unit.commit().await?;

    warn!(
        account_id,
        authoriser = authoriser.id,
        status = %account.status,
        "Table account debt authorised"
    );
    Ok(account)
}

// =============================================================================
// Shared Helpers
// =============================================================================

pub(crate) fn is_unpaid_live(order: &Order) -> bool {
    order.state != OrderState::Cancelled && order.payment_state != PaymentState::Paid
}

fn status_rank(status: TableStatus) -> u8 {
    match status {
        TableStatus::Available => 0,
        TableStatus::Reserved => 1,
        TableStatus::Occupied => 2,
        TableStatus::Settling => 3,
    }
}

/// Recomputes an account from its orders and applies the table effects of
/// a status change.
pub(crate) async fn refresh_account(
    unit: &mut WriteUnit,
    account_id: i64,
    actor: Option<i64>,
    release_when_empty: bool,
    now: DateTime<Utc>,
) -> ApiResult<TableAccount> {
    let account = unit.accounts().require(account_id).await?;
    let orders = unit.orders().for_account(account_id).await?;
    let recalc = recalculate_account(
        account.status,
        account.debt_authorized,
        &orders,
        release_when_empty,
    );
    unit.accounts()
        .apply_recalc(account_id, &recalc, actor, now)
        .await?;

    if account.status == AccountStatus::Open {
        match recalc.status {
            AccountStatus::Closed | AccountStatus::InDebt => {
                if find_seating_account(unit, account.table_number).await?.is_none() {
                    release_group(unit, account.table_number).await?;
                } else {
                    warn!(
                        account_id,
                        table = account.table_number,
                        "Table group still holds an open account; not released"
                    );
                }
            }
            AccountStatus::Open if recalc.settling => {
                let group = unit.tables().group_of(account.table_number).await?;
                unit.tables().set_status(&group, TableStatus::Settling).await?;
            }
            AccountStatus::Open => {}
        }
    }
    if recalc.status != account.status {
        info!(
            account_id,
            table = account.table_number,
            from = %account.status,
            to = %recalc.status,
            "Table account status changed"
        );
    }

    Ok(unit.accounts().require(account_id).await?)
}

/// The open account of the seating `number` belongs to: its own, or the
/// one held by any member of its group.
pub(crate) async fn find_seating_account(
    unit: &mut WriteUnit,
    number: i64,
) -> ApiResult<Option<TableAccount>> {
    for member in unit.tables().group_of(number).await? {
        if let Some(account) = unit.accounts().find_open(member).await? {
            return Ok(Some(account));
        }
    }
    Ok(None)
}

/// The seating's open account, opened on `number` when there is none.
pub(crate) async fn seating_account(
    unit: &mut WriteUnit,
    number: i64,
    opener: i64,
    now: DateTime<Utc>,
) -> ApiResult<TableAccount> {
    match find_seating_account(unit, number).await? {
        Some(account) => Ok(account),
        None => Ok(unit.accounts().open(number, Some(opener), now).await?),
    }
}

/// Marks the group of `number` as seated, unless it is already settling.
pub(crate) async fn occupy_group(unit: &mut WriteUnit, number: i64) -> ApiResult<()> {
    let table = unit.tables().require(number).await?;
    if table.status != TableStatus::Settling {
        let group = unit.tables().group_of(number).await?;
        unit.tables().set_status(&group, TableStatus::Occupied).await?;
    }
    Ok(())
}

/// Dissolves the group of `number` and makes every member available.
pub(crate) async fn release_group(unit: &mut WriteUnit, number: i64) -> ApiResult<()> {
    let group = unit.tables().group_of(number).await?;
    if group.len() > 1 {
        unit.tables().uncombine(&group).await?;
    }
    unit.tables().set_status(&group, TableStatus::Available).await?;
    Ok(())
}
