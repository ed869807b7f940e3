//! Repository behaviour against a migrated in-memory database.

use chrono::{NaiveDate, Utc};
use serde_json::json;

use sgir_core::cash::SplitLine;
use sgir_core::{
    AlertKind, AlertState, Area, HistoryKind, Money, MovementKind, PaymentMethod, Qty, Role,
    ShiftTurn, StockTarget, SupplyUnit, TableStatus,
};
use sgir_db::repository::{NewHistoryEntry, NewMovement, NewOrder, NewPrincipal, NewProduct, NewSupply};
use sgir_db::{Database, DbConfig, DbError, Repositories};

async fn db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

fn cashier(username: &str) -> NewPrincipal {
    NewPrincipal {
        username: username.to_string(),
        display_name: username.to_string(),
        role: Role::Cashier,
        password_hash: None,
        pin_hash: None,
        secondary_pin_hash: None,
        areas: vec![Area::Cash],
    }
}

fn product(name: &str, stock: i64, min: i64) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        category: None,
        price: Money::from_cents(1000),
        tracks_inventory: true,
        stock_on_hand: stock,
        stock_min: min,
        is_manufactured: false,
        image: None,
    }
}

#[tokio::test]
async fn conditional_decrement_never_goes_negative() {
    let db = db().await;
    let mut unit = db.write().await.unwrap();
    let p = unit.products().insert(&product("Lemonade", 2, 0)).await.unwrap();

    assert_eq!(unit.products().decrement_stock(p.id, 2).await.unwrap(), Some(0));
    assert_eq!(unit.products().decrement_stock(p.id, 1).await.unwrap(), None);
    assert_eq!(unit.products().increment_stock(p.id, 3).await.unwrap(), 3);

    let s = unit
        .supplies()
        .insert(&NewSupply {
            name: "Flour".to_string(),
            category: None,
            unit: SupplyUnit::Kg,
            stock_on_hand: Qty::from_milli(500),
            stock_min: Qty::zero(),
        })
        .await
        .unwrap();
    assert_eq!(
        unit.supplies().decrement_stock(s.id, Qty::from_milli(600)).await.unwrap(),
        None
    );
    assert_eq!(
        unit.supplies().decrement_stock(s.id, Qty::from_milli(200)).await.unwrap(),
        Some(Qty::from_milli(300))
    );
    unit.commit().await.unwrap();
}

#[tokio::test]
async fn one_open_account_per_table() {
    let db = db().await;
    let mut unit = db.write().await.unwrap();
    unit.tables().insert(1, 4, 0, 0).await.unwrap();

    let now = Utc::now();
    let first = unit.accounts().open(1, None, now).await.unwrap();
    let second = unit.accounts().open(1, None, now).await;
    assert!(matches!(second, Err(DbError::UniqueViolation { .. })));

    let found = unit.accounts().find_open(1).await.unwrap().unwrap();
    assert_eq!(found.id, first.id);
}

#[tokio::test]
async fn combine_and_uncombine_tables() {
    let db = db().await;
    let mut unit = db.write().await.unwrap();
    unit.tables().insert(2, 4, 0, 0).await.unwrap();
    unit.tables().insert(5, 2, 1, 0).await.unwrap();

    unit.tables().combine(&[2, 5], 6, TableStatus::Occupied).await.unwrap();
    let t5 = unit.tables().require(5).await.unwrap();
    assert!(t5.combined);
    assert_eq!(t5.combined_with, vec![2, 5]);
    assert_eq!(t5.effective_capacity(), 6);
    assert_eq!(unit.tables().group_of(2).await.unwrap(), vec![2, 5]);

    unit.tables().uncombine(&[2, 5]).await.unwrap();
    let t2 = unit.tables().require(2).await.unwrap();
    assert!(!t2.combined);
    assert!(t2.combined_with.is_empty());
    assert_eq!(t2.status, TableStatus::Occupied);
}

#[tokio::test]
async fn alerts_raise_refresh_and_auto_resolve() {
    let db = db().await;
    let mut unit = db.write().await.unwrap();
    let p = unit.products().insert(&product("Soda", 10, 3)).await.unwrap();
    let now = Utc::now();

    unit.alerts().evaluate(StockTarget::Product, p.id, 2, 3, now).await.unwrap();
    unit.alerts().evaluate(StockTarget::Product, p.id, 1, 3, now).await.unwrap();
    let active = unit.alerts().list_views(true).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].alert.kind, AlertKind::Low);
    assert_eq!(active[0].alert.observed_stock, 1);
    assert_eq!(active[0].target_name, "Soda");

    unit.alerts().evaluate(StockTarget::Product, p.id, 0, 3, now).await.unwrap();
    let active = unit.alerts().list_views(true).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].alert.kind, AlertKind::Out);

    unit.alerts().evaluate(StockTarget::Product, p.id, 20, 3, now).await.unwrap();
    assert!(unit.alerts().list_views(true).await.unwrap().is_empty());
    let all = unit.alerts().list_views(false).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all
        .iter()
        .all(|a| a.alert.state == AlertState::Resolved && a.alert.note == "auto"));
}

#[tokio::test]
async fn history_is_append_only() {
    let db = db().await;
    let mut unit = db.write().await.unwrap();
    let staff = unit.principals().insert(&cashier("ana"), Utc::now()).await.unwrap();
    unit.tables().insert(1, 4, 0, 0).await.unwrap();
    let account = unit.accounts().open(1, Some(staff.id), Utc::now()).await.unwrap();
    let order = unit
        .orders()
        .insert(&NewOrder {
            table_number: 1,
            account_id: account.id,
            waiter_id: Some(staff.id),
            guest_count: 2,
            notes: String::new(),
            opened_at: Utc::now(),
        })
        .await
        .unwrap();

    let entry = NewHistoryEntry::for_order(
        order.id,
        staff.id,
        HistoryKind::ApplyDiscount,
        json!({"discount_pct": 0}),
        json!({"discount_pct": 1000}),
    );
    unit.history().append(&entry, Utc::now()).await.unwrap();

    let entries = unit.history().for_order(order.id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].after, json!({"discount_pct": 1000}));

    let update = sqlx::query("UPDATE history_entries SET reason = 'x'")
        .execute(unit.conn())
        .await
        .map_err(DbError::from);
    assert!(matches!(update, Err(DbError::ConstraintViolation { .. })));

    let delete = sqlx::query("DELETE FROM history_entries")
        .execute(unit.conn())
        .await
        .map_err(DbError::from);
    assert!(matches!(delete, Err(DbError::ConstraintViolation { .. })));
}

#[tokio::test]
async fn one_open_shift_per_cashier_and_date() {
    let db = db().await;
    let mut unit = db.write().await.unwrap();
    let ana = unit.principals().insert(&cashier("ana"), Utc::now()).await.unwrap();
    let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

    assert!(!unit.shifts().any_open_on(date).await.unwrap());
    unit.shifts()
        .open(ana.id, date, ShiftTurn::Full, Money::from_cents(5000), "", Utc::now())
        .await
        .unwrap();
    let again = unit
        .shifts()
        .open(ana.id, date, ShiftTurn::Morning, Money::zero(), "", Utc::now())
        .await;
    assert!(matches!(&again, Err(e) if e.is_unique_on("shifts.cashier_id")));
    assert!(unit.shifts().any_open_on(date).await.unwrap());
}

#[tokio::test]
async fn ledger_expands_mixed_transactions() {
    let db = db().await;
    let mut unit = db.write().await.unwrap();
    let ana = unit.principals().insert(&cashier("ana"), Utc::now()).await.unwrap();
    unit.tables().insert(1, 4, 0, 0).await.unwrap();
    let account = unit.accounts().open(1, None, Utc::now()).await.unwrap();
    let order = unit
        .orders()
        .insert(&NewOrder {
            table_number: 1,
            account_id: account.id,
            waiter_id: None,
            guest_count: 1,
            notes: String::new(),
            opened_at: Utc::now(),
        })
        .await
        .unwrap();

    let from = Utc::now();
    unit.payments()
        .insert_transaction(order.id, ana.id, Money::from_cents(1000), PaymentMethod::Cash, "FACT-1", None, Utc::now())
        .await
        .unwrap();
    let mixed = unit
        .payments()
        .insert_transaction(order.id, ana.id, Money::from_cents(3000), PaymentMethod::Mixed, "FACT-2", None, Utc::now())
        .await
        .unwrap();
    for (method, cents) in [(PaymentMethod::Cash, 2000), (PaymentMethod::Card, 1000)] {
        unit.payments()
            .insert_split(
                mixed.id,
                &SplitLine {
                    method,
                    amount: Money::from_cents(cents),
                    reference: None,
                },
            )
            .await
            .unwrap();
    }

    let duplicate = unit
        .payments()
        .insert_transaction(order.id, ana.id, Money::from_cents(1), PaymentMethod::Card, "FACT-1", None, Utc::now())
        .await;
    assert!(matches!(&duplicate, Err(e) if e.is_unique_on("transactions.invoice_no")));

    let mut ledger = unit.payments().ledger_payments(ana.id, from, Utc::now()).await.unwrap();
    ledger.sort_by_key(|(m, a)| (m.as_str(), a.cents()));
    assert_eq!(
        ledger,
        vec![
            (PaymentMethod::Card, Money::from_cents(1000)),
            (PaymentMethod::Cash, Money::from_cents(1000)),
            (PaymentMethod::Cash, Money::from_cents(2000)),
        ]
    );
}

#[tokio::test]
async fn qr_token_consumes_once() {
    let db = db().await;
    let mut unit = db.write().await.unwrap();
    let ana = unit.principals().insert(&cashier("ana"), Utc::now()).await.unwrap();
    let now = Utc::now();

    let token = sgir_core::QrToken {
        token: "tok-1".to_string(),
        principal_id: ana.id,
        issued_at: now,
        expires_at: now + chrono::Duration::hours(1),
        issuer_address: None,
        state: sgir_core::QrTokenState::Issued,
        consumed_at: None,
    };
    unit.principals().rotate_qr_token(&token).await.unwrap();

    assert!(unit.principals().consume_qr_token("tok-1", now).await.unwrap());
    assert!(!unit.principals().consume_qr_token("tok-1", now).await.unwrap());

    let rotated = sgir_core::QrToken {
        token: "tok-2".to_string(),
        ..token
    };
    unit.principals().rotate_qr_token(&rotated).await.unwrap();
    let next = sgir_core::QrToken {
        token: "tok-3".to_string(),
        ..rotated
    };
    unit.principals().rotate_qr_token(&next).await.unwrap();
    let old = unit.principals().get_qr_token("tok-2").await.unwrap().unwrap();
    assert_eq!(old.state, sgir_core::QrTokenState::Invalidated);
}

#[tokio::test]
async fn movements_net_out() {
    let db = db().await;
    let mut unit = db.write().await.unwrap();
    let now = Utc::now();
    unit.movements()
        .insert(&NewMovement::new(StockTarget::Product, 7, MovementKind::Sale, -2, 3), now)
        .await
        .unwrap();
    unit.movements()
        .insert(
            &NewMovement::new(StockTarget::Product, 7, MovementKind::SaleReturn, 2, 5).note("cancel"),
            now,
        )
        .await
        .unwrap();
    assert_eq!(unit.movements().net_delta(StockTarget::Product, 7).await.unwrap(), 0);
    let listed = unit.movements().for_target(StockTarget::Product, 7, 10).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].kind, MovementKind::SaleReturn);
}
