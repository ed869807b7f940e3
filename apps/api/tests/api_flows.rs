//! End-to-end flows through the router.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{json, Value};

use sgir_core::Role;

use common::{floor, TestApp, CASHIER_PIN, SECONDARY_PIN};

async fn product_stock(app: &TestApp, token: &str, product_id: i64) -> i64 {
    let (_, products) = app.get("/products", token).await;
    products
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["id"] == product_id)
        .unwrap()["stock_on_hand"]
        .as_i64()
        .unwrap()
}

async fn supply_stock(app: &TestApp, token: &str, supply_id: i64) -> i64 {
    let (_, supplies) = app.get("/supplies", token).await;
    supplies
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["id"] == supply_id)
        .unwrap()["stock_on_hand"]
        .as_i64()
        .unwrap()
}

fn order_body(product_id: i64, qty: i64) -> Value {
    json!({
        "table_number": 1,
        "guest_count": 2,
        "lines": [{ "product_id": product_id, "qty": qty }],
    })
}

fn order_on(table: i64, product_id: i64, qty: i64) -> Value {
    json!({
        "table_number": table,
        "guest_count": 2,
        "lines": [{ "product_id": product_id, "qty": qty }],
    })
}

async fn add_table(app: &TestApp, manager: &str, number: i64, capacity: i64) {
    let (status, body) = app
        .post("/tables", manager, json!({ "number": number, "capacity": capacity }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
}

async fn table(app: &TestApp, token: &str, number: i64) -> Value {
    let (_, tables) = app.get("/tables", token).await;
    tables
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["number"] == number)
        .unwrap()
        .clone()
}

async fn pay_card(app: &TestApp, cashier: &str, order_id: &Value) -> Value {
    let (status, receipt) = app
        .post(
            "/payments/simple",
            cashier,
            json!({ "order_id": order_id, "method": "card" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{receipt}");
    receipt
}

// =============================================================================
// Orders and payments
// =============================================================================

#[tokio::test]
async fn cash_sale_takes_stock_and_frees_the_table() {
    let app = TestApp::new().await;
    let f = floor(&app, 10).await;

    let (status, order) = app.post("/orders", &f.waiter, order_body(f.product_id, 2)).await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(order["state"], "created");
    assert_eq!(order["payment_state"], "pending");
    assert_eq!(order["total_final"], 500);
    assert_eq!(order["items"].as_array().unwrap().len(), 1);
    assert_eq!(product_stock(&app, &f.manager, f.product_id).await, 8);

    let (_, tables) = app.get("/tables", &f.manager).await;
    assert_eq!(tables[0]["status"], "occupied");

    let (status, receipt) = app
        .post(
            "/payments/simple",
            &f.cashier,
            json!({ "order_id": order["id"], "method": "cash", "amount_tendered": 1000 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{receipt}");
    assert_eq!(receipt["change"], 500);
    assert_eq!(receipt["order"]["payment_state"], "paid");
    assert_eq!(receipt["order"]["payment_method"], "cash");
    assert_eq!(receipt["account"]["status"], "closed");
    assert!(receipt["transaction"]["invoice_no"]
        .as_str()
        .unwrap()
        .starts_with("FACT-"));

    // Payment does not touch stock a second time
    assert_eq!(product_stock(&app, &f.manager, f.product_id).await, 8);

    let (_, tables) = app.get("/tables", &f.manager).await;
    assert_eq!(tables[0]["status"], "available");

    let (status, again) = app
        .post(
            "/payments/simple",
            &f.cashier,
            json!({ "order_id": order["id"], "method": "card" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(again["error"], "payment_already_done");
}

#[tokio::test]
async fn shortfall_lists_the_line_and_leaves_stock_alone() {
    let app = TestApp::new().await;
    let f = floor(&app, 1).await;

    let (status, body) = app.post("/orders", &f.cashier, order_body(f.product_id, 4)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "insufficient_stock");
    let shortfall = &body["detail"]["shortfalls"][0];
    assert_eq!(shortfall["product"], f.product_id);
    assert_eq!(shortfall["requested"], 4);
    assert_eq!(shortfall["available"], 1);

    assert_eq!(product_stock(&app, &f.manager, f.product_id).await, 1);
    let (_, tables) = app.get("/tables", &f.manager).await;
    assert_eq!(tables[0]["status"], "available");
}

#[tokio::test]
async fn split_payment_must_match_the_balance() {
    let app = TestApp::new().await;
    let f = floor(&app, 10).await;
    let (_, order) = app.post("/orders", &f.waiter, order_body(f.product_id, 4)).await;

    let (status, body) = app
        .post(
            "/payments/split",
            &f.cashier,
            json!({
                "order_id": order["id"],
                "splits": [
                    { "method": "cash", "amount": 500 },
                    { "method": "card", "amount": 400 },
                ],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "amount_mismatch");
    assert_eq!(body["detail"]["expected"], 1000);
    assert_eq!(body["detail"]["got"], 900);

    let (status, receipt) = app
        .post(
            "/payments/split",
            &f.cashier,
            json!({
                "order_id": order["id"],
                "splits": [
                    { "method": "cash", "amount": 600 },
                    { "method": "card", "amount": 400, "reference": "AUTH-77" },
                ],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{receipt}");
    assert_eq!(receipt["splits"].as_array().unwrap().len(), 2);
    assert_eq!(receipt["order"]["payment_method"], "mixed");
    assert_eq!(receipt["order"]["payment_state"], "paid");
}

#[tokio::test]
async fn payment_needs_an_open_shift() {
    let app = TestApp::new().await;
    let f = floor(&app, 10).await;
    let (_, order) = app.post("/orders", &f.cashier, order_body(f.product_id, 1)).await;

    let (status, _) = app
        .post("/shifts/close", &f.cashier, json!({ "cash_real": 10000 }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post(
            "/payments/simple",
            &f.cashier,
            json!({ "order_id": order["id"], "method": "card" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "shift_not_open");
}

#[tokio::test]
async fn cancel_returns_the_stock() {
    let app = TestApp::new().await;
    let f = floor(&app, 10).await;

    let (_, order) = app.post("/orders", &f.waiter, order_body(f.product_id, 3)).await;
    assert_eq!(product_stock(&app, &f.manager, f.product_id).await, 7);

    let (status, cancelled) = app
        .post(
            &format!("/orders/{}/cancel", order["id"]),
            &f.waiter,
            json!({ "reason": "guest left" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{cancelled}");
    assert_eq!(cancelled["state"], "cancelled");
    assert_eq!(product_stock(&app, &f.manager, f.product_id).await, 10);
    assert_eq!(table(&app, &f.manager, 1).await["status"], "available");

    let (_, account) = app
        .get(&format!("/accounts/{}", order["account_id"]), &f.manager)
        .await;
    assert_eq!(account["status"], "closed");

    // Terminal
    let (status, body) = app
        .post(
            &format!("/orders/{}/cancel", order["id"]),
            &f.waiter,
            json!({ "reason": "again" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_transition");
}

#[tokio::test]
async fn line_changes_move_only_the_delta() {
    let app = TestApp::new().await;
    let f = floor(&app, 10).await;
    let (_, water) = app
        .post(
            "/products",
            &f.manager,
            json!({ "name": "Water", "price": 200, "stock_on_hand": 5 }),
        )
        .await;
    let water_id = water["id"].as_i64().unwrap();

    let (_, order) = app.post("/orders", &f.waiter, order_body(f.product_id, 2)).await;
    let order_id = order["id"].as_i64().unwrap();
    let cola_item = order["items"][0]["id"].as_i64().unwrap();
    assert_eq!(product_stock(&app, &f.manager, f.product_id).await, 8);

    // Same product merges into its line
    let (status, detail) = app
        .post(
            &format!("/orders/{order_id}/items"),
            &f.waiter,
            json!({ "product_id": f.product_id, "qty": 3 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{detail}");
    assert_eq!(detail["items"].as_array().unwrap().len(), 1);
    assert_eq!(detail["items"][0]["qty_total"], 5);
    assert_eq!(detail["total_final"], 1250);
    assert_eq!(product_stock(&app, &f.manager, f.product_id).await, 5);

    let (status, detail) = app
        .call(
            Method::PATCH,
            &format!("/orders/{order_id}/items/{cola_item}"),
            Some(&f.waiter),
            Some(json!({ "qty": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{detail}");
    assert_eq!(detail["items"][0]["qty_total"], 1);
    assert_eq!(product_stock(&app, &f.manager, f.product_id).await, 9);

    let (_, detail) = app
        .post(
            &format!("/orders/{order_id}/items"),
            &f.waiter,
            json!({ "product_id": water_id, "qty": 2 }),
        )
        .await;
    assert_eq!(detail["items"].as_array().unwrap().len(), 2);
    assert_eq!(product_stock(&app, &f.manager, water_id).await, 3);
    let water_item = detail["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|i| i["product_id"] == water_id)
        .unwrap()["id"]
        .as_i64()
        .unwrap();

    let (status, detail) = app
        .call(
            Method::DELETE,
            &format!("/orders/{order_id}/items/{water_item}"),
            Some(&f.waiter),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{detail}");
    assert_eq!(detail["items"].as_array().unwrap().len(), 1);
    assert_eq!(detail["total_final"], 250);
    assert_eq!(product_stock(&app, &f.manager, water_id).await, 5);

    // The sole remaining line stays
    let (status, body) = app
        .call(
            Method::DELETE,
            &format!("/orders/{order_id}/items/{cola_item}"),
            Some(&f.waiter),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "last_item");
    assert_eq!(product_stock(&app, &f.manager, f.product_id).await, 9);

    let (_, history) = app
        .get(&format!("/orders/{order_id}/history"), &f.manager)
        .await;
    assert!(history.as_array().unwrap().len() >= 5);
}

#[tokio::test]
async fn discount_back_to_zero_restores_the_total() {
    let app = TestApp::new().await;
    let f = floor(&app, 10).await;
    let (_, order) = app.post("/orders", &f.waiter, order_body(f.product_id, 4)).await;
    let uri = format!("/orders/{}/discount", order["id"]);

    let (status, discounted) = app
        .post(&uri, &f.manager, json!({ "discount_pct": 1000 }))
        .await;
    assert_eq!(status, StatusCode::OK, "{discounted}");
    assert_eq!(discounted["discount"], 100);
    assert_eq!(discounted["total_final"], 900);

    let (_, tipped) = app
        .post(&format!("/orders/{}/tip", order["id"]), &f.manager, json!({ "tip": 50 }))
        .await;
    assert_eq!(tipped["total_final"], 950);

    let (_, restored) = app.post(&uri, &f.manager, json!({ "discount_pct": 0 })).await;
    assert_eq!(restored["discount"], 0);
    assert_eq!(restored["total_final"], 1050);

    let (status, body) = app.post(&uri, &f.manager, json!({ "discount_pct": 10001 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
}

#[tokio::test]
async fn reassign_frees_the_source_table() {
    let app = TestApp::new().await;
    let f = floor(&app, 10).await;
    add_table(&app, &f.manager, 2, 4).await;

    let (_, order) = app.post("/orders", &f.waiter, order_body(f.product_id, 1)).await;
    let source_account = order["account_id"].clone();

    let (status, moved) = app
        .post(
            &format!("/orders/{}/reassign", order["id"]),
            &f.waiter,
            json!({ "table_number": 2 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{moved}");
    assert_eq!(moved["table_number"], 2);
    assert_eq!(moved["reassigned"], true);
    assert_ne!(moved["account_id"], source_account);

    assert_eq!(table(&app, &f.manager, 1).await["status"], "available");
    assert_eq!(table(&app, &f.manager, 2).await["status"], "occupied");
    let (_, account) = app.get(&format!("/accounts/{source_account}"), &f.manager).await;
    assert_eq!(account["status"], "closed");
}

// =============================================================================
// Table accounts
// =============================================================================

#[tokio::test]
async fn combined_tables_share_one_account() {
    let app = TestApp::new().await;
    let f = floor(&app, 10).await;
    add_table(&app, &f.manager, 2, 4).await;

    let (status, group) = app
        .post("/tables/combine", &f.manager, json!({ "tables": [1, 2] }))
        .await;
    assert_eq!(status, StatusCode::OK, "{group}");

    let (_, first) = app.post("/orders", &f.waiter, order_on(1, f.product_id, 1)).await;
    let (status, second) = app.post("/orders", &f.waiter, order_on(2, f.product_id, 1)).await;
    assert_eq!(status, StatusCode::CREATED, "{second}");
    assert_eq!(first["account_id"], second["account_id"]);

    let receipt = pay_card(&app, &f.cashier, &first["id"]).await;
    assert_eq!(receipt["account"]["status"], "open");

    // The second order is still owed: its table stays seated
    for number in [1, 2] {
        let t = table(&app, &f.manager, number).await;
        assert_eq!(t["status"], "occupied", "table {number}: {t}");
        assert_eq!(t["combined"], true);
    }

    let receipt = pay_card(&app, &f.cashier, &second["id"]).await;
    assert_eq!(receipt["account"]["status"], "closed");
    for number in [1, 2] {
        let t = table(&app, &f.manager, number).await;
        assert_eq!(t["status"], "available");
        assert_eq!(t["combined"], false);
    }
}

#[tokio::test]
async fn uncombine_keeps_a_member_with_unpaid_orders() {
    let app = TestApp::new().await;
    let f = floor(&app, 10).await;
    add_table(&app, &f.manager, 2, 4).await;
    add_table(&app, &f.manager, 3, 4).await;
    app.post("/tables/combine", &f.manager, json!({ "tables": [1, 2, 3] }))
        .await;
    app.post("/orders", &f.waiter, order_on(2, f.product_id, 1)).await;

    let (status, tables) = app.post("/tables/1/uncombine", &f.manager, json!({})).await;
    assert_eq!(status, StatusCode::OK, "{tables}");

    assert_eq!(table(&app, &f.manager, 1).await["status"], "available");
    assert_eq!(table(&app, &f.manager, 2).await["status"], "occupied");
    assert_eq!(table(&app, &f.manager, 3).await["status"], "available");
}

#[tokio::test]
async fn assign_prefers_one_table_then_combines() {
    let app = TestApp::new().await;
    app.provision("manager", Role::Manager).await;
    let manager = app.login("manager").await;
    add_table(&app, &manager, 1, 2).await;
    add_table(&app, &manager, 2, 2).await;
    add_table(&app, &manager, 3, 4).await;

    let (status, seat) = app
        .post("/tables/assign", &manager, json!({ "guest_count": 3 }))
        .await;
    assert_eq!(status, StatusCode::OK, "{seat}");
    assert_eq!(seat, json!({ "table": 3 }));
    assert_eq!(table(&app, &manager, 3).await["status"], "reserved");

    let (_, seat) = app
        .post("/tables/assign", &manager, json!({ "guest_count": 4 }))
        .await;
    assert_eq!(seat, json!({ "tables": [1, 2] }));
    let first = table(&app, &manager, 1).await;
    assert_eq!(first["status"], "reserved");
    assert_eq!(first["combined"], true);
    assert_eq!(first["combined_with"], json!([1, 2]));
    assert_eq!(first["combined_capacity"], 4);

    let (status, body) = app
        .post("/tables/assign", &manager, json!({ "guest_count": 2 }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "no_table_available");

    let (status, _) = app.post("/tables/2/uncombine", &manager, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    for number in [1, 2] {
        let t = table(&app, &manager, number).await;
        assert_eq!(t["status"], "available");
        assert_eq!(t["combined"], false);
    }
}

// =============================================================================
// Productions
// =============================================================================

struct Kitchen {
    flour: i64,
    cheese: i64,
    product_id: i64,
    production_id: i64,
}

async fn create_supply(app: &TestApp, manager: &str, name: &str, milli: i64) -> i64 {
    let (status, supply) = app
        .post(
            "/supplies",
            manager,
            json!({ "name": name, "unit": "kg", "stock_on_hand": milli, "stock_min": 0 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{supply}");
    supply["id"].as_i64().unwrap()
}

/// Flour 100 kg and cheese 50 kg; each empanada takes 0.5 kg and 0.2 kg.
/// A run of ten is registered and applied.
async fn applied_production(app: &TestApp, manager: &str) -> Kitchen {
    let flour = create_supply(app, manager, "Flour", 100_000).await;
    let cheese = create_supply(app, manager, "Cheese", 50_000).await;
    let (_, product) = app
        .post(
            "/products",
            manager,
            json!({ "name": "Empanada", "price": 450, "is_manufactured": true }),
        )
        .await;
    let product_id = product["id"].as_i64().unwrap();

    let (status, recipe) = app
        .post(
            "/recipes",
            manager,
            json!({
                "product_id": product_id,
                "items": [
                    { "supply_id": flour, "qty_per_unit": 500 },
                    { "supply_id": cheese, "qty_per_unit": 200 },
                ],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{recipe}");

    let (status, production) = app
        .post(
            "/productions",
            manager,
            json!({ "product_id": product_id, "qty_produced": 10, "lot": "L-1" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{production}");
    assert_eq!(production["state"], "registered");
    // Registering moves nothing
    assert_eq!(supply_stock(app, manager, flour).await, 100_000);

    let production_id = production["id"].as_i64().unwrap();
    let (status, applied) = app
        .post(&format!("/productions/{production_id}/apply"), manager, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{applied}");
    assert_eq!(applied["state"], "applied");

    Kitchen {
        flour,
        cheese,
        product_id,
        production_id,
    }
}

#[tokio::test]
async fn production_apply_then_void_restores_stock() {
    let app = TestApp::new().await;
    app.provision("manager", Role::Manager).await;
    let manager = app.login("manager").await;
    let k = applied_production(&app, &manager).await;

    assert_eq!(supply_stock(&app, &manager, k.flour).await, 95_000);
    assert_eq!(supply_stock(&app, &manager, k.cheese).await, 48_000);
    assert_eq!(product_stock(&app, &manager, k.product_id).await, 10);

    let (_, view) = app
        .get(&format!("/productions/{}", k.production_id), &manager)
        .await;
    let snapshots = view["snapshots"].as_array().unwrap();
    assert_eq!(snapshots.len(), 2);
    let flour = snapshots.iter().find(|s| s["supply_id"] == k.flour).unwrap();
    assert_eq!(flour["qty_consumed"], 5_000);
    assert_eq!(flour["stock_before"], 100_000);
    assert_eq!(flour["stock_after"], 95_000);

    let (status, body) = app
        .post(
            &format!("/productions/{}/void", k.production_id),
            &manager,
            json!({ "secondary_pin": "0000", "reason": "miscount" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "invalid_secondary_pin");

    let (status, voided) = app
        .post(
            &format!("/productions/{}/void", k.production_id),
            &manager,
            json!({ "secondary_pin": SECONDARY_PIN, "reason": "miscount" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{voided}");
    assert_eq!(voided["state"], "voided");
    assert_eq!(voided["secondary_pin_validated"], true);
    assert_eq!(voided["void_reason"], "miscount");
    assert_eq!(supply_stock(&app, &manager, k.flour).await, 100_000);
    assert_eq!(supply_stock(&app, &manager, k.cheese).await, 50_000);
    assert_eq!(product_stock(&app, &manager, k.product_id).await, 0);

    let (status, body) = app
        .post(
            &format!("/productions/{}/apply", k.production_id),
            &manager,
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_transition");
}

#[tokio::test]
async fn void_is_refused_once_the_output_is_sold() {
    let app = TestApp::new().await;
    let f = floor(&app, 10).await;
    let k = applied_production(&app, &f.manager).await;

    let (status, _) = app.post("/orders", &f.waiter, order_body(k.product_id, 4)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(product_stock(&app, &f.manager, k.product_id).await, 6);

    let (status, body) = app
        .post(
            &format!("/productions/{}/void", k.production_id),
            &f.manager,
            json!({ "secondary_pin": SECONDARY_PIN, "reason": "spoiled" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "cannot_void_insufficient_product_stock");
    assert_eq!(supply_stock(&app, &f.manager, k.flour).await, 95_000);
    assert_eq!(supply_stock(&app, &f.manager, k.cheese).await, 48_000);
    assert_eq!(product_stock(&app, &f.manager, k.product_id).await, 6);
}

#[tokio::test]
async fn void_records_the_acting_principal() {
    let app = TestApp::new().await;
    let f = floor(&app, 10).await;
    let cook = app.provision("cook", Role::Cook).await;
    let cook_token = app.login("cook").await;
    let k = applied_production(&app, &f.manager).await;

    let (status, voided) = app
        .post(
            &format!("/productions/{}/void", k.production_id),
            &cook_token,
            json!({ "secondary_pin": SECONDARY_PIN, "reason": "burnt batch" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{voided}");
    assert_eq!(voided["voided_by"], cook.id);

    // The authoriser is kept on the audit trail
    let (_, view) = app
        .get(&format!("/productions/{}", k.production_id), &f.manager)
        .await;
    let entry = view["history"]
        .as_array()
        .unwrap()
        .iter()
        .find(|h| h["after"]["state"] == "voided")
        .unwrap();
    assert_eq!(entry["actor_id"], cook.id);
    assert!(entry["after"]["authorised_by"].is_i64());
    assert_ne!(entry["after"]["authorised_by"], cook.id);
}

// =============================================================================
// Cash register
// =============================================================================

#[tokio::test]
async fn item_payment_on_a_discounted_order_stays_partial() {
    let app = TestApp::new().await;
    let f = floor(&app, 10).await;
    let (_, order) = app.post("/orders", &f.waiter, order_body(f.product_id, 2)).await;
    let item_id = order["items"][0]["id"].clone();
    app.post(
        &format!("/orders/{}/discount", order["id"]),
        &f.manager,
        json!({ "discount_pct": 5000 }),
    )
    .await;

    let body = json!({
        "order_id": order["id"],
        "lines": [{ "item_id": item_id, "qty": 1 }],
        "method": "card",
    });
    let (status, receipt) = app.post("/payments/items", &f.cashier, body.clone()).await;
    assert_eq!(status, StatusCode::OK, "{receipt}");
    assert_eq!(receipt["transaction"]["amount"], 125);
    assert_eq!(receipt["order"]["payment_state"], "partial");
    assert_eq!(receipt["order"]["paid_amount"], 125);
    assert_eq!(receipt["account"]["status"], "open");
    assert_eq!(table(&app, &f.manager, 1).await["status"], "settling");

    // A partly paid order is still in the cashier's queue
    let (_, queue) = app.get("/orders/pending-payment", &f.cashier).await;
    let entry = &queue["data"][0];
    assert_eq!(entry["order_id"], order["id"]);
    assert_eq!(entry["balance"], 125);

    let (status, receipt) = app.post("/payments/items", &f.cashier, body).await;
    assert_eq!(status, StatusCode::OK, "{receipt}");
    assert_eq!(receipt["transaction"]["amount"], 125);
    assert_eq!(receipt["order"]["payment_state"], "paid");
    assert_eq!(receipt["account"]["status"], "closed");

    let (_, detail) = app.get(&format!("/orders/{}", order["id"]), &f.manager).await;
    assert_eq!(detail["items"][0]["qty_paid"], 2);
    assert_eq!(table(&app, &f.manager, 1).await["status"], "available");
}

#[tokio::test]
async fn refund_is_netted_out_at_shift_close() {
    let app = TestApp::new().await;
    let f = floor(&app, 10).await;
    let (_, order) = app.post("/orders", &f.waiter, order_body(f.product_id, 4)).await;
    let (status, _) = app
        .post(
            "/payments/simple",
            &f.cashier,
            json!({ "order_id": order["id"], "method": "cash", "amount_tendered": 1000 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let refund = |pin: &str, amount: i64| {
        json!({
            "order_id": order["id"],
            "amount": amount,
            "method": "cash",
            "reason": "cold dish",
            "secondary_pin": pin,
        })
    };
    let (status, body) = app.post("/refunds", &f.cashier, refund("0000", 200)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "invalid_secondary_pin");

    let (status, body) = app.post("/refunds", &f.cashier, refund(SECONDARY_PIN, 1200)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "refund_exceeds_paid");

    let (status, issued) = app.post("/refunds", &f.cashier, refund(SECONDARY_PIN, 200)).await;
    assert_eq!(status, StatusCode::CREATED, "{issued}");
    assert_eq!(issued["amount"], 200);

    // Refunds never put stock back
    assert_eq!(product_stock(&app, &f.manager, f.product_id).await, 6);

    let (_, stats) = app.get("/stats/day", &f.manager).await;
    let day = &stats["data"];
    assert_eq!(day["by_method"]["cash"], 800);
    assert_eq!(day["total_sales"], 800);
    assert_eq!(day["total_refunds"], 200);
    assert_eq!(day["paid_orders"], 1);
    assert_eq!(day["average_ticket"], 1000);
    assert_eq!(day["open_shifts"], 1);

    let (status, shift) = app
        .post("/shifts/close", &f.cashier, json!({ "cash_real": 10700 }))
        .await;
    assert_eq!(status, StatusCode::OK, "{shift}");
    assert_eq!(shift["state"], "closed");
    assert_eq!(shift["total_cash"], 800);
    assert_eq!(shift["cash_expected"], 10800);
    assert_eq!(shift["cash_real"], 10700);
    assert_eq!(shift["diff"], -100);
    assert_eq!(shift["order_count"], 1);
}

// =============================================================================
// Dashboards
// =============================================================================

#[tokio::test]
async fn kanban_lanes_follow_the_state_steps() {
    let app = TestApp::new().await;
    let f = floor(&app, 10).await;
    let (_, order) = app.post("/orders", &f.waiter, order_body(f.product_id, 2)).await;

    let (status, board) = app.get("/kanban", &f.manager).await;
    assert_eq!(status, StatusCode::OK);
    let card = &board["data"]["to_prepare"][0];
    assert_eq!(card["order_id"], order["id"]);
    assert_eq!(card["waiter"], "waiter");
    assert_eq!(card["items"][0]["name"], "Cola");
    assert_eq!(card["items"][0]["qty"], 2);

    for next in ["confirmed", "in_preparation"] {
        let (status, stepped) = app
            .post(
                &format!("/orders/{}/state", order["id"]),
                &f.waiter,
                json!({ "state": next }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{stepped}");
    }
    let (_, board) = app.get("/kanban", &f.manager).await;
    assert!(board["data"]["to_prepare"].as_array().unwrap().is_empty());
    assert_eq!(board["data"]["preparing"][0]["order_id"], order["id"]);

    // Skipping a step is refused
    let (status, body) = app
        .post(
            &format!("/orders/{}/state", order["id"]),
            &f.waiter,
            json!({ "state": "delivered" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_transition");

    let (_, queue) = app.get("/orders/pending-payment", &f.cashier).await;
    let entry = &queue["data"][0];
    assert_eq!(entry["balance"], 500);
    assert_eq!(entry["suggested_tip"], 50);
    assert_eq!(entry["waiter"], "waiter");

    // Identical polls share a version
    let (_, again) = app.get("/orders/pending-payment", &f.cashier).await;
    assert_eq!(queue["version"], again["version"]);

    pay_card(&app, &f.cashier, &order["id"]).await;
    let (_, board) = app.get("/kanban", &f.manager).await;
    assert!(board["data"]["preparing"].as_array().unwrap().is_empty());
    let (_, map) = app.get("/tables/map", &f.manager).await;
    assert_eq!(map["data"][0]["status"], "available");
}

// =============================================================================
// Gates
// =============================================================================

#[tokio::test]
async fn waiter_writes_follow_the_shift() {
    let app = TestApp::new().await;
    app.provision("manager", Role::Manager).await;
    app.provision("cashier", Role::Cashier).await;
    app.provision("waiter", Role::Waiter).await;
    let manager = app.login("manager").await;
    let cashier = app.login("cashier").await;
    app.post("/tables", &manager, json!({ "number": 1, "capacity": 4 })).await;
    let (_, product) = app
        .post("/products", &manager, json!({ "name": "Tea", "price": 150, "stock_on_hand": 5 }))
        .await;
    let product_id = product["id"].as_i64().unwrap();

    let waiter = app.login("waiter").await;
    let (status, body) = app.post("/orders", &waiter, order_body(product_id, 1)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "shift_closed");

    // The refused session is gone
    let (status, _) = app.get("/auth/me", &waiter).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post("/shifts/open", &cashier, json!({ "cash_start": 0 }))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let waiter = app.login("waiter").await;
    let (status, order) = app.post("/orders", &waiter, order_body(product_id, 1)).await;
    assert_eq!(status, StatusCode::CREATED, "{order}");

    let (status, _) = app
        .post("/shifts/close", &cashier, json!({ "cash_real": 0 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app
        .post(
            &format!("/orders/{}/items", order["id"]),
            &waiter,
            json!({ "product_id": product_id, "qty": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "shift_closed");
}

fn pin_request(pin: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/auth/pin")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "10.0.0.9")
        .body(Body::from(json!({ "pin": pin }).to_string()))
        .unwrap()
}

#[tokio::test]
async fn pin_source_is_blocked_after_five_failures() {
    let app = TestApp::new().await;
    app.provision("cashier", Role::Cashier).await;

    for _ in 0..5 {
        let (status, body) = app.send(pin_request("0000")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_credentials");
    }

    let (status, body) = app.send(pin_request(CASHIER_PIN)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate_limited");

    // Another source is unaffected
    let request = Request::builder()
        .method(Method::POST)
        .uri("/auth/pin")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "10.0.0.10")
        .body(Body::from(json!({ "pin": CASHIER_PIN }).to_string()))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["principal"]["role"], "cashier");
}

#[tokio::test]
async fn qr_token_logs_in_once() {
    let app = TestApp::new().await;
    app.provision("manager", Role::Manager).await;
    let guest = app.provision("table-guest", Role::Customer).await;
    let manager = app.login("manager").await;

    let (status, qr) = app
        .post("/auth/qr/issue", &manager, json!({ "principal_id": guest.id }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{qr}");
    let uri = format!("/auth/qr/{}", qr["token"].as_str().unwrap());

    let (status, body) = app.call(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["principal"]["role"], "customer");

    let (status, body) = app.call(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"], "qr_consumed");

    let (status, _) = app.call(Method::GET, "/auth/qr/not-a-token", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn waiter_cannot_touch_the_register() {
    let app = TestApp::new().await;
    app.provision("waiter", Role::Waiter).await;
    let waiter = app.login("waiter").await;

    let (status, body) = app
        .post("/shifts/open", &waiter, json!({ "cash_start": 0 }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _) = app.call(Method::GET, "/kanban", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Integrations
// =============================================================================

fn integration_request(uri: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(key) = key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn integrations_without_configured_key_are_closed() {
    let app = TestApp::new().await;
    let (status, body) = app
        .send(integration_request("/integrations/health", Some("anything")))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn integrations_check_the_key() {
    let app = TestApp::with_env(&[("SGIR_WEBHOOK_API_KEY", "n8n-key")]).await;

    let (status, _) = app
        .send(integration_request("/integrations/health", Some("n8n-kez")))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.send(integration_request("/integrations/health", None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(integration_request("/integrations/health", Some("n8n-key")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = app
        .send(integration_request(
            "/integrations/cash/day-summary?date=2026-01-15",
            Some("n8n-key"),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["version"].as_str().unwrap().len(), 16);

    let (status, body) = app
        .send(integration_request("/integrations/inventory/low-stock", Some("n8n-key")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());
}
