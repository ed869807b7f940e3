//! Shared harness: an in-memory database behind the full router.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use sgir_api::gate::SystemClock;
use sgir_api::services::identity::{self, ProvisionRequest};
use sgir_api::{app, ApiConfig, AppState};
use sgir_core::{Principal, Role};
use sgir_db::{Database, DbConfig};

pub const PASSWORD: &str = "password123";
pub const SECONDARY_PIN: &str = "9999";
pub const CASHIER_PIN: &str = "1234";

pub struct TestApp {
    pub state: Arc<AppState>,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_env(&[]).await
    }

    /// Starts with extra configuration keys on top of the test defaults.
    pub async fn with_env(overrides: &[(&str, &str)]) -> Self {
        let overrides: Vec<(String, String)> = overrides
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = ApiConfig::from_source(|key| {
            if let Some((_, v)) = overrides.iter().find(|(k, _)| k == key) {
                return Some(v.clone());
            }
            match key {
                "SGIR_ARGON2_MEMORY_KIB" => Some("1024".to_string()),
                "SGIR_SECRET_KEY" => Some("test-secret".to_string()),
                _ => None,
            }
        })
        .unwrap();
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let state = Arc::new(AppState::new(config, db, Arc::new(SystemClock)).unwrap());
        let router = app(state.clone());
        TestApp { state, router }
    }

    pub async fn provision(&self, username: &str, role: Role) -> Principal {
        let req = ProvisionRequest {
            username: username.to_string(),
            display_name: username.to_string(),
            role,
            password: (role != Role::Customer).then(|| PASSWORD.to_string()),
            pin: (role == Role::Cashier).then(|| CASHIER_PIN.to_string()),
            secondary_pin: role.is_authoriser().then(|| SECONDARY_PIN.to_string()),
            areas: Vec::new(),
        };
        identity::provision(&self.state, &req).await.unwrap()
    }

    /// Password login; returns the bearer token.
    pub async fn login(&self, username: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/auth/password",
                None,
                Some(json!({ "username": username, "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(token), Some(body)).await
    }
}

/// A floor with one table, one drink and a cashier holding an open shift.
pub struct Floor {
    pub manager: String,
    pub cashier: String,
    pub waiter: String,
    pub product_id: i64,
}

pub async fn floor(app: &TestApp, stock: i64) -> Floor {
    app.provision("manager", Role::Manager).await;
    app.provision("cashier", Role::Cashier).await;
    app.provision("waiter", Role::Waiter).await;
    let manager = app.login("manager").await;
    let cashier = app.login("cashier").await;

    let (status, _) = app
        .post("/tables", &manager, json!({ "number": 1, "capacity": 4 }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, product) = app
        .post(
            "/products",
            &manager,
            json!({ "name": "Cola", "price": 250, "stock_on_hand": stock, "stock_min": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .post("/shifts/open", &cashier, json!({ "cash_start": 10000 }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let waiter = app.login("waiter").await;

    Floor {
        manager,
        cashier,
        waiter,
        product_id: product["id"].as_i64().unwrap(),
    }
}
