//! # SGIR API
//!
//! HTTP surface of the restaurant core: floor tablets, the cashier
//! terminal, the kitchen board and customer QR phones all talk to it.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                             SGIR API                                    │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────────┐│
//! │  │  routes        │  │  gate          │  │  services                  ││
//! │  │                │  │                │  │                            ││
//! │  │ • /auth        │  │ • Caller       │  │ • identity   • inventory   ││
//! │  │ • /orders      │─►│ • sessions     │─►│ • tables     • cash        ││
//! │  │ • /payments …  │  │ • PIN limiter  │  │ • orders     • reservations││
//! │  │ • /integrations│  │ • work day     │  │ • dashboard                ││
//! │  └────────────────┘  └────────────────┘  └─────────────┬──────────────┘│
//! │                                                        ▼               │
//! │                                          ┌──────────────────────────┐  │
//! │                                          │ sgir-db (SQLite, sqlx)   │  │
//! │                                          └──────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! Environment variables are listed on [`config::ApiConfig`]; all have
//! development defaults.

pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod routes;
pub mod services;

use std::sync::Arc;

use sgir_db::Database;

use crate::auth::{CredentialHasher, JwtManager};
use crate::gate::{Clock, PinRateLimiter, SessionStore, WorkDayGate};

// Re-exports
pub use config::{ApiConfig, ConfigError};
pub use error::{ApiError, ApiResult};
pub use routes::app;

/// Shared application state.
pub struct AppState {
    pub db: Database,
    pub config: ApiConfig,
    pub hasher: CredentialHasher,
    pub jwt: JwtManager,
    pub sessions: SessionStore,
    pub pin_limiter: PinRateLimiter,
    pub work_day: WorkDayGate,
}

impl AppState {
    pub fn new(config: ApiConfig, db: Database, clock: Arc<dyn Clock>) -> ApiResult<Self> {
        Ok(AppState {
            hasher: CredentialHasher::new(config.argon2_memory_kib)?,
            jwt: JwtManager::new(config.secret_key.clone()),
            sessions: SessionStore::new(config.session_idle_minutes),
            pin_limiter: PinRateLimiter::new(clock),
            work_day: WorkDayGate::new(config.work_day_cache_secs),
            db,
            config,
        })
    }
}
