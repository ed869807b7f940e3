//! # Identity Service
//!
//! Logins, logout, QR credentials, principal provisioning and the
//! secondary-PIN check used by sensitive reversals.
//!
//! ## QR Login
//! ```text
//! token ──► unknown ─────────────────────────────► qr_invalid
//!   │       consumed ────────────────────────────► qr_consumed
//!   │       invalidated ─────────────────────────► qr_invalid
//!   │       expired ─────────────── invalidate ──► qr_expired
//!   │       principal inactive ──── invalidate ──► account_disabled
//!   │       waiter/cook, day closed ─ invalidate ► shift_closed
//!   ▼
//! conditional consume ── lost the race ──────────► qr_consumed
//!   │
//!   ▼
//! session
//! ```

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use sgir_core::validation::{validate_name, validate_password, validate_pin, validate_username};
use sgir_core::{
    Area, CoreError, Principal, QrToken, QrTokenState, Role, ValidationError, QR_MAX_AGE_MINUTES,
};
use sgir_db::repository::NewPrincipal;
use sgir_db::{Repositories, WriteUnit};

use crate::auth::CredentialHasher;
use crate::error::{ApiError, ApiResult};
use crate::gate::business_date;
use crate::AppState;

// =============================================================================
// Requests / Responses
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct PasswordLogin {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PinLogin {
    pub pin: String,
}

/// Successful login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub principal: Principal,
    /// Opaque landing hint for the caller's UI
    pub landing: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct QrIssueRequest {
    pub principal_id: i64,
    pub max_age_minutes: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    pub username: String,
    pub display_name: String,
    pub role: Role,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub pin: Option<String>,
    #[serde(default)]
    pub secondary_pin: Option<String>,
    #[serde(default)]
    pub areas: Vec<Area>,
}

// =============================================================================
// Logins
// =============================================================================

async fn start_session(state: &AppState, principal: Principal) -> ApiResult<LoginResponse> {
    let session = state.sessions.start(&principal).await;
    let token = state.jwt.generate_session_token(&principal, &session.id)?;
    Ok(LoginResponse {
        token,
        landing: principal.role.landing(),
        principal,
    })
}

/// Username + password login.
///
/// ## Returns
/// * `Err(invalid_credentials)` - unknown username or wrong password
/// * `Err(account_disabled)` - right password, inactive principal
#[instrument(skip(state, req), fields(username = %req.username))]
pub async fn login_password(state: &AppState, req: &PasswordLogin, source: &str) -> ApiResult<LoginResponse> {
    let username = req.username.trim();
    let principal = {
        let mut unit = state.db.read().await?;
        unit.principals().get_by_username(username).await?
    };

    let Some(principal) = principal else {
        warn!(username, source, "Password login failed: unknown username");
        return Err(CoreError::InvalidCredentials.into());
    };
    let matches = principal
        .password_hash
        .as_deref()
        .is_some_and(|hash| state.hasher.verify(&req.password, hash));
    if !matches {
        warn!(username, source, "Password login failed: wrong password");
        return Err(CoreError::InvalidCredentials.into());
    }
    if !principal.active {
        warn!(username, source, "Password login refused: account disabled");
        return Err(CoreError::AccountDisabled.into());
    }

    info!(principal_id = principal.id, role = %principal.role, source, "Password login");
    start_session(state, principal).await
}

/// Cashier PIN login, rate limited per source address.
#[instrument(skip(state, req))]
pub async fn login_pin(state: &AppState, req: &PinLogin, source: &str) -> ApiResult<LoginResponse> {
    state.pin_limiter.check(source).await?;

    let found = if validate_pin("pin", &req.pin).is_ok() {
        let holders = {
            let mut unit = state.db.read().await?;
            unit.principals().active_pin_holders().await?
        };
        holders.into_iter().find(|p| {
            p.pin_hash
                .as_deref()
                .is_some_and(|hash| state.hasher.verify(&req.pin, hash))
        })
    } else {
        None
    };

    match found {
        Some(principal) => {
            state.pin_limiter.record_success(source).await;
            info!(principal_id = principal.id, role = %principal.role, source, "PIN login");
            start_session(state, principal).await
        }
        None => {
            state.pin_limiter.record_failure(source).await;
            warn!(source, "PIN login failed");
            Err(CoreError::InvalidCredentials.into())
        }
    }
}

/// One-shot QR login.
#[instrument(skip(state, token))]
pub async fn login_qr(state: &AppState, token: &str, source: &str) -> ApiResult<LoginResponse> {
    let now = Utc::now();
    let mut unit = state.db.write().await?;

    let Some(qr) = unit.principals().get_qr_token(token).await? else {
        warn!(source, "QR login failed: unknown token");
        return Err(CoreError::QrInvalid.into());
    };
    match qr.state {
        QrTokenState::Consumed => return Err(CoreError::QrConsumed.into()),
        QrTokenState::Invalidated => return Err(CoreError::QrInvalid.into()),
        QrTokenState::Issued => {}
    }

    let principal = unit.principals().require(qr.principal_id).await?;
    let refusal = if now >= qr.expires_at {
        Some(CoreError::QrExpired)
    } else if !principal.active {
        Some(CoreError::AccountDisabled)
    } else if principal.role.requires_open_work_day()
        && !unit.shifts().any_open_on(business_date()).await?
    {
        Some(CoreError::ShiftClosed)
    } else {
        None
    };
    if let Some(err) = refusal {
        unit.principals().invalidate_qr_token(token).await?;
        unit.commit().await?;
        warn!(principal_id = principal.id, source, code = err.code(), "QR login refused");
        return Err(err.into());
    }

    if !unit.principals().consume_qr_token(token, now).await? {
        return Err(CoreError::QrConsumed.into());
    }
    unit.commit().await?;

    info!(principal_id = principal.id, role = %principal.role, source, "QR login");
    start_session(state, principal).await
}

pub async fn logout(state: &AppState, session_id: &str) {
    if state.sessions.end(session_id).await {
        info!(session = %session_id, "Logged out");
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Issues a fresh QR token for a principal; earlier issued tokens die.
#[instrument(skip(state, req), fields(principal_id = req.principal_id))]
pub async fn issue_qr(
    state: &AppState,
    issuer: &Principal,
    req: &QrIssueRequest,
    source: &str,
) -> ApiResult<QrToken> {
    let minutes = req.max_age_minutes.unwrap_or(QR_MAX_AGE_MINUTES);
    if !(1..=QR_MAX_AGE_MINUTES).contains(&minutes) {
        return Err(ValidationError::OutOfRange {
            field: "max_age_minutes".to_string(),
            min: 1,
            max: QR_MAX_AGE_MINUTES,
        }
        .into());
    }

    let mut unit = state.db.write().await?;
    let principal = unit.principals().require(req.principal_id).await?;
    if !principal.active {
        return Err(CoreError::AccountDisabled.into());
    }

    let now = Utc::now();
    let qr = QrToken {
        token: Uuid::new_v4().simple().to_string(),
        principal_id: principal.id,
        issued_at: now,
        expires_at: now + Duration::minutes(minutes),
        issuer_address: Some(source.to_string()),
        state: QrTokenState::Issued,
        consumed_at: None,
    };
    unit.principals().rotate_qr_token(&qr).await?;
    unit.commit().await?;

    info!(issuer = issuer.id, principal_id = principal.id, minutes, "QR token issued");
    Ok(qr)
}

/// Creates a principal. PINs belong to cashiers and must be unique;
/// secondary PINs belong to authorisers.
#[instrument(skip(state, req), fields(username = %req.username, role = %req.role))]
pub async fn provision(state: &AppState, req: &ProvisionRequest) -> ApiResult<Principal> {
    validate_username(&req.username)?;
    validate_name("display_name", &req.display_name)?;
    if let Some(password) = &req.password {
        validate_password(password)?;
    }
    if let Some(pin) = &req.pin {
        if req.role != Role::Cashier {
            return Err(ValidationError::NotAllowed {
                field: "pin".to_string(),
                allowed: vec![Role::Cashier.to_string()],
            }
            .into());
        }
        validate_pin("pin", pin)?;
    }
    if let Some(secondary) = &req.secondary_pin {
        if !req.role.is_authoriser() {
            return Err(ValidationError::NotAllowed {
                field: "secondary_pin".to_string(),
                allowed: vec![Role::Manager.to_string(), Role::Admin.to_string()],
            }
            .into());
        }
        validate_pin("secondary_pin", secondary)?;
    }

    let hash = |secret: &Option<String>| -> ApiResult<Option<String>> {
        secret.as_deref().map(|s| state.hasher.hash(s)).transpose()
    };
    let new = NewPrincipal {
        username: req.username.trim().to_string(),
        display_name: req.display_name.trim().to_string(),
        role: req.role,
        password_hash: hash(&req.password)?,
        pin_hash: hash(&req.pin)?,
        secondary_pin_hash: hash(&req.secondary_pin)?,
        areas: if req.areas.is_empty() {
            req.role.default_areas()
        } else {
            req.areas.clone()
        },
    };

    let mut unit = state.db.write().await?;
    if let Some(pin) = &req.pin {
        let taken = unit.principals().all_pin_hashes().await?;
        if taken.iter().any(|hash| state.hasher.verify(pin, hash)) {
            return Err(CoreError::Duplicate {
                field: "pin".to_string(),
                value: "****".to_string(),
            }
            .into());
        }
    }
    let principal = unit
        .principals()
        .insert(&new, Utc::now())
        .await
        .map_err(|e| {
            if e.is_unique_on("username") {
                ApiError::from(CoreError::Duplicate {
                    field: "username".to_string(),
                    value: new.username.clone(),
                })
            } else {
                ApiError::from(e)
            }
        })?;
    unit.commit().await?;

    info!(principal_id = principal.id, role = %principal.role, "Principal provisioned");
    Ok(principal)
}

pub async fn list_principals(state: &AppState) -> ApiResult<Vec<Principal>> {
    let mut unit = state.db.read().await?;
    Ok(unit.principals().list().await?)
}

/// Enables or disables a principal. Disabling ends its sessions.
#[instrument(skip(state))]
pub async fn set_active(state: &AppState, principal_id: i64, active: bool) -> ApiResult<Principal> {
    let mut unit = state.db.write().await?;
    unit.principals().set_active(principal_id, active).await?;
    let principal = unit.principals().require(principal_id).await?;
    unit.commit().await?;

    if !active {
        let ended = state.sessions.end_all_for(principal_id).await;
        info!(principal_id, sessions_ended = ended, "Principal disabled");
    } else {
        info!(principal_id, "Principal enabled");
    }
    Ok(principal)
}

/// Finds the active authoriser whose secondary PIN matches.
///
/// ## Returns
/// * `Err(invalid_secondary_pin)` - no active manager/admin matches
pub(crate) async fn verify_secondary_pin(
    unit: &mut WriteUnit,
    hasher: &CredentialHasher,
    pin: &str,
) -> ApiResult<Principal> {
    let authorisers = unit.principals().active_authorisers().await?;
    authorisers
        .into_iter()
        .find(|p| {
            p.secondary_pin_hash
                .as_deref()
                .is_some_and(|hash| hasher.verify(pin, hash))
        })
        .ok_or_else(|| {
            warn!("Secondary PIN rejected");
            CoreError::InvalidSecondaryPin.into()
        })
}
