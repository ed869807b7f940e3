//! Request extractors: the authenticated caller and the source address.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use tracing::warn;

use sgir_core::permissions::{authorize, Requirement};
use sgir_core::{CoreError, Principal};
use sgir_db::Repositories;

use crate::auth::{extract_bearer_token, extract_session_cookie};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// The principal behind a request, resolved from its session.
#[derive(Debug, Clone)]
pub struct Caller {
    pub principal: Principal,
    pub session_id: String,
}

impl Caller {
    pub fn id(&self) -> i64 {
        self.principal.id
    }

    /// Checks `req` for this caller.
    ///
    /// ## Returns
    /// * `Err(forbidden)` - role or area not held
    /// * `Err(shift_closed)` - mutating call by a waiter or cook while no
    ///   shift is open today; the session is ended as well
    pub async fn require(&self, state: &AppState, req: &Requirement) -> ApiResult<()> {
        authorize(&self.principal, req)?;

        if req.mutating
            && self.principal.role.requires_open_work_day()
            && !state.work_day.is_open(&state.db).await?
        {
            state.sessions.end(&self.session_id).await;
            warn!(
                principal_id = self.principal.id,
                role = %self.principal.role,
                "Work day closed, session ended"
            );
            return Err(CoreError::ShiftClosed.into());
        }
        Ok(())
    }
}

/// Token from `Authorization: Bearer`, else from the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(token) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer_token)
    {
        return Some(token);
    }
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(extract_session_cookie)
}

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers).ok_or(CoreError::Unauthenticated)?;
        let claims = state.jwt.validate_token(token)?;
        let session = state
            .sessions
            .touch(&claims.jti)
            .await
            .ok_or(CoreError::Unauthenticated)?;
        if claims.principal_id()? != session.principal_id {
            return Err(CoreError::Unauthenticated.into());
        }

        let principal = {
            let mut unit = state.db.read().await?;
            unit.principals().get(session.principal_id).await?
        };
        match principal {
            Some(principal) if principal.active => Ok(Caller {
                principal,
                session_id: session.id,
            }),
            _ => {
                state.sessions.end(&session.id).await;
                Err(CoreError::AccountDisabled.into())
            }
        }
    }
}

/// Source address used by the PIN limiter and auth logs: the first
/// `X-Forwarded-For` hop, else the peer address, else `"unknown"`.
#[derive(Debug, Clone)]
pub struct SourceAddr(pub String);

impl<S: Send + Sync> FromRequestParts<S> for SourceAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Ok(SourceAddr(
            forwarded.or(peer).unwrap_or_else(|| "unknown".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("sgir_session=from-cookie"));
        assert_eq!(session_token(&headers), Some("from-cookie"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(session_token(&headers), Some("from-header"));
    }

    #[test]
    fn test_no_token() {
        assert_eq!(session_token(&HeaderMap::new()), None);
    }
}
