//! # API Error Type
//!
//! Unified error type for HTTP handlers.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in SGIR                                   │
//! │                                                                         │
//! │  Handler ──► service ──► Result<T, ApiError>                            │
//! │                              ▲            ▲                             │
//! │                              │            │                             │
//! │       CoreError (code, kind) ┘            └ DbError (classified)        │
//! │                                                                         │
//! │  IntoResponse:                                                          │
//! │    kind ──► status     Validation 400   Unauth 401    Forbidden 403     │
//! │                        NotFound 404     Conflict 409  Gone 410          │
//! │                        RateLimited 429  Internal 500                    │
//! │                                                                         │
//! │    body ──► {"error": code, "message": sentence, "detail": json?}       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Internal failures are logged with their cause and reach the caller as a
//! generic sentence. SQL text never leaves the process.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::{json, Value};

use sgir_core::{CoreError, ErrorKind, ValidationError};
use sgir_db::DbError;

/// Result type for handlers and services.
pub type ApiResult<T> = Result<T, ApiError>;

/// Error returned from every handler.
///
/// ## Serialization
/// What the caller receives when a request fails:
/// ```json
/// {
///   "error": "insufficient_stock",
///   "message": "Insufficient stock for 1 product(s)",
///   "detail": {"shortfalls": [{"product": 3, "name": "Soda", "requested": 4, "available": 1}]}
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ApiError {
    pub kind: ErrorKind,
    /// Stable snake_case code
    pub code: &'static str,
    /// Human-readable sentence
    pub message: String,
    pub detail: Option<Value>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, code: &'static str, message: impl Into<String>) -> Self {
        ApiError {
            kind,
            code,
            message: message.into(),
            detail: None,
        }
    }

    /// Logs `cause` and hides it behind a generic sentence.
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        tracing::error!(error = %cause, "Internal error");
        ApiError::new(ErrorKind::Internal, "internal", "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauth => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Gone => StatusCode::GONE,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Converts core errors, keeping their code and structured detail.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError {
            kind: err.kind(),
            code: err.code(),
            message: err.to_string(),
            detail: err.detail(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        CoreError::from(err).into()
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::new(
                ErrorKind::NotFound,
                "not_found",
                format!("{} not found: {}", entity, id),
            ),
            DbError::UniqueViolation { field } => {
                let column = field.rsplit('.').next().unwrap_or(&field).to_string();
                let mut error = ApiError::new(
                    ErrorKind::Conflict,
                    "duplicate",
                    format!("{} already exists", column),
                );
                error.detail = Some(json!({ "field": column }));
                error
            }
            DbError::ForeignKeyViolation { message } => {
                tracing::warn!(%message, "Foreign key violation");
                ApiError::new(ErrorKind::Validation, "validation", "Invalid reference")
            }
            DbError::ConstraintViolation { message } => {
                tracing::warn!(%message, "Constraint violation");
                ApiError::new(
                    ErrorKind::Conflict,
                    "conflict",
                    "The change conflicts with current data; re-read and retry",
                )
            }
            DbError::PoolExhausted => {
                tracing::error!("Database pool exhausted");
                ApiError::new(ErrorKind::Internal, "internal", "Database is busy")
            }
            other => ApiError::internal(other),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({
            "error": self.code,
            "message": self.message,
        });
        if let Some(detail) = self.detail {
            body["detail"] = detail;
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sgir_core::error::Shortfall;

    #[test]
    fn test_core_error_keeps_code_and_detail() {
        let err: ApiError = CoreError::InsufficientStock {
            shortfalls: vec![Shortfall {
                product: 3,
                name: "Soda".to_string(),
                requested: 4,
                available: 1,
            }],
        }
        .into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code, "insufficient_stock");
        let detail = err.detail.unwrap();
        assert_eq!(detail["shortfalls"][0]["available"], 1);
    }

    #[test]
    fn test_status_per_kind() {
        let gone: ApiError = CoreError::QrConsumed.into();
        assert_eq!(gone.status(), StatusCode::GONE);
        let limited: ApiError = CoreError::RateLimited { retry_after_secs: 60 }.into();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        let closed: ApiError = CoreError::ShiftClosed.into();
        assert_eq!(closed.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_db_internals_are_hidden() {
        let err: ApiError = DbError::QueryFailed("SELECT * FROM secrets".to_string()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("SELECT"));

        let dup: ApiError = DbError::UniqueViolation {
            field: "principals.username".to_string(),
        }
        .into();
        assert_eq!(dup.code, "duplicate");
        assert_eq!(dup.detail.unwrap()["field"], "username");
    }
}
