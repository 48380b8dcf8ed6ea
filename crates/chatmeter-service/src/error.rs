//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use chatmeter_core::{format_credits, MeteringError};
use chatmeter_store::StoreError;

use crate::identity::IdentityError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but insufficient permissions.
    #[error("forbidden")]
    Forbidden,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - resource already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A metering rule refused the operation.
    #[error(transparent)]
    Metering(#[from] MeteringError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// External service error.
    #[error("external service error: {0}")]
    ExternalService(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

fn metering_parts(err: &MeteringError) -> (StatusCode, Option<serde_json::Value>) {
    match err {
        MeteringError::AccountInactive
        | MeteringError::NoSubscription
        | MeteringError::ModelNotPermitted { .. } => (StatusCode::FORBIDDEN, None),
        MeteringError::RateLimited { scope } => (
            StatusCode::TOO_MANY_REQUESTS,
            Some(serde_json::json!({ "scope": scope })),
        ),
        MeteringError::PricingError(msg) => {
            tracing::error!(error = %msg, "Pricing error");
            (StatusCode::INTERNAL_SERVER_ERROR, None)
        }
        MeteringError::InsufficientCredit { balance, required } => (
            StatusCode::PAYMENT_REQUIRED,
            Some(serde_json::json!({
                "balance_cents": balance,
                "required_cents": required,
                "balance_formatted": format_credits(*balance),
                "required_formatted": format_credits(*required),
            })),
        ),
        MeteringError::InvalidAmount(_) | MeteringError::InvalidId(_) => {
            (StatusCode::BAD_REQUEST, None)
        }
        MeteringError::NotFound { .. } => (StatusCode::NOT_FOUND, None),
        MeteringError::Unavailable(msg) => {
            tracing::error!(error = %msg, "Store unavailable");
            (StatusCode::SERVICE_UNAVAILABLE, None)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden", self.to_string(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::Metering(err) => {
                let (status, details) = metering_parts(err);
                let message = if err.is_transient() {
                    "Storage is temporarily unavailable".to_string()
                } else {
                    err.to_string()
                };
                (status, err.reason(), message, details)
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                "external_service_error",
                msg.clone(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Metering(err.into())
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidCredentials => Self::Unauthorized,
            other => {
                tracing::warn!(error = %other, "Identity service call failed");
                Self::ExternalService(other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chatmeter_core::RateLimitScope;

    use super::*;

    #[test]
    fn status_codes_follow_reasons() {
        let cases = [
            (MeteringError::AccountInactive, StatusCode::FORBIDDEN),
            (MeteringError::NoSubscription, StatusCode::FORBIDDEN),
            (
                MeteringError::RateLimited {
                    scope: RateLimitScope::Hourly,
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                MeteringError::InsufficientCredit {
                    balance: 1,
                    required: 2,
                },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                MeteringError::Unavailable("io".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                MeteringError::PricingError("zero".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), expected);
        }
    }

    #[test]
    fn store_failures_are_unavailable_not_payment_required() {
        let response = ApiError::from(StoreError::Database("disk".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
