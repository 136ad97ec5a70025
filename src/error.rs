//! API error type shared by the engine services and the HTTP handlers.
//!
//! Every error carries one of the stable error codes from the public API
//! contract. Services return `ApiError` directly so handlers never have to
//! re-map domain failures; unexpected internal errors are wrapped and only a
//! generic message leaves the process (full detail goes to the logs).

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// Wire format for error responses: `{ "error": CODE, "message": "...", "details"?: ... }`
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidPlan(String),

    #[error("{0}")]
    InvalidAddress(String),

    #[error("{0}")]
    InvalidNetwork(String),

    #[error("{0}")]
    InvalidStatus(String),

    #[error("{0}")]
    PendingExists(String),

    #[error("{0}")]
    CannotCancel(String),

    #[error("{0}")]
    OfacSanctioned(String),

    #[error("{0}")]
    RateLimited(String),

    /// A confirmed transaction hash was presented a second time. Internal to
    /// the monitor/confirmation path; never produced by a request handler.
    #[error("transaction hash already settled a payment: {0}")]
    DuplicateTxHash(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Stable error code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::InvalidPlan(_) => "INVALID_PLAN",
            ApiError::InvalidAddress(_) => "INVALID_ADDRESS",
            ApiError::InvalidNetwork(_) => "INVALID_NETWORK",
            ApiError::InvalidStatus(_) | ApiError::DuplicateTxHash(_) => "INVALID_STATUS",
            ApiError::PendingExists(_) => "PENDING_EXISTS",
            ApiError::CannotCancel(_) => "CANNOT_CANCEL",
            ApiError::OfacSanctioned(_) => "OFAC_SANCTIONED",
            ApiError::RateLimited(_) => "RATE_LIMITED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn body(&self) -> ErrorBody {
        let message = match self {
            // Never leak internals to callers.
            ApiError::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };
        ErrorBody {
            error: self.code(),
            message,
            details: None,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::InvalidPlan(_)
            | ApiError::InvalidAddress(_)
            | ApiError::InvalidNetwork(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) | ApiError::OfacSanctioned(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidStatus(_)
            | ApiError::PendingExists(_)
            | ApiError::CannotCancel(_)
            | ApiError::DuplicateTxHash(_) => StatusCode::CONFLICT,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ApiError::Internal(inner) = self {
            tracing::error!(error = %inner, "internal error surfaced to API boundary");
        }
        HttpResponse::build(self.status_code()).json(self.body())
    }
}

/// Convenience conversion so model-layer diesel errors can bubble through
/// services with `?` and still arrive as `INTERNAL_ERROR` at the boundary.
impl From<diesel::result::Error> for ApiError {
    fn from(err: diesel::result::Error) -> Self {
        ApiError::Internal(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_vocabulary() {
        assert_eq!(ApiError::Validation("x".into()).code(), "VALIDATION_ERROR");
        assert_eq!(ApiError::PendingExists("x".into()).code(), "PENDING_EXISTS");
        assert_eq!(
            ApiError::OfacSanctioned("x".into()).code(),
            "OFAC_SANCTIONED"
        );
        assert_eq!(
            ApiError::DuplicateTxHash("0xabc".into()).code(),
            "INVALID_STATUS"
        );
    }

    #[test]
    fn internal_error_message_is_generic() {
        let err = ApiError::Internal(anyhow::anyhow!("secret database detail"));
        assert_eq!(err.body().message, "An internal error occurred");
    }
}
