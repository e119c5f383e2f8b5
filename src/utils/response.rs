#![allow(dead_code)]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn error(code: &str, message: &str) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.to_string(),
                message: message.to_string(),
            }),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Application error type
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn unauthorized(message: &str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal(message: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

/// Maps the five error kinds from §7 onto HTTP status/code pairs. Validation,
/// insufficient funds, and duplicate-idempotency-key errors all surface as
/// REJECTED reasons at the engine layer, but once they cross the HTTP
/// boundary they still need a status code — 400/402/409 respectively reads
/// better to a client than a blanket 500.
impl From<crate::services::matching::MatchingError> for AppError {
    fn from(err: crate::services::matching::MatchingError) -> Self {
        use crate::services::matching::MatchingError as E;
        match err {
            E::MarketNotFound(_) | E::OrderNotFound(_) => Self::not_found(&err.to_string()),
            E::MarketNotOpen | E::InvalidPrice(_) | E::InvalidQty(_) => {
                Self::bad_request(&err.to_string())
            }
            E::DuplicateClientOrderId => {
                Self::new(StatusCode::CONFLICT, "DUPLICATE_CLIENT_ORDER_ID", &err.to_string())
            }
            E::InsufficientFunds { .. } => {
                Self::new(StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_FUNDS", &err.to_string())
            }
            E::Forbidden => Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", &err.to_string()),
            E::Storage(_) | E::Internal(_) => Self::internal(&err.to_string()),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::internal(&err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()>::error(&self.code, &self.message);
        (self.status, Json(body)).into_response()
    }
}
