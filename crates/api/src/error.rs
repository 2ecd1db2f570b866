//! API error types with HTTP response mapping.

use std::collections::BTreeMap;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use domain::DomainError;
use store::StoreError;

const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request the handler could not interpret.
    BadRequest(String),
    /// Token missing from the store, expired, or issued for another scope.
    Unauthorized(String),
    /// Resource not found.
    NotFound(String),
    /// Write conflicts with existing state.
    Conflict(String),
    /// Field-level rejections, keyed by field name.
    Unprocessable(BTreeMap<String, String>),
    /// Storage timed out; the client may retry.
    Unavailable(String),
    /// Internal server error; the detail is logged, never returned.
    Internal(String),
}

impl ApiError {
    /// A single-field rejection.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        ApiError::Unprocessable(BTreeMap::from([(field.to_string(), message.into())]))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, serde_json::json!(msg)),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, serde_json::json!(msg)),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, serde_json::json!(msg)),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, serde_json::json!(msg)),
            ApiError::Unprocessable(fields) => {
                (StatusCode::UNPROCESSABLE_ENTITY, serde_json::json!(fields))
            }
            ApiError::Unavailable(msg) => {
                tracing::warn!(error = %msg, "storage unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    serde_json::json!("storage is temporarily unavailable, please retry"),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!(SERVER_ERROR_MESSAGE),
                )
            }
        };

        let body = serde_json::json!({ "error": error });
        (status, axum::Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => ApiError::field("body", e.body_text()),
            other => ApiError::BadRequest(other.body_text()),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::NotFound(_) => ApiError::NotFound(err.to_string()),
            StoreError::DuplicateCartEntry { .. } => ApiError::Conflict(err.to_string()),
            StoreError::InsufficientStock(item_id) => {
                ApiError::field("available_stock", format!("not enough for item {item_id}"))
            }
            StoreError::AmountOverflow(_) => {
                ApiError::field("quantity", "total price exceeds the supported amount")
            }
            StoreError::TokenExpired => ApiError::Unauthorized(err.to_string()),
            StoreError::InvalidRequest(msg) => ApiError::BadRequest(msg.clone()),
            _ if err.is_transient() => ApiError::Unavailable(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(errors) => ApiError::Unprocessable(errors.to_map()),
            DomainError::Store(err) => err.into(),
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::InvalidEnum { field, value } => {
                ApiError::field(field, format!("unknown code {value}"))
            }
            CheckoutError::MissingToken => ApiError::field("token", "must be provided"),
            CheckoutError::UnexpectedToken => {
                ApiError::field("token", "must be empty for guest checkout")
            }
            CheckoutError::InvalidPairingForGuest => ApiError::field(
                "address_variety",
                "guest checkout cannot use an existing shipping address",
            ),
            CheckoutError::InvalidInput(errors) => ApiError::Unprocessable(errors.to_map()),
            CheckoutError::InvalidOrExpiredToken => {
                ApiError::Unauthorized("invalid or expired authentication token".to_string())
            }
            CheckoutError::DuplicateCartEntry { .. } => ApiError::Conflict(err.to_string()),
            CheckoutError::InsufficientStock(item_id) => {
                ApiError::field("available_stock", format!("not enough for item {item_id}"))
            }
            CheckoutError::NotFound(entity) => ApiError::NotFound(format!("{entity} not found")),
            CheckoutError::StorageTimeout(msg) => ApiError::Unavailable(msg),
            CheckoutError::StorageFailure(msg) => ApiError::Internal(msg),
        }
    }
}
