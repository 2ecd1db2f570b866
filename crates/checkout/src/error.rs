//! Checkout error types.

use domain::{CheckoutRejection, ValidationErrors};
use store::{Entity, ItemId, StoreError, UserId};
use thiserror::Error;

/// Errors that can end a checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// An enum code outside the known variants.
    #[error("Unknown {field} code {value}")]
    InvalidEnum { field: &'static str, value: i64 },

    /// Member checkout without a token.
    #[error("Member checkout requires a token")]
    MissingToken,

    /// Guest checkout carrying a token.
    #[error("Guest checkout must not carry a token")]
    UnexpectedToken,

    /// Guest checkout asked to ship to a stored address.
    #[error("Guest checkout cannot ship to an existing address")]
    InvalidPairingForGuest,

    /// Request fields failed validation.
    #[error("Invalid checkout request: {0}")]
    InvalidInput(ValidationErrors),

    /// The token is unknown, expired, or was issued for another scope.
    #[error("Invalid or expired authentication token")]
    InvalidOrExpiredToken,

    /// The cart already holds a line for this item.
    #[error("Cart for user {user_id} already contains item {item_id}")]
    DuplicateCartEntry { user_id: UserId, item_id: ItemId },

    /// Current stock cannot cover the requested quantity.
    #[error("Insufficient stock for item {0}")]
    InsufficientStock(ItemId),

    /// A referenced record does not exist.
    #[error("Not found: {0}")]
    NotFound(Entity),

    /// A storage call timed out; the request may be retried.
    #[error("Storage timed out: {0}")]
    StorageTimeout(String),

    /// Storage failed; no partial mutation was left behind.
    #[error("Storage failure: {0}")]
    StorageFailure(String),
}

impl CheckoutError {
    /// Returns true if the caller may retry the same request.
    pub fn is_transient(&self) -> bool {
        matches!(self, CheckoutError::StorageTimeout(_))
    }

    /// Returns true for malformed or inconsistent input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CheckoutError::InvalidEnum { .. }
                | CheckoutError::MissingToken
                | CheckoutError::UnexpectedToken
                | CheckoutError::InvalidPairingForGuest
                | CheckoutError::InvalidInput(_)
                | CheckoutError::InvalidOrExpiredToken
        )
    }

    /// Returns true for rejections the caller caused by asking for
    /// something the store cannot give right now.
    pub fn is_business_rejection(&self) -> bool {
        matches!(
            self,
            CheckoutError::DuplicateCartEntry { .. }
                | CheckoutError::InsufficientStock(_)
                | CheckoutError::NotFound(_)
        )
    }

    /// Metric label for this error.
    pub fn reason(&self) -> &'static str {
        match self {
            CheckoutError::InvalidEnum { .. } => "invalid_enum",
            CheckoutError::MissingToken => "missing_token",
            CheckoutError::UnexpectedToken => "unexpected_token",
            CheckoutError::InvalidPairingForGuest => "invalid_pairing_for_guest",
            CheckoutError::InvalidInput(_) => "invalid_input",
            CheckoutError::InvalidOrExpiredToken => "invalid_or_expired_token",
            CheckoutError::DuplicateCartEntry { .. } => "duplicate_cart_entry",
            CheckoutError::InsufficientStock(_) => "insufficient_stock",
            CheckoutError::NotFound(_) => "not_found",
            CheckoutError::StorageTimeout(_) => "storage_timeout",
            CheckoutError::StorageFailure(_) => "storage_failure",
        }
    }
}

impl From<CheckoutRejection> for CheckoutError {
    fn from(rejection: CheckoutRejection) -> Self {
        match rejection {
            CheckoutRejection::InvalidEnum { field, value } => {
                CheckoutError::InvalidEnum { field, value }
            }
            CheckoutRejection::MissingToken => CheckoutError::MissingToken,
            CheckoutRejection::UnexpectedToken => CheckoutError::UnexpectedToken,
            CheckoutRejection::InvalidPairingForGuest => CheckoutError::InvalidPairingForGuest,
            CheckoutRejection::InvalidInput(errors) => CheckoutError::InvalidInput(errors),
        }
    }
}

impl From<StoreError> for CheckoutError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(entity) => CheckoutError::NotFound(entity),
            StoreError::DuplicateCartEntry { user_id, item_id } => {
                CheckoutError::DuplicateCartEntry { user_id, item_id }
            }
            StoreError::InsufficientStock(item_id) => CheckoutError::InsufficientStock(item_id),
            StoreError::TokenExpired => CheckoutError::InvalidOrExpiredToken,
            StoreError::AmountOverflow(item_id) => CheckoutError::InvalidInput(
                ValidationErrors::single(
                    "cart_lines",
                    format!("total price for item {item_id} exceeds the supported amount"),
                ),
            ),
            StoreError::InvalidRequest(message) => {
                CheckoutError::InvalidInput(ValidationErrors::single("cart_lines", message))
            }
            e if e.is_transient() => CheckoutError::StorageTimeout(e.to_string()),
            e => CheckoutError::StorageFailure(e.to_string()),
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
