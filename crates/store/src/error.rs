use std::time::Duration;

use thiserror::Error;

use crate::{AddressId, CartLineKey, ItemId, OrderId, UserId};

/// The kind of record a lookup failed to find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    Item(ItemId),
    CartLine(CartLineKey),
    Order(OrderId),
    ShippingAddress(AddressId),
    User(UserId),
    Token,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Item(id) => write!(f, "item {id}"),
            Entity::CartLine(key) => write!(f, "cart line {key}"),
            Entity::Order(id) => write!(f, "order {id}"),
            Entity::ShippingAddress(id) => write!(f, "shipping address {id}"),
            Entity::User(id) => write!(f, "user {id}"),
            Entity::Token => write!(f, "token"),
        }
    }
}

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed record does not exist.
    #[error("Not found: {0}")]
    NotFound(Entity),

    /// The user's cart already holds a line for this item.
    #[error("Cart for user {user_id} already contains item {item_id}")]
    DuplicateCartEntry { user_id: UserId, item_id: ItemId },

    /// The conditional stock check failed at write time.
    #[error("Insufficient stock for item {0}")]
    InsufficientStock(ItemId),

    /// Pricing the request would overflow the money representation.
    #[error("Total price for item {0} exceeds the supported amount")]
    AmountOverflow(ItemId),

    /// The token exists but is past its expiry.
    #[error("Token has expired")]
    TokenExpired,

    /// The request was rejected before reaching storage.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A storage call did not finish within its time bound.
    #[error("Storage call '{operation}' timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// The commit kept losing to concurrent writers.
    #[error("Commit abandoned after {attempts} attempts under contention")]
    Contention { attempts: u32 },

    /// A persisted row could not be mapped back into the model.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if the caller may retry the same request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Timeout { .. } | StoreError::Database(sqlx::Error::PoolTimedOut)
        )
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
