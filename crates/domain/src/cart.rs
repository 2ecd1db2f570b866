//! Cart service providing a validated, instrumented API over the Cart Store.

use store::{CartDetail, CartLine, CartLineKey, CartStore, NewCartLine, StoreError, UserId};

use crate::error::DomainError;
use crate::validation::{validate_cart_line_key, validate_new_cart_line, validate_quantity};

/// Service for managing cart lines.
///
/// Input is checked before any storage call; stock and duplicate checks
/// are left to the store's conditional writes.
#[derive(Clone)]
pub struct CartService<S: CartStore> {
    store: S,
}

impl<S: CartStore> CartService<S> {
    /// Creates a new cart service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Adds an item to a user's cart.
    #[tracing::instrument(skip(self), fields(user_id = %line.user_id, item_id = %line.item_id))]
    pub async fn add_line(&self, line: NewCartLine) -> Result<CartLine, DomainError> {
        validate_new_cart_line(&line).into_result()?;

        match self.store.insert(line).await {
            Ok(created) => {
                metrics::counter!("cart_lines_inserted_total").increment(1);
                tracing::info!(cart_line_id = %created.id, "Cart line added");
                Ok(created)
            }
            Err(e) => Err(reject(e)),
        }
    }

    /// Changes the quantity of an existing line.
    #[tracing::instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        key: CartLineKey,
        quantity: u32,
    ) -> Result<CartLine, DomainError> {
        validate_cart_line_key(&key)
            .merge(validate_quantity(quantity))
            .into_result()?;

        match self.store.update_quantity(key, quantity).await {
            Ok(updated) => {
                metrics::counter!("cart_lines_updated_total").increment(1);
                Ok(updated)
            }
            Err(e) => Err(reject(e)),
        }
    }

    /// Removes a line from a cart.
    #[tracing::instrument(skip(self))]
    pub async fn remove_line(&self, key: CartLineKey) -> Result<CartLine, DomainError> {
        validate_cart_line_key(&key).into_result()?;

        match self.store.delete(key).await {
            Ok(removed) => {
                metrics::counter!("cart_lines_deleted_total").increment(1);
                Ok(removed)
            }
            Err(e) => Err(reject(e)),
        }
    }

    /// Lists a user's cart with item details, oldest line first.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, user_id: UserId) -> Result<Vec<CartDetail>, DomainError> {
        Ok(self.store.list_by_user(user_id).await?)
    }
}

/// Counts and logs a store rejection, then wraps it.
fn reject(error: StoreError) -> DomainError {
    let reason = rejection_reason(&error);
    metrics::counter!("cart_rejections_total", "reason" => reason).increment(1);
    match &error {
        StoreError::DuplicateCartEntry { .. }
        | StoreError::InsufficientStock(_)
        | StoreError::AmountOverflow(_) => {
            tracing::info!(reason, error = %error, "Cart write rejected");
        }
        StoreError::NotFound(_) => tracing::debug!(reason, error = %error, "Cart write rejected"),
        _ => tracing::warn!(reason, error = %error, "Cart write failed"),
    }
    DomainError::Store(error)
}

fn rejection_reason(error: &StoreError) -> &'static str {
    match error {
        StoreError::DuplicateCartEntry { .. } => "duplicate",
        StoreError::InsufficientStock(_) => "insufficient_stock",
        StoreError::AmountOverflow(_) => "amount_overflow",
        StoreError::NotFound(_) => "not_found",
        StoreError::InvalidRequest(_) => "invalid_request",
        StoreError::Timeout { .. } => "timeout",
        _ => "storage",
    }
}
