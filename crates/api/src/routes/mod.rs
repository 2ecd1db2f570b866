//! HTTP route handlers.

pub mod carts;
pub mod checkout;
pub mod health;
pub mod metrics;
pub mod orders;

use ::checkout::CheckoutCoordinator;
use domain::CartService;

use crate::Backend;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Backend> {
    pub cart_service: CartService<S>,
    pub checkout: CheckoutCoordinator<S, S, S>,
}

impl<S: Backend> AppState<S> {
    /// Wires every service to the same backend.
    pub fn new(store: S) -> Self {
        Self {
            cart_service: CartService::new(store.clone()),
            checkout: CheckoutCoordinator::new(store.clone(), store.clone(), store),
        }
    }
}
