//! Checkout transaction for the bookstore.
//!
//! A checkout runs these steps in order, stopping at the first failure:
//! 1. Validate the request (no collaborator is touched)
//! 2. Resolve the member from their token (guests skip this)
//! 3. Re-check stock for every line against the current ledger
//! 4. Resolve the shipping address
//! 5. Commit: decrement stock and record the order, all or nothing
//!
//! After a member's commit, the purchased lines are cleared from their cart.

pub mod coordinator;
pub mod error;
pub mod state;

pub use coordinator::CheckoutCoordinator;
pub use error::{CheckoutError, Result};
pub use state::CheckoutStep;
