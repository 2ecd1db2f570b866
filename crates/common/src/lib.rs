//! Shared types used across the bookstore crates.

mod money;
mod types;

pub use money::Money;
pub use types::{AddressId, CartLineId, ItemId, OrderId, UserId};
