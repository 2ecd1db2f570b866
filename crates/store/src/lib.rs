//! Persistence for the cart/checkout engine.
//!
//! Every write that depends on stock is a conditional write: the predicate
//! and the mutation happen in one storage step. Two backends implement the
//! same traits, an in-memory store for tests and local runs and a
//! PostgreSQL store for deployments.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use common::{AddressId, CartLineId, ItemId, Money, OrderId, UserId};
pub use error::{Entity, Result, StoreError};
pub use memory::InMemoryStore;
pub use model::{
    Availability, BookSnapshot, CartDetail, CartLine, CartLineKey, Item, NewCartLine, NewOrder,
    Order, OrderLine, OrderRequestLine, ShippingAddress, ShippingTarget, TokenScope, User,
};
pub use postgres::{DEFAULT_STORAGE_TIMEOUT, MAX_COMMIT_ATTEMPTS, PostgresStore};
pub use store::{
    AddressBook, CartStore, InventoryLedger, OrderStore, UserDirectory, line_total, order_total,
};
