//! Records read and written by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AddressId, CartLineId, ItemId, Money, OrderId, UserId};

/// An inventory record: one book edition with its price and stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    pub author: Option<String>,
    pub cover_url: Option<String>,
    /// ISBN or other catalogue identifier.
    pub identifier: Option<String>,
    pub price: Money,
    pub stock: u32,
}

impl Item {
    /// Creates an item with no optional catalogue details.
    pub fn new(id: ItemId, title: impl Into<String>, price: Money, stock: u32) -> Self {
        Self {
            id,
            title: title.into(),
            author: None,
            cover_url: None,
            identifier: None,
            price,
            stock,
        }
    }

    /// Sets the author.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
}

/// Price and stock of an item as seen by the ledger at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub unit_price: Money,
    pub available_quantity: u32,
}

/// Input for a cart insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct NewCartLine {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub quantity: u32,
}

/// A persisted cart line.
///
/// `total_price` is the snapshot `quantity × unit price` taken when the
/// line was inserted or last updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CartLineId,
    pub user_id: UserId,
    pub item_id: ItemId,
    pub quantity: u32,
    pub total_price: Money,
    pub created_at: DateTime<Utc>,
}

/// Addresses a single cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CartLineKey {
    Id(CartLineId),
    UserItem { user_id: UserId, item_id: ItemId },
}

impl std::fmt::Display for CartLineKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CartLineKey::Id(id) => write!(f, "#{id}"),
            CartLineKey::UserItem { user_id, item_id } => {
                write!(f, "user {user_id} / item {item_id}")
            }
        }
    }
}

/// Item columns joined onto a cart line for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookSnapshot {
    pub id: ItemId,
    pub cover_url: Option<String>,
    pub title: String,
    pub author: Option<String>,
    pub identifier: Option<String>,
    pub price: Money,
    pub stock: u32,
}

impl From<&Item> for BookSnapshot {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id,
            cover_url: item.cover_url.clone(),
            title: item.title.clone(),
            author: item.author.clone(),
            identifier: item.identifier.clone(),
            price: item.price,
            stock: item.stock,
        }
    }
}

/// A cart line joined with the current state of its item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartDetail {
    pub book: BookSnapshot,
    pub quantity: u32,
}

/// Postal destination for an order.
///
/// Every field defaults to empty so an incomplete payload reaches
/// validation instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShippingAddress {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub addresses: String,
    pub postal_code: String,
    pub province_id: i64,
    pub city_id: i64,
    pub district_id: i64,
    pub subdistrict_id: i64,
    pub phone: String,
}

/// A registered user as resolved from a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub activated: bool,
}

/// What a token was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenScope {
    Activation,
    Authentication,
}

impl TokenScope {
    /// The scope name as persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenScope::Activation => "activation",
            TokenScope::Authentication => "authentication",
        }
    }
}

/// One requested purchase line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequestLine {
    pub item_id: ItemId,
    pub quantity: u32,
}

/// Where a committed order ships to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShippingTarget {
    /// A freshly supplied address, persisted as part of the commit.
    New(ShippingAddress),
    /// A stored address already resolved for the buyer.
    Existing {
        id: AddressId,
        address: ShippingAddress,
    },
}

/// Input for an order commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    /// Absent for guest checkout.
    pub user_id: Option<UserId>,
    pub shipping: ShippingTarget,
    pub lines: Vec<OrderRequestLine>,
}

/// A purchased line with the unit price captured at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub item_id: ItemId,
    pub quantity: u32,
    pub unit_price: Money,
}

/// A committed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: Option<UserId>,
    pub shipping_address_id: AddressId,
    pub shipping_address: ShippingAddress,
    pub lines: Vec<OrderLine>,
    /// Sum of line totals, checked before the commit is applied.
    pub total: Money,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipping_address_tolerates_missing_fields() {
        let address: ShippingAddress =
            serde_json::from_str(r#"{"email": "a@example.com"}"#).unwrap();
        assert_eq!(address.email, "a@example.com");
        assert!(address.first_name.is_empty());
        assert_eq!(address.province_id, 0);
    }

    #[test]
    fn token_scope_names() {
        assert_eq!(TokenScope::Authentication.as_str(), "authentication");
        assert_eq!(TokenScope::Activation.as_str(), "activation");
    }
}
