use std::collections::HashSet;

use async_trait::async_trait;

use crate::{
    AddressId, Availability, CartDetail, CartLine, CartLineKey, ItemId, Money, NewCartLine,
    NewOrder, Order, OrderId, OrderLine, OrderRequestLine, Result, ShippingAddress, StoreError,
    TokenScope, User, UserId,
};

/// Read access to the authoritative price and stock of each item.
///
/// A read here and a later decrement are not atomic with each other; only
/// [`OrderStore::commit_order`] re-checks and mutates stock in one step.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Returns the current unit price and available quantity of an item.
    ///
    /// Fails with `NotFound` if the item does not exist.
    async fn get_availability(&self, item_id: ItemId) -> Result<Availability>;
}

/// Per-user cart lines.
///
/// Inserts and quantity updates are conditional writes: they take effect
/// only if the requested quantity is within the item's stock at the moment
/// of the write. Cart operations never change stock.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Inserts a line priced at the item's current unit price.
    ///
    /// Fails with `DuplicateCartEntry` if the user already has a line for the
    /// item, or `InsufficientStock` if the quantity exceeds stock.
    async fn insert(&self, line: NewCartLine) -> Result<CartLine>;

    /// Sets a line's quantity and re-snapshots its total price.
    async fn update_quantity(&self, key: CartLineKey, quantity: u32) -> Result<CartLine>;

    /// Removes a line, returning what was removed.
    async fn delete(&self, key: CartLineKey) -> Result<CartLine>;

    /// Returns the user's lines joined with item details, in insertion order.
    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<CartDetail>>;
}

/// Order persistence.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Decrements stock for every line and records the order, all or nothing.
    ///
    /// Unit prices are captured from the ledger inside the same step. If any
    /// line would drive stock negative nothing is written and the first such
    /// item is reported as `InsufficientStock`.
    async fn commit_order(&self, order: NewOrder) -> Result<Order>;

    /// Loads a committed order.
    async fn get_order(&self, order_id: OrderId) -> Result<Order>;
}

/// Token-to-user resolution.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fails with `NotFound(Token)` for unknown tokens and `TokenExpired`
    /// for tokens past their expiry.
    async fn resolve_user(&self, scope: TokenScope, token: &str) -> Result<User>;
}

/// Stored shipping addresses.
#[async_trait]
pub trait AddressBook: Send + Sync {
    /// Returns the address only if `user_id` owns it.
    async fn get_owned_address(
        &self,
        user_id: UserId,
        address_id: AddressId,
    ) -> Result<ShippingAddress>;
}

/// Rejects line sets no backend should attempt to commit.
pub fn validate_order_lines(lines: &[OrderRequestLine]) -> Result<()> {
    if lines.is_empty() {
        return Err(StoreError::InvalidRequest(
            "Cannot commit an order without lines".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(lines.len());
    for line in lines {
        if line.quantity == 0 {
            return Err(StoreError::InvalidRequest(format!(
                "Quantity for item {} must be greater than zero",
                line.item_id
            )));
        }
        if !seen.insert(line.item_id) {
            return Err(StoreError::InvalidRequest(format!(
                "Item {} appears more than once",
                line.item_id
            )));
        }
    }

    Ok(())
}

/// Prices `quantity` units of an item, failing with `AmountOverflow` when
/// the product does not fit.
pub fn line_total(item_id: ItemId, unit_price: Money, quantity: u32) -> Result<Money> {
    unit_price
        .checked_multiply(quantity)
        .ok_or(StoreError::AmountOverflow(item_id))
}

/// Sums the priced lines of an order.
pub fn order_total(lines: &[OrderLine]) -> Result<Money> {
    lines.iter().try_fold(Money::zero(), |total, line| {
        line_total(line.item_id, line.unit_price, line.quantity)?
            .checked_add(total)
            .ok_or(StoreError::AmountOverflow(line.item_id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(item: i64, quantity: u32) -> OrderRequestLine {
        OrderRequestLine {
            item_id: ItemId::new(item),
            quantity,
        }
    }

    #[test]
    fn accepts_distinct_positive_lines() {
        assert!(validate_order_lines(&[line(1, 2), line(2, 1)]).is_ok());
    }

    #[test]
    fn rejects_empty_lines() {
        assert!(matches!(
            validate_order_lines(&[]),
            Err(StoreError::InvalidRequest(_))
        ));
    }

    #[test]
    fn rejects_zero_quantity() {
        assert!(matches!(
            validate_order_lines(&[line(1, 0)]),
            Err(StoreError::InvalidRequest(_))
        ));
    }

    #[test]
    fn rejects_repeated_item() {
        let result = validate_order_lines(&[line(1, 1), line(1, 2)]);
        assert!(matches!(result, Err(StoreError::InvalidRequest(msg)) if msg.contains("Item 1")));
    }

    fn priced(item: i64, quantity: u32, unit_price: i64) -> OrderLine {
        OrderLine {
            item_id: ItemId::new(item),
            quantity,
            unit_price: Money::from_minor(unit_price),
        }
    }

    #[test]
    fn order_total_uses_captured_prices() {
        let total = order_total(&[priced(1, 2, 1000), priced(2, 1, 500)]).unwrap();
        assert_eq!(total, Money::from_minor(2500));
    }

    #[test]
    fn line_total_overflow_names_the_item() {
        let result = line_total(ItemId::new(9), Money::from_minor(i64::MAX / 2), 3);
        assert!(matches!(result, Err(StoreError::AmountOverflow(id)) if id == ItemId::new(9)));
    }

    #[test]
    fn order_total_overflow_across_lines() {
        let half = i64::MAX / 2 + 1;
        let result = order_total(&[priced(1, 1, half), priced(2, 1, half)]);
        assert!(matches!(result, Err(StoreError::AmountOverflow(id)) if id == ItemId::new(2)));
    }
}
