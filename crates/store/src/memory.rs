use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::store::{line_total, order_total, validate_order_lines};
use crate::{
    AddressBook, AddressId, Availability, BookSnapshot, CartDetail, CartLine, CartLineId,
    CartLineKey, CartStore, Entity, InventoryLedger, Item, ItemId, Money, NewCartLine, NewOrder,
    Order, OrderId, OrderLine, OrderStore, Result, ShippingAddress, ShippingTarget, StoreError,
    TokenScope, User, UserDirectory, UserId,
};

#[derive(Debug, Clone)]
struct TokenRecord {
    user_id: UserId,
    expiry: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredAddress {
    owner: Option<UserId>,
    address: ShippingAddress,
}

#[derive(Debug, Default)]
struct StoreState {
    items: HashMap<ItemId, Item>,
    users: HashMap<UserId, User>,
    tokens: HashMap<(TokenScope, String), TokenRecord>,
    addresses: HashMap<AddressId, StoredAddress>,
    next_address_id: i64,
    /// Keyed by id; ids are assigned in increasing order, so iteration is
    /// insertion order.
    cart_lines: BTreeMap<CartLineId, CartLine>,
    next_cart_line_id: i64,
    orders: HashMap<OrderId, Order>,
    ledger_reads: usize,
    fail_commit_with_timeout: bool,
}

impl StoreState {
    fn find_line_id(&self, key: &CartLineKey) -> Option<CartLineId> {
        match key {
            CartLineKey::Id(id) => self.cart_lines.contains_key(id).then_some(*id),
            CartLineKey::UserItem { user_id, item_id } => self
                .cart_lines
                .values()
                .find(|line| line.user_id == *user_id && line.item_id == *item_id)
                .map(|line| line.id),
        }
    }

    fn store_address(&mut self, owner: Option<UserId>, address: ShippingAddress) -> AddressId {
        self.next_address_id += 1;
        let id = AddressId::new(self.next_address_id);
        self.addresses.insert(id, StoredAddress { owner, address });
        id
    }
}

/// In-memory store for tests and local runs.
///
/// All state sits behind one lock. Every conditional write evaluates its
/// predicate and applies its mutation under the same write guard, which gives
/// the same all-or-nothing outcome as the PostgreSQL statements.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an inventory item.
    pub async fn put_item(&self, item: Item) {
        self.state.write().await.items.insert(item.id, item);
    }

    /// Adds or replaces a user.
    pub async fn put_user(&self, user: User) {
        self.state.write().await.users.insert(user.id, user);
    }

    /// Registers a plaintext token for a user.
    pub async fn put_token(
        &self,
        scope: TokenScope,
        token: impl Into<String>,
        user_id: UserId,
        ttl: Duration,
    ) {
        let expiry = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
        self.put_token_expiring_at(scope, token, user_id, expiry)
            .await;
    }

    /// Registers a plaintext token with an explicit expiry.
    pub async fn put_token_expiring_at(
        &self,
        scope: TokenScope,
        token: impl Into<String>,
        user_id: UserId,
        expiry: DateTime<Utc>,
    ) {
        self.state
            .write()
            .await
            .tokens
            .insert((scope, token.into()), TokenRecord { user_id, expiry });
    }

    /// Stores an address owned by `user_id` and returns its id.
    pub async fn put_address(&self, user_id: UserId, address: ShippingAddress) -> AddressId {
        self.state
            .write()
            .await
            .store_address(Some(user_id), address)
    }

    /// Changes an item's unit price.
    pub async fn set_price(&self, item_id: ItemId, price: Money) {
        if let Some(item) = self.state.write().await.items.get_mut(&item_id) {
            item.price = price;
        }
    }

    /// Changes an item's stock level.
    pub async fn set_stock(&self, item_id: ItemId, stock: u32) {
        if let Some(item) = self.state.write().await.items.get_mut(&item_id) {
            item.stock = stock;
        }
    }

    /// Returns an item's current stock.
    pub async fn stock_of(&self, item_id: ItemId) -> Option<u32> {
        self.state.read().await.items.get(&item_id).map(|i| i.stock)
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns the number of cart lines across all users.
    pub async fn cart_line_count(&self) -> usize {
        self.state.read().await.cart_lines.len()
    }

    /// Returns how many ledger reads have been served.
    pub async fn ledger_reads(&self) -> usize {
        self.state.read().await.ledger_reads
    }

    /// Makes the next commits fail as if storage had timed out.
    pub async fn set_fail_commit_with_timeout(&self, fail: bool) {
        self.state.write().await.fail_commit_with_timeout = fail;
    }
}

#[async_trait]
impl InventoryLedger for InMemoryStore {
    async fn get_availability(&self, item_id: ItemId) -> Result<Availability> {
        let mut state = self.state.write().await;
        state.ledger_reads += 1;
        let item = state
            .items
            .get(&item_id)
            .ok_or(StoreError::NotFound(Entity::Item(item_id)))?;

        Ok(Availability {
            unit_price: item.price,
            available_quantity: item.stock,
        })
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn insert(&self, line: NewCartLine) -> Result<CartLine> {
        if line.quantity == 0 {
            return Err(StoreError::InvalidRequest(
                "Cart quantity must be greater than zero".to_string(),
            ));
        }

        let mut state = self.state.write().await;

        if !state.users.contains_key(&line.user_id) {
            return Err(StoreError::NotFound(Entity::User(line.user_id)));
        }

        let item = state
            .items
            .get(&line.item_id)
            .ok_or(StoreError::NotFound(Entity::Item(line.item_id)))?;
        if line.quantity > item.stock {
            return Err(StoreError::InsufficientStock(line.item_id));
        }
        let total_price = line_total(line.item_id, item.price, line.quantity)?;

        let key = CartLineKey::UserItem {
            user_id: line.user_id,
            item_id: line.item_id,
        };
        if state.find_line_id(&key).is_some() {
            return Err(StoreError::DuplicateCartEntry {
                user_id: line.user_id,
                item_id: line.item_id,
            });
        }

        state.next_cart_line_id += 1;
        let cart_line = CartLine {
            id: CartLineId::new(state.next_cart_line_id),
            user_id: line.user_id,
            item_id: line.item_id,
            quantity: line.quantity,
            total_price,
            created_at: Utc::now(),
        };
        state.cart_lines.insert(cart_line.id, cart_line.clone());

        Ok(cart_line)
    }

    async fn update_quantity(&self, key: CartLineKey, quantity: u32) -> Result<CartLine> {
        if quantity == 0 {
            return Err(StoreError::InvalidRequest(
                "Cart quantity must be greater than zero".to_string(),
            ));
        }

        let mut state = self.state.write().await;

        let line_id = state
            .find_line_id(&key)
            .ok_or(StoreError::NotFound(Entity::CartLine(key)))?;
        let item_id = state.cart_lines[&line_id].item_id;
        let item = state
            .items
            .get(&item_id)
            .ok_or(StoreError::NotFound(Entity::Item(item_id)))?;
        if quantity > item.stock {
            return Err(StoreError::InsufficientStock(item_id));
        }
        let total_price = line_total(item_id, item.price, quantity)?;

        let line = state
            .cart_lines
            .get_mut(&line_id)
            .ok_or(StoreError::NotFound(Entity::CartLine(key)))?;
        line.quantity = quantity;
        line.total_price = total_price;

        Ok(line.clone())
    }

    async fn delete(&self, key: CartLineKey) -> Result<CartLine> {
        let mut state = self.state.write().await;
        let line_id = state
            .find_line_id(&key)
            .ok_or(StoreError::NotFound(Entity::CartLine(key)))?;
        state
            .cart_lines
            .remove(&line_id)
            .ok_or(StoreError::NotFound(Entity::CartLine(key)))
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<CartDetail>> {
        let state = self.state.read().await;
        let details = state
            .cart_lines
            .values()
            .filter(|line| line.user_id == user_id)
            .filter_map(|line| {
                state.items.get(&line.item_id).map(|item| CartDetail {
                    book: BookSnapshot::from(item),
                    quantity: line.quantity,
                })
            })
            .collect();
        Ok(details)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn commit_order(&self, order: NewOrder) -> Result<Order> {
        validate_order_lines(&order.lines)?;

        let mut state = self.state.write().await;

        if state.fail_commit_with_timeout {
            return Err(StoreError::Timeout {
                operation: "commit_order",
                timeout: Duration::ZERO,
            });
        }

        // Check every line before touching anything.
        let mut lines = Vec::with_capacity(order.lines.len());
        for requested in &order.lines {
            let item = state
                .items
                .get(&requested.item_id)
                .ok_or(StoreError::NotFound(Entity::Item(requested.item_id)))?;
            if requested.quantity > item.stock {
                return Err(StoreError::InsufficientStock(requested.item_id));
            }
            lines.push(OrderLine {
                item_id: requested.item_id,
                quantity: requested.quantity,
                unit_price: item.price,
            });
        }

        if let ShippingTarget::Existing { id, .. } = &order.shipping
            && !state.addresses.contains_key(id)
        {
            return Err(StoreError::NotFound(Entity::ShippingAddress(*id)));
        }
        let total = order_total(&lines)?;

        for line in &lines {
            if let Some(item) = state.items.get_mut(&line.item_id) {
                item.stock -= line.quantity;
            }
        }

        let (shipping_address_id, shipping_address) = match order.shipping {
            ShippingTarget::New(address) => {
                let id = state.store_address(order.user_id, address.clone());
                (id, address)
            }
            ShippingTarget::Existing { id, address } => (id, address),
        };

        let committed = Order {
            id: OrderId::new(),
            user_id: order.user_id,
            shipping_address_id,
            shipping_address,
            lines,
            total,
            created_at: Utc::now(),
        };
        state.orders.insert(committed.id, committed.clone());

        Ok(committed)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.state
            .read()
            .await
            .orders
            .get(&order_id)
            .cloned()
            .ok_or(StoreError::NotFound(Entity::Order(order_id)))
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn resolve_user(&self, scope: TokenScope, token: &str) -> Result<User> {
        let state = self.state.read().await;
        let record = state
            .tokens
            .get(&(scope, token.to_string()))
            .ok_or(StoreError::NotFound(Entity::Token))?;

        if record.expiry <= Utc::now() {
            return Err(StoreError::TokenExpired);
        }

        state
            .users
            .get(&record.user_id)
            .cloned()
            .ok_or(StoreError::NotFound(Entity::User(record.user_id)))
    }
}

#[async_trait]
impl AddressBook for InMemoryStore {
    async fn get_owned_address(
        &self,
        user_id: UserId,
        address_id: AddressId,
    ) -> Result<ShippingAddress> {
        let state = self.state.read().await;
        state
            .addresses
            .get(&address_id)
            .filter(|stored| stored.owner == Some(user_id))
            .map(|stored| stored.address.clone())
            .ok_or(StoreError::NotFound(Entity::ShippingAddress(address_id)))
    }
}
