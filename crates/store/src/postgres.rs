use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::store::{order_total, validate_order_lines};
use crate::{
    AddressBook, AddressId, Availability, BookSnapshot, CartDetail, CartLine, CartLineId,
    CartLineKey, CartStore, Entity, InventoryLedger, ItemId, Money, NewCartLine, NewOrder, Order,
    OrderId, OrderLine, OrderStore, Result, ShippingAddress, ShippingTarget, StoreError,
    TokenScope, User, UserDirectory, UserId,
};

/// Bound applied to every storage call unless configured otherwise.
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(3);

/// How many times a commit is attempted when it loses to a concurrent writer.
pub const MAX_COMMIT_ATTEMPTS: u32 = 3;

const CART_LINE_COLUMNS: &str = "id, user_id, item_id, quantity, total_price, created_at";

const ADDRESS_COLUMNS: &str = "email, first_name, last_name, addresses, postal_code, \
     province_id, city_id, district_id, subdistrict_id, phone";

/// PostgreSQL-backed store.
///
/// Stock-dependent writes are single conditional statements, and the order
/// commit is one transaction whose per-row decrements only apply while
/// `stock >= quantity` holds.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    timeout: Duration,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store with the default call timeout.
    pub fn new(pool: PgPool) -> Self {
        Self::with_timeout(pool, DEFAULT_STORAGE_TIMEOUT)
    }

    /// Creates a new PostgreSQL store with a custom call timeout.
    pub fn with_timeout(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Opens a pool against `database_url`. Acquiring a connection is bounded
    /// by the same timeout as every other call.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(timeout)
            .connect(database_url)
            .await?;
        Ok(Self::with_timeout(pool, timeout))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Runs `call`, failing with `Timeout` if it outlives the configured bound.
    ///
    /// A transaction inside `call` is dropped on expiry, which rolls it back.
    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, timeout = ?self.timeout, "storage call timed out");
                Err(StoreError::Timeout {
                    operation,
                    timeout: self.timeout,
                })
            }
        }
    }

    fn row_to_cart_line(row: &PgRow) -> Result<CartLine> {
        Ok(CartLine {
            id: CartLineId::new(row.try_get("id")?),
            user_id: UserId::new(row.try_get("user_id")?),
            item_id: ItemId::new(row.try_get("item_id")?),
            quantity: quantity_from(row.try_get("quantity")?, "quantity")?,
            total_price: Money::from_minor(row.try_get("total_price")?),
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_address(row: &PgRow) -> Result<ShippingAddress> {
        Ok(ShippingAddress {
            email: row.try_get("email")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            addresses: row.try_get("addresses")?,
            postal_code: row.try_get("postal_code")?,
            province_id: row.try_get("province_id")?,
            city_id: row.try_get("city_id")?,
            district_id: row.try_get("district_id")?,
            subdistrict_id: row.try_get("subdistrict_id")?,
            phone: row.try_get("phone")?,
        })
    }

    async fn item_exists(&self, item_id: ItemId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM items WHERE id = $1)")
            .bind(item_id.get())
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Explains why a conditional cart write touched no row.
    async fn classify_cart_miss(&self, key: CartLineKey, item_id: Option<ItemId>) -> StoreError {
        let item_id = match item_id {
            Some(id) => id,
            None => match self.line_item(key).await {
                Ok(Some(id)) => id,
                Ok(None) => return StoreError::NotFound(Entity::CartLine(key)),
                Err(e) => return e,
            },
        };

        match self.item_exists(item_id).await {
            Ok(true) => StoreError::InsufficientStock(item_id),
            Ok(false) => StoreError::NotFound(Entity::Item(item_id)),
            Err(e) => e,
        }
    }

    async fn line_item(&self, key: CartLineKey) -> Result<Option<ItemId>> {
        let item_id: Option<i64> = match key {
            CartLineKey::Id(id) => {
                sqlx::query_scalar("SELECT item_id FROM cart_lines WHERE id = $1")
                    .bind(id.get())
                    .fetch_optional(&self.pool)
                    .await?
            }
            CartLineKey::UserItem { user_id, item_id } => {
                sqlx::query_scalar(
                    "SELECT item_id FROM cart_lines WHERE user_id = $1 AND item_id = $2",
                )
                .bind(user_id.get())
                .bind(item_id.get())
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(item_id.map(ItemId::new))
    }

    async fn insert_cart_line(&self, line: NewCartLine) -> Result<CartLine> {
        let sql = format!(
            r#"
            INSERT INTO cart_lines (user_id, item_id, quantity, total_price)
            SELECT $1, items.id, $3, $3 * items.price
            FROM items
            WHERE items.id = $2 AND items.stock >= $3
            RETURNING {CART_LINE_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(line.user_id.get())
            .bind(line.item_id.get())
            .bind(i64::from(line.quantity))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e {
                    if db_err.is_unique_violation() {
                        return StoreError::DuplicateCartEntry {
                            user_id: line.user_id,
                            item_id: line.item_id,
                        };
                    }
                    if db_err.is_foreign_key_violation() {
                        return StoreError::NotFound(Entity::User(line.user_id));
                    }
                }
                if is_out_of_range(&e) {
                    return StoreError::AmountOverflow(line.item_id);
                }
                StoreError::Database(e)
            })?;

        match row {
            Some(row) => Self::row_to_cart_line(&row),
            None => {
                let key = CartLineKey::UserItem {
                    user_id: line.user_id,
                    item_id: line.item_id,
                };
                Err(self.classify_cart_miss(key, Some(line.item_id)).await)
            }
        }
    }

    async fn update_cart_line(&self, key: CartLineKey, quantity: u32) -> Result<CartLine> {
        let returning = "cart_lines.id, cart_lines.user_id, cart_lines.item_id, \
             cart_lines.quantity, cart_lines.total_price, cart_lines.created_at";

        let row = match key {
            CartLineKey::Id(id) => {
                let sql = format!(
                    r#"
                    UPDATE cart_lines
                    SET quantity = $2, total_price = $2 * items.price
                    FROM items
                    WHERE cart_lines.item_id = items.id
                      AND cart_lines.id = $1
                      AND items.stock >= $2
                    RETURNING {returning}
                    "#
                );
                sqlx::query(&sql)
                    .bind(id.get())
                    .bind(i64::from(quantity))
                    .fetch_optional(&self.pool)
                    .await
            }
            CartLineKey::UserItem { user_id, item_id } => {
                let sql = format!(
                    r#"
                    UPDATE cart_lines
                    SET quantity = $3, total_price = $3 * items.price
                    FROM items
                    WHERE cart_lines.item_id = items.id
                      AND cart_lines.user_id = $1
                      AND cart_lines.item_id = $2
                      AND items.stock >= $3
                    RETURNING {returning}
                    "#
                );
                sqlx::query(&sql)
                    .bind(user_id.get())
                    .bind(item_id.get())
                    .bind(i64::from(quantity))
                    .fetch_optional(&self.pool)
                    .await
            }
        };

        let row = match row {
            Ok(row) => row,
            Err(e) if is_out_of_range(&e) => {
                let item_id = self
                    .line_item(key)
                    .await?
                    .ok_or(StoreError::NotFound(Entity::CartLine(key)))?;
                return Err(StoreError::AmountOverflow(item_id));
            }
            Err(e) => return Err(e.into()),
        };

        match row {
            Some(row) => Self::row_to_cart_line(&row),
            None => Err(self.classify_cart_miss(key, None).await),
        }
    }

    async fn delete_cart_line(&self, key: CartLineKey) -> Result<CartLine> {
        let row = match key {
            CartLineKey::Id(id) => {
                let sql = format!("DELETE FROM cart_lines WHERE id = $1 RETURNING {CART_LINE_COLUMNS}");
                sqlx::query(&sql)
                    .bind(id.get())
                    .fetch_optional(&self.pool)
                    .await?
            }
            CartLineKey::UserItem { user_id, item_id } => {
                let sql = format!(
                    "DELETE FROM cart_lines WHERE user_id = $1 AND item_id = $2 \
                     RETURNING {CART_LINE_COLUMNS}"
                );
                sqlx::query(&sql)
                    .bind(user_id.get())
                    .bind(item_id.get())
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        match row {
            Some(row) => Self::row_to_cart_line(&row),
            None => Err(StoreError::NotFound(Entity::CartLine(key))),
        }
    }

    async fn select_cart(&self, user_id: UserId) -> Result<Vec<CartDetail>> {
        let rows = sqlx::query(
            r#"
            SELECT cart_lines.quantity AS line_quantity,
                   items.id, items.cover_url, items.title, items.author,
                   items.identifier, items.price, items.stock
            FROM cart_lines
            INNER JOIN items ON cart_lines.item_id = items.id
            WHERE cart_lines.user_id = $1
            ORDER BY cart_lines.id ASC
            "#,
        )
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<CartDetail> {
                Ok(CartDetail {
                    book: BookSnapshot {
                        id: ItemId::new(row.try_get("id")?),
                        cover_url: row.try_get("cover_url")?,
                        title: row.try_get("title")?,
                        author: row.try_get("author")?,
                        identifier: row.try_get("identifier")?,
                        price: Money::from_minor(row.try_get("price")?),
                        stock: quantity_from(row.try_get("stock")?, "stock")?,
                    },
                    quantity: quantity_from(row.try_get("line_quantity")?, "quantity")?,
                })
            })
            .collect()
    }

    /// One commit attempt inside a single transaction.
    ///
    /// Rows are decremented in ascending item order so concurrent commits
    /// lock in the same order. Returning early drops the transaction, which
    /// rolls back every decrement made so far.
    async fn try_commit(&self, order: &NewOrder) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let mut locking_order: Vec<_> = order.lines.iter().collect();
        locking_order.sort_by_key(|line| line.item_id);

        let mut prices = std::collections::HashMap::with_capacity(order.lines.len());
        for line in locking_order {
            let price: Option<i64> = sqlx::query_scalar(
                "UPDATE items SET stock = stock - $2 WHERE id = $1 AND stock >= $2 RETURNING price",
            )
            .bind(line.item_id.get())
            .bind(i64::from(line.quantity))
            .fetch_optional(&mut *tx)
            .await?;

            match price {
                Some(price) => {
                    prices.insert(line.item_id, Money::from_minor(price));
                }
                None => {
                    let exists: bool =
                        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM items WHERE id = $1)")
                            .bind(line.item_id.get())
                            .fetch_one(&mut *tx)
                            .await?;
                    return Err(if exists {
                        StoreError::InsufficientStock(line.item_id)
                    } else {
                        StoreError::NotFound(Entity::Item(line.item_id))
                    });
                }
            }
        }

        let lines = order
            .lines
            .iter()
            .map(|requested| -> Result<OrderLine> {
                let unit_price = prices
                    .get(&requested.item_id)
                    .copied()
                    .ok_or(StoreError::NotFound(Entity::Item(requested.item_id)))?;
                Ok(OrderLine {
                    item_id: requested.item_id,
                    quantity: requested.quantity,
                    unit_price,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let total = order_total(&lines)?;

        let (shipping_address_id, shipping_address) = match &order.shipping {
            ShippingTarget::New(address) => {
                let id = insert_address(&mut tx, order.user_id, address).await?;
                (id, address.clone())
            }
            ShippingTarget::Existing { id, address } => (*id, address.clone()),
        };

        let order_id = OrderId::new();
        let created_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, shipping_address_id, shipping_address, total, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(order.user_id.map(|id| id.get()))
        .bind(shipping_address_id.get())
        .bind(serde_json::to_value(&shipping_address)?)
        .bind(total.minor())
        .bind(created_at)
        .execute(&mut *tx)
        .await?;

        for (position, line) in lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, position, item_id, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(order_id.as_uuid())
            .bind(position as i32)
            .bind(line.item_id.get())
            .bind(i64::from(line.quantity))
            .bind(line.unit_price.minor())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(Order {
            id: order_id,
            user_id: order.user_id,
            shipping_address_id,
            shipping_address,
            lines,
            total,
            created_at,
        })
    }

    async fn select_order(&self, order_id: OrderId) -> Result<Order> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, user_id, shipping_address_id, shipping_address, total, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or(StoreError::NotFound(Entity::Order(order_id)))?;

        let line_rows = sqlx::query(
            r#"
            SELECT item_id, quantity, unit_price
            FROM order_lines
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let lines = line_rows
            .iter()
            .map(|line| -> Result<OrderLine> {
                Ok(OrderLine {
                    item_id: ItemId::new(line.try_get("item_id")?),
                    quantity: quantity_from(line.try_get("quantity")?, "quantity")?,
                    unit_price: Money::from_minor(line.try_get("unit_price")?),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let address_json: serde_json::Value = row.try_get("shipping_address")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: row.try_get::<Option<i64>, _>("user_id")?.map(UserId::new),
            shipping_address_id: AddressId::new(row.try_get("shipping_address_id")?),
            shipping_address: serde_json::from_value(address_json)?,
            lines,
            total: Money::from_minor(row.try_get("total")?),
            created_at: row.try_get("created_at")?,
        })
    }

    async fn select_user_for_token(&self, scope: TokenScope, token: &str) -> Result<User> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT users.id, users.email, users.first_name, users.last_name,
                   users.activated, tokens.expiry
            FROM users
            INNER JOIN tokens ON tokens.user_id = users.id
            WHERE tokens.hash = sha256(convert_to($1, 'UTF8'))
              AND tokens.scope = $2
            "#,
        )
        .bind(token)
        .bind(scope.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or(StoreError::NotFound(Entity::Token))?;

        let expiry: DateTime<Utc> = row.try_get("expiry")?;
        if expiry <= Utc::now() {
            return Err(StoreError::TokenExpired);
        }

        Ok(User {
            id: UserId::new(row.try_get("id")?),
            email: row.try_get("email")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            activated: row.try_get("activated")?,
        })
    }

    async fn select_owned_address(
        &self,
        user_id: UserId,
        address_id: AddressId,
    ) -> Result<ShippingAddress> {
        let sql =
            format!("SELECT {ADDRESS_COLUMNS} FROM shipping_addresses WHERE id = $1 AND user_id = $2");
        let row: Option<PgRow> = sqlx::query(&sql)
            .bind(address_id.get())
            .bind(user_id.get())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::row_to_address(&row),
            None => Err(StoreError::NotFound(Entity::ShippingAddress(address_id))),
        }
    }
}

async fn insert_address(
    tx: &mut Transaction<'_, Postgres>,
    owner: Option<UserId>,
    address: &ShippingAddress,
) -> Result<AddressId> {
    let sql = format!(
        "INSERT INTO shipping_addresses (user_id, {ADDRESS_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING id"
    );
    let id: i64 = sqlx::query_scalar(&sql)
        .bind(owner.map(|id| id.get()))
        .bind(&address.email)
        .bind(&address.first_name)
        .bind(&address.last_name)
        .bind(&address.addresses)
        .bind(&address.postal_code)
        .bind(address.province_id)
        .bind(address.city_id)
        .bind(address.district_id)
        .bind(address.subdistrict_id)
        .bind(&address.phone)
        .fetch_one(&mut **tx)
        .await?;
    Ok(AddressId::new(id))
}

fn quantity_from(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::InvalidRow(format!("{column} out of range: {value}")))
}

/// Serialization failures and deadlocks are safe to retry from the top.
fn is_retryable(err: &StoreError) -> bool {
    let StoreError::Database(sqlx::Error::Database(db_err)) = err else {
        return false;
    };
    matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
}

/// `numeric_value_out_of_range`, raised when `quantity * price` leaves BIGINT.
fn is_out_of_range(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db_err) = err else {
        return false;
    };
    db_err.code().as_deref() == Some("22003")
}

fn ensure_positive(quantity: u32) -> Result<()> {
    if quantity == 0 {
        return Err(StoreError::InvalidRequest(
            "Cart quantity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl InventoryLedger for PostgresStore {
    async fn get_availability(&self, item_id: ItemId) -> Result<Availability> {
        self.bounded("get_availability", async {
            let row: Option<PgRow> = sqlx::query("SELECT price, stock FROM items WHERE id = $1")
                .bind(item_id.get())
                .fetch_optional(&self.pool)
                .await?;
            let row = row.ok_or(StoreError::NotFound(Entity::Item(item_id)))?;

            Ok(Availability {
                unit_price: Money::from_minor(row.try_get("price")?),
                available_quantity: quantity_from(row.try_get("stock")?, "stock")?,
            })
        })
        .await
    }
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn insert(&self, line: NewCartLine) -> Result<CartLine> {
        ensure_positive(line.quantity)?;
        self.bounded("insert_cart_line", self.insert_cart_line(line))
            .await
    }

    async fn update_quantity(&self, key: CartLineKey, quantity: u32) -> Result<CartLine> {
        ensure_positive(quantity)?;
        self.bounded("update_cart_quantity", self.update_cart_line(key, quantity))
            .await
    }

    async fn delete(&self, key: CartLineKey) -> Result<CartLine> {
        self.bounded("delete_cart_line", self.delete_cart_line(key))
            .await
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<CartDetail>> {
        self.bounded("list_cart", self.select_cart(user_id)).await
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn commit_order(&self, order: NewOrder) -> Result<Order> {
        validate_order_lines(&order.lines)?;

        let mut attempt = 1;
        loop {
            match self.bounded("commit_order", self.try_commit(&order)).await {
                Err(e) if is_retryable(&e) => {
                    if attempt >= MAX_COMMIT_ATTEMPTS {
                        tracing::warn!(attempts = attempt, "commit abandoned under contention");
                        return Err(StoreError::Contention { attempts: attempt });
                    }
                    metrics::counter!("store_commit_retries_total").increment(1);
                    tracing::debug!(attempt, error = %e, "commit lost to a concurrent writer, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.bounded("get_order", self.select_order(order_id)).await
    }
}

#[async_trait]
impl UserDirectory for PostgresStore {
    async fn resolve_user(&self, scope: TokenScope, token: &str) -> Result<User> {
        self.bounded("resolve_user", self.select_user_for_token(scope, token))
            .await
    }
}

#[async_trait]
impl AddressBook for PostgresStore {
    async fn get_owned_address(
        &self,
        user_id: UserId,
        address_id: AddressId,
    ) -> Result<ShippingAddress> {
        self.bounded(
            "get_owned_address",
            self.select_owned_address(user_id, address_id),
        )
        .await
    }
}
