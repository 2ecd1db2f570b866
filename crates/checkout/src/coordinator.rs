//! Checkout coordinator turning a checkout request into a committed order.

use std::time::Instant;

use domain::{CheckoutMode, CheckoutRequest, ShippingDestination, validate_checkout};
use store::{
    AddressBook, CartLineKey, CartStore, InventoryLedger, Money, NewOrder, Order, OrderId,
    OrderRequestLine, OrderStore, ShippingTarget, StoreError, TokenScope, User, UserDirectory,
    UserId, line_total,
};

use crate::error::{CheckoutError, Result};
use crate::state::CheckoutStep;

/// Orchestrates one checkout per call.
///
/// Steps run in a single linear pass and stop at the first failure. Every
/// step before [`CheckoutStep::Commit`] only reads; the commit itself is
/// all-or-nothing in the store, so a failed checkout never leaves stock or
/// orders half-written.
pub struct CheckoutCoordinator<S, U, A>
where
    S: InventoryLedger + OrderStore + CartStore,
    U: UserDirectory,
    A: AddressBook,
{
    store: S,
    users: U,
    addresses: A,
}

impl<S, U, A> CheckoutCoordinator<S, U, A>
where
    S: InventoryLedger + OrderStore + CartStore,
    U: UserDirectory,
    A: AddressBook,
{
    /// Creates a new checkout coordinator.
    pub fn new(store: S, users: U, addresses: A) -> Self {
        Self {
            store,
            users,
            addresses,
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs a checkout and returns the committed order.
    #[tracing::instrument(
        skip(self, request),
        fields(
            checkout_type = request.checkout_type,
            address_variety = request.address_variety,
            lines = request.cart_lines.len()
        )
    )]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<Order> {
        metrics::counter!("checkout_attempts_total").increment(1);
        let started = Instant::now();

        let mut step = CheckoutStep::default();
        let result = self.run(request, &mut step).await;

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("checkout_completed_total").increment(1);
                tracing::info!(
                    order_id = %order.id,
                    total = %order.total,
                    "checkout completed"
                );
            }
            Err(e) => {
                let reason = e.reason();
                metrics::counter!("checkout_failures_total", "reason" => reason).increment(1);
                if e.is_validation() || e.is_business_rejection() {
                    tracing::info!(%step, reason, error = %e, "checkout rejected");
                } else {
                    tracing::warn!(%step, reason, error = %e, "checkout failed");
                }
            }
        }

        result
    }

    /// Loads a committed order.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        Ok(self.store.get_order(order_id).await?)
    }

    async fn run(&self, request: CheckoutRequest, step: &mut CheckoutStep) -> Result<Order> {
        // 1. Validate
        tracing::debug!(%step, "checkout step started");
        let validated = validate_checkout(request)?;

        // 2. Resolve identity
        advance(step);
        let member = match &validated.mode {
            CheckoutMode::Member { token } => Some(self.resolve_member(token).await?),
            CheckoutMode::Guest => None,
        };

        // 3. Verify stock against the ledger as it stands now
        advance(step);
        self.verify_stock(&validated.lines).await?;

        // 4. Resolve shipping address
        advance(step);
        let shipping = match validated.destination {
            ShippingDestination::New(address) => ShippingTarget::New(address),
            ShippingDestination::Existing(address_id) => {
                let user = member
                    .as_ref()
                    .ok_or(CheckoutError::InvalidPairingForGuest)?;
                let address = self
                    .addresses
                    .get_owned_address(user.id, address_id)
                    .await?;
                ShippingTarget::Existing {
                    id: address_id,
                    address,
                }
            }
        };

        // 5. Commit
        advance(step);
        let order = self
            .store
            .commit_order(NewOrder {
                user_id: member.as_ref().map(|u| u.id),
                shipping,
                lines: validated.lines,
            })
            .await?;

        // 6. Clear purchased lines from the member's cart
        if let Some(user) = &member {
            advance(step);
            self.clear_cart(user.id, &order).await;
        }

        Ok(order)
    }

    async fn resolve_member(&self, token: &str) -> Result<User> {
        self.users
            .resolve_user(TokenScope::Authentication, token)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) | StoreError::TokenExpired => {
                    CheckoutError::InvalidOrExpiredToken
                }
                other => other.into(),
            })
    }

    /// Fails on the first line, in request order, that current stock cannot
    /// cover, or once the priced lines no longer fit in [`Money`].
    async fn verify_stock(&self, lines: &[OrderRequestLine]) -> Result<()> {
        let mut estimated = Money::zero();
        for line in lines {
            let availability = self.store.get_availability(line.item_id).await?;
            if line.quantity > availability.available_quantity {
                tracing::debug!(
                    item_id = %line.item_id,
                    requested = line.quantity,
                    available = availability.available_quantity,
                    "insufficient stock"
                );
                return Err(CheckoutError::InsufficientStock(line.item_id));
            }
            estimated = line_total(line.item_id, availability.unit_price, line.quantity)?
                .checked_add(estimated)
                .ok_or(StoreError::AmountOverflow(line.item_id))?;
        }
        Ok(())
    }

    /// Removes purchased items from the member's cart. Never fails the
    /// checkout: the order already exists.
    async fn clear_cart(&self, user_id: UserId, order: &Order) {
        let mut cleared = 0usize;
        for line in &order.lines {
            let key = CartLineKey::UserItem {
                user_id,
                item_id: line.item_id,
            };
            match self.store.delete(key).await {
                Ok(_) => cleared += 1,
                Err(StoreError::NotFound(_)) => {}
                Err(e) => {
                    tracing::warn!(
                        order_id = %order.id,
                        item_id = %line.item_id,
                        error = %e,
                        "failed to clear purchased cart line"
                    );
                }
            }
        }
        if cleared > 0 {
            metrics::counter!("cart_lines_deleted_total").increment(cleared as u64);
        }
        tracing::debug!(order_id = %order.id, cleared, "cart cleared after checkout");
    }
}

/// Moves to the following step.
fn advance(step: &mut CheckoutStep) {
    if let Some(next) = step.next() {
        *step = next;
        tracing::debug!(step = %next, "checkout step started");
    }
}
