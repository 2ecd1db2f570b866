//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use store::{CartDetail, CartLine, CartLineId, CartLineKey, ItemId, NewCartLine, UserId};

use crate::Backend;
use crate::error::ApiError;
use crate::routes::AppState;

// -- Request types --

/// Identifies one cart line, either by its id or by user and item.
#[derive(Debug, Deserialize)]
pub struct CartLineSelector {
    pub cart_line_id: Option<CartLineId>,
    pub user_id: Option<UserId>,
    pub item_id: Option<ItemId>,
}

impl CartLineSelector {
    fn key(&self) -> Result<CartLineKey, ApiError> {
        match (self.cart_line_id, self.user_id, self.item_id) {
            (Some(id), _, _) => Ok(CartLineKey::Id(id)),
            (None, Some(user_id), Some(item_id)) => Ok(CartLineKey::UserItem { user_id, item_id }),
            _ => Err(ApiError::field(
                "cart_line_id",
                "must be provided, or both user_id and item_id",
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    #[serde(flatten)]
    pub selector: CartLineSelector,
    pub quantity: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartLineResponse {
    pub cart: CartLine,
}

#[derive(Serialize)]
pub struct CartListResponse {
    pub carts: Vec<CartDetail>,
}

// -- Handlers --

/// POST /v1/carts: add an item to a user's cart.
#[tracing::instrument(skip(state))]
pub async fn create<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<NewCartLine>, JsonRejection>,
) -> Result<(StatusCode, Json<CartLineResponse>), ApiError> {
    let Json(req) = payload?;
    let cart = state.cart_service.add_line(req).await?;
    Ok((StatusCode::CREATED, Json(CartLineResponse { cart })))
}

/// GET /v1/users/{id}/cart: list a user's cart with item details.
#[tracing::instrument(skip(state))]
pub async fn list<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<CartListResponse>, ApiError> {
    let Path(user_id) = path?;
    let user_id = UserId::new(user_id);
    if !user_id.is_valid() {
        return Err(ApiError::field("user_id", "must be a positive id"));
    }
    let carts = state.cart_service.list(user_id).await?;
    Ok(Json(CartListResponse { carts }))
}

/// PUT /v1/carts/quantity: change the quantity of a cart line.
#[tracing::instrument(skip(state))]
pub async fn update_quantity<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<UpdateQuantityRequest>, JsonRejection>,
) -> Result<Json<CartLineResponse>, ApiError> {
    let Json(req) = payload?;
    let key = req.selector.key()?;
    let cart = state.cart_service.update_quantity(key, req.quantity).await?;
    Ok(Json(CartLineResponse { cart }))
}

/// DELETE /v1/carts: remove a cart line.
#[tracing::instrument(skip(state))]
pub async fn delete<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    query: Result<Query<CartLineSelector>, QueryRejection>,
) -> Result<Json<CartLineResponse>, ApiError> {
    let Query(selector) = query?;
    let key = selector.key()?;
    let cart = state.cart_service.remove_line(key).await?;
    Ok(Json(CartLineResponse { cart }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(
        cart_line_id: Option<i64>,
        user_id: Option<i64>,
        item_id: Option<i64>,
    ) -> CartLineSelector {
        CartLineSelector {
            cart_line_id: cart_line_id.map(CartLineId::new),
            user_id: user_id.map(UserId::new),
            item_id: item_id.map(ItemId::new),
        }
    }

    #[test]
    fn id_takes_precedence() {
        let key = selector(Some(9), Some(1), Some(2)).key().unwrap();
        assert_eq!(key, CartLineKey::Id(CartLineId::new(9)));
    }

    #[test]
    fn user_and_item_together() {
        let key = selector(None, Some(1), Some(2)).key().unwrap();
        assert_eq!(
            key,
            CartLineKey::UserItem {
                user_id: UserId::new(1),
                item_id: ItemId::new(2),
            }
        );
    }

    #[test]
    fn partial_selector_is_rejected() {
        assert!(matches!(
            selector(None, Some(1), None).key(),
            Err(ApiError::Unprocessable(_))
        ));
    }
}
