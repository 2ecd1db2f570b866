//! Order lookup endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;
use store::{Order, OrderId};

use crate::Backend;
use crate::error::ApiError;
use crate::routes::AppState;

#[derive(Serialize)]
pub struct OrderResponse {
    pub order: Order,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self { order }
    }
}

/// GET /v1/orders/{id}: load a committed order.
#[tracing::instrument(skip(state))]
pub async fn get<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.checkout.get_order(order_id).await?;
    Ok(Json(OrderResponse::from(order)))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))?;
    Ok(OrderId::from(uuid))
}
