//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use domain::CheckoutRequest;

use crate::Backend;
use crate::error::ApiError;
use crate::routes::AppState;
use crate::routes::orders::OrderResponse;

/// POST /v1/checkout: turn a request into a committed order.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let Json(req) = payload?;
    let order = state.checkout.checkout(req).await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(order))))
}
