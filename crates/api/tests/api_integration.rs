//! Integration tests for the API server.

use std::sync::OnceLock;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{InMemoryStore, Item, ItemId, Money, TokenScope, User, UserId};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

const TOKEN: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

async fn setup() -> (axum::Router, InMemoryStore) {
    let store = InMemoryStore::new();
    store
        .put_user(User {
            id: UserId::new(1),
            email: "member@example.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Reader".to_string(),
            activated: true,
        })
        .await;
    store
        .put_token(
            TokenScope::Authentication,
            TOKEN,
            UserId::new(1),
            Duration::from_secs(3600),
        )
        .await;
    store
        .put_item(Item::new(ItemId::new(42), "Dune", Money::from_minor(1000), 5))
        .await;
    store
        .put_item(Item::new(ItemId::new(7), "Emma", Money::from_minor(250), 1))
        .await;

    let state = api::create_state(store.clone());
    let app = api::create_app(state, get_metrics_handle());
    (app, store)
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

fn shipping_address() -> serde_json::Value {
    serde_json::json!({
        "email": "member@example.com",
        "first_name": "Ada",
        "last_name": "Reader",
        "addresses": "Jl. Merdeka 1",
        "postal_code": "40111",
        "province_id": 32,
        "city_id": 3273,
        "district_id": 327301,
        "subdistrict_id": 3273011001i64,
        "phone": "081234567890"
    })
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup().await;

    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_cart_scenario() {
    let (app, _) = setup().await;
    let line = serde_json::json!({ "user_id": 1, "item_id": 42, "quantity": 3 });

    let (status, json) = send(&app, "POST", "/v1/carts", Some(line.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["cart"]["total_price"], 3000);
    assert_eq!(json["cart"]["quantity"], 3);

    let (status, json) = send(&app, "POST", "/v1/carts", Some(line)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].is_string());

    let (status, json) = send(
        &app,
        "PUT",
        "/v1/carts/quantity",
        Some(serde_json::json!({ "user_id": 1, "item_id": 42, "quantity": 6 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"]["available_stock"].is_string());

    let (status, json) = send(
        &app,
        "PUT",
        "/v1/carts/quantity",
        Some(serde_json::json!({ "user_id": 1, "item_id": 42, "quantity": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cart"]["total_price"], 5000);

    let (status, json) = send(&app, "GET", "/v1/users/1/cart", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["carts"][0]["quantity"], 5);
    assert_eq!(json["carts"][0]["book"]["title"], "Dune");
}

#[tokio::test]
async fn test_cart_zero_quantity_is_field_error() {
    let (app, store) = setup().await;

    let (status, json) = send(
        &app,
        "POST",
        "/v1/carts",
        Some(serde_json::json!({ "user_id": 1, "item_id": 42, "quantity": 0 })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"]["quantity"], "must be greater than zero");
    assert_eq!(store.cart_line_count().await, 0);
}

#[tokio::test]
async fn test_delete_cart_line() {
    let (app, _) = setup().await;
    send(
        &app,
        "POST",
        "/v1/carts",
        Some(serde_json::json!({ "user_id": 1, "item_id": 7, "quantity": 1 })),
    )
    .await;

    let (status, json) = send(&app, "DELETE", "/v1/carts?user_id=1&item_id=7", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cart"]["item_id"], 7);

    let (status, _) = send(&app, "DELETE", "/v1/carts?user_id=1&item_id=7", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = send(&app, "DELETE", "/v1/carts?user_id=1", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"]["cart_line_id"].is_string());
}

#[tokio::test]
async fn test_empty_cart_is_empty_list() {
    let (app, _) = setup().await;

    let (status, json) = send(&app, "GET", "/v1/users/1/cart", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["carts"], serde_json::json!([]));
}

#[tokio::test]
async fn test_member_checkout_and_order_lookup() {
    let (app, store) = setup().await;
    send(
        &app,
        "POST",
        "/v1/carts",
        Some(serde_json::json!({ "user_id": 1, "item_id": 42, "quantity": 2 })),
    )
    .await;

    let (status, json) = send(
        &app,
        "POST",
        "/v1/checkout",
        Some(serde_json::json!({
            "checkout_type": 0,
            "address_variety": 0,
            "token": TOKEN,
            "carts": [{ "item_id": 42, "quantity": 2 }],
            "shipping_address": shipping_address()
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["order"]["total"], 2000);
    assert_eq!(json["order"]["user_id"], 1);
    assert_eq!(store.stock_of(ItemId::new(42)).await, Some(3));
    assert_eq!(store.cart_line_count().await, 0);

    let order_id = json["order"]["id"].as_str().unwrap().to_string();
    let (status, json) = send(&app, "GET", &format!("/v1/orders/{order_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["order"]["lines"][0]["unit_price"], 1000);
}

#[tokio::test]
async fn test_checkout_rejections() {
    let (app, store) = setup().await;

    let (status, json) = send(
        &app,
        "POST",
        "/v1/checkout",
        Some(serde_json::json!({
            "checkout_type": 1,
            "address_variety": 1,
            "cart_lines": [{ "item_id": 42, "quantity": 1 }],
            "existing_shipping_address_id": 1
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"]["address_variety"].is_string());

    let (status, json) = send(
        &app,
        "POST",
        "/v1/checkout",
        Some(serde_json::json!({
            "checkout_type": 0,
            "address_variety": 0,
            "cart_lines": [{ "item_id": 42, "quantity": 1 }],
            "shipping_address": shipping_address()
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"]["token"], "must be provided");

    let (status, _) = send(
        &app,
        "POST",
        "/v1/checkout",
        Some(serde_json::json!({
            "checkout_type": 0,
            "address_variety": 0,
            "token": "NOTAREALTOKEN",
            "cart_lines": [{ "item_id": 42, "quantity": 1 }],
            "shipping_address": shipping_address()
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, json) = send(
        &app,
        "POST",
        "/v1/checkout",
        Some(serde_json::json!({
            "checkout_type": 1,
            "address_variety": 0,
            "cart_lines": [{ "item_id": 7, "quantity": 2 }],
            "shipping_address": shipping_address()
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"]["available_stock"].is_string());

    let (status, json) = send(
        &app,
        "POST",
        "/v1/checkout",
        Some(serde_json::json!({
            "checkout_type": 3,
            "address_variety": 0,
            "cart_lines": [{ "item_id": 42, "quantity": 1 }],
            "shipping_address": shipping_address()
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"]["checkout_type"].is_string());

    assert_eq!(store.order_count().await, 0);
    assert_eq!(store.ledger_reads().await, 1);
}

#[tokio::test]
async fn test_checkout_timeout_is_service_unavailable() {
    let (app, store) = setup().await;
    store.set_fail_commit_with_timeout(true).await;

    let (status, _) = send(
        &app,
        "POST",
        "/v1/checkout",
        Some(serde_json::json!({
            "checkout_type": 1,
            "address_variety": 0,
            "cart_lines": [{ "item_id": 42, "quantity": 1 }],
            "shipping_address": shipping_address()
        })),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(store.stock_of(ItemId::new(42)).await, Some(5));
}

#[tokio::test]
async fn test_malformed_bodies_use_error_envelope() {
    let (app, store) = setup().await;

    let (status, json) = send(
        &app,
        "POST",
        "/v1/checkout",
        Some(serde_json::json!({
            "checkout_type": "guest",
            "address_variety": 0,
            "cart_lines": [{ "item_id": 42, "quantity": 1 }],
            "shipping_address": shipping_address()
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"]["body"].is_string());

    let (status, json) = send(
        &app,
        "POST",
        "/v1/carts",
        Some(serde_json::json!({ "user_id": 1, "item_id": 42, "quantity": -1 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"]["body"].is_string());

    let request = Request::builder()
        .method("POST")
        .uri("/v1/carts")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(json["error"].is_string());

    let (status, json) = send(&app, "DELETE", "/v1/carts?cart_line_id=abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let (status, json) = send(&app, "GET", "/v1/users/abc/cart", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    assert_eq!(store.cart_line_count().await, 0);
    assert_eq!(store.ledger_reads().await, 0);
}

#[tokio::test]
async fn test_overflowing_totals_are_rejected() {
    let (app, store) = setup().await;
    store
        .put_item(Item::new(
            ItemId::new(99),
            "Folio",
            Money::from_minor(i64::MAX / 2),
            5,
        ))
        .await;

    let (status, json) = send(
        &app,
        "POST",
        "/v1/carts",
        Some(serde_json::json!({ "user_id": 1, "item_id": 99, "quantity": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"]["quantity"].is_string());
    assert_eq!(store.cart_line_count().await, 0);

    let (status, json) = send(
        &app,
        "POST",
        "/v1/checkout",
        Some(serde_json::json!({
            "checkout_type": 1,
            "address_variety": 0,
            "cart_lines": [{ "item_id": 99, "quantity": 3 }],
            "shipping_address": shipping_address()
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"]["cart_lines"].is_string());
    assert_eq!(store.order_count().await, 0);
    assert_eq!(store.stock_of(ItemId::new(99)).await, Some(5));
}

#[tokio::test]
async fn test_order_lookup_errors() {
    let (app, _) = setup().await;

    let (status, _) = send(&app, "GET", "/v1/orders/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "GET",
        "/v1/orders/00000000-0000-0000-0000-000000000000",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup().await;
    send(
        &app,
        "POST",
        "/v1/checkout",
        Some(serde_json::json!({
            "checkout_type": 1,
            "address_variety": 0,
            "cart_lines": [{ "item_id": 42, "quantity": 1 }],
            "shipping_address": shipping_address()
        })),
    )
    .await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("checkout_attempts_total"));
}
