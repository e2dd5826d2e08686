use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use cart_timer::{
    create_router,
    services::Collaborators,
    state::{AppState, MemoryTimerStore, TimerSettings},
    utils::ManualClock,
};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(default_stock: u32) -> Router {
    let state = Arc::new(AppState::new(
        TimerSettings::default(),
        Collaborators::in_memory(default_stock),
        Arc::new(MemoryTimerStore::new()),
        Arc::new(ManualClock::new(1_735_689_600_000)),
    ));
    create_router(state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("build request");

    let response = app.clone().oneshot(request).await.expect("send request");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("read body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app(10);
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn adding_item_starts_timer() {
    let app = app(10);
    let (status, body) = send(
        &app,
        "POST",
        "/cart/items",
        Some(json!({ "variantId": "jordan-4-44", "quantity": 1, "unitPriceCents": 21000 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cart"]["totalQuantity"], 1);
    assert_eq!(body["cart"]["subtotalCents"], 21000);
    assert_eq!(body["timer"]["status"], "active");
    assert_eq!(body["timer"]["remainingSeconds"], 90);
    assert_eq!(body["timer"]["display"], "1:30");

    let (_, status_body) = send(&app, "GET", "/timer", None).await;
    assert_eq!(status_body["itemCount"], 1);
    assert_eq!(status_body["timer"]["status"], "active");
}

#[tokio::test]
async fn out_of_stock_returns_conflict_with_remaining() {
    let app = app(1);
    let (status, body) = send(
        &app,
        "POST",
        "/cart/items",
        Some(json!({ "variantId": "jordan-4-44", "quantity": 2 })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["remaining"], 1);

    let (_, timer) = send(&app, "GET", "/timer", None).await;
    assert_eq!(timer["timer"]["status"], "idle");
}

#[tokio::test]
async fn unknown_line_is_not_found() {
    let app = app(10);
    let (status, _) = send(&app, "DELETE", "/cart/items/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "PATCH", "/cart/items/ghost", Some(json!({ "quantity": 2 }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn checkout_flow_pauses_then_completes() {
    let app = app(10);
    send(
        &app,
        "POST",
        "/cart/items",
        Some(json!({ "variantId": "jordan-4-44", "quantity": 1 })),
    )
    .await;

    let (_, opened) = send(&app, "POST", "/checkout/open", None).await;
    assert_eq!(opened["status"], "applied");
    assert_eq!(opened["timer"]["status"], "paused");
    assert_eq!(opened["timer"]["checkoutOpen"], true);

    let (_, again) = send(&app, "POST", "/checkout/open", None).await;
    assert_eq!(again["status"], "ignored");

    let (status, order) = send(&app, "POST", "/checkout/complete", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["items"][0]["variantId"], "jordan-4-44");
    assert_eq!(order["timer"]["status"], "idle");

    let (_, summary) = send(&app, "GET", "/timer", None).await;
    assert_eq!(summary["itemCount"], 0);
    assert_eq!(summary["timer"]["remainingSeconds"], Value::Null);
}

#[tokio::test]
async fn cancelling_checkout_resumes_timer() {
    let app = app(10);
    send(
        &app,
        "POST",
        "/cart/items",
        Some(json!({ "variantId": "jordan-4-44", "quantity": 1 })),
    )
    .await;
    send(&app, "POST", "/checkout/open", None).await;

    let (_, cancelled) = send(&app, "POST", "/checkout/cancel", None).await;
    assert_eq!(cancelled["status"], "applied");
    assert_eq!(cancelled["timer"]["status"], "active");
    assert_eq!(cancelled["timer"]["checkoutOpen"], false);
}

#[tokio::test]
async fn extend_without_timer_is_ignored() {
    let app = app(10);
    let (status, body) = send(&app, "POST", "/timer/extend", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ignored");
}

#[tokio::test]
async fn clearing_cart_returns_to_idle() {
    let app = app(10);
    send(
        &app,
        "POST",
        "/cart/items",
        Some(json!({ "variantId": "jordan-4-44", "quantity": 1 })),
    )
    .await;

    let (status, body) = send(&app, "DELETE", "/cart", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cart"]["items"], json!([]));
    assert_eq!(body["timer"]["status"], "idle");

    let (status, _) = send(&app, "POST", "/checkout/complete", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn expired_items_start_empty() {
    let app = app(10);
    let (status, body) = send(&app, "GET", "/expired-items", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["carts"], json!([]));
}
