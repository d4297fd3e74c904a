mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use common::{harness, API_KEY, API_SECRET};
use paygate::build_router;
use serde_json::{json, Value};
use tower::ServiceExt;

fn authed(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-Api-Key", API_KEY)
        .header("X-Api-Secret", API_SECRET)
        .header("Content-Type", "application/json");
    match body {
        Some(v) => builder.body(Body::from(v.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn missing_credentials_are_rejected() {
    let h = harness(true).await;
    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/orders")
        .header("Content-Type", "application/json")
        .body(Body::from(json!({"amount": 500}).to_string()))
        .unwrap();

    let (status, body) = send(build_router(h.state.clone()), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "AUTHENTICATION_ERROR");
    assert_eq!(body["error"]["description"], "Invalid API credentials");
}

#[tokio::test]
async fn order_then_idempotent_payment_over_http() {
    let h = harness(true).await;
    let app = build_router(h.state.clone());

    let (status, order) = send(
        app.clone(),
        authed("POST", "/api/v1/orders", Some(json!({"amount": 50000, "receipt": "r1"}))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = order["id"].as_str().unwrap().to_string();

    let payment_body = json!({"order_id": order_id, "method": "upi", "vpa": "user@paytm"});
    let mut first = authed("POST", "/api/v1/payments", Some(payment_body.clone()));
    first.headers_mut().insert("Idempotency-Key", "abc-1".parse().unwrap());
    let mut second = authed("POST", "/api/v1/payments", Some(payment_body));
    second.headers_mut().insert("Idempotency-Key", "abc-1".parse().unwrap());

    let (s1, p1) = send(app.clone(), first).await;
    let (s2, p2) = send(app.clone(), second).await;
    assert_eq!((s1, s2), (StatusCode::CREATED, StatusCode::CREATED));
    assert_eq!(p1, p2);
    assert_eq!(p1["status"], "pending");
    assert_eq!(h.store.payment_count().await, 1);

    let uri = format!("/api/v1/payments/{}", p1["id"].as_str().unwrap());
    let (status, fetched) = send(app, authed("GET", &uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], p1["id"]);
}

#[tokio::test]
async fn errors_use_the_envelope() {
    let h = harness(true).await;
    let app = build_router(h.state.clone());

    let (status, body) = send(
        app.clone(),
        authed("POST", "/api/v1/orders", Some(json!({"amount": 99}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST_ERROR");

    let (status, body) = send(app.clone(), authed("GET", "/api/v1/orders/order_nope", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND_ERROR");

    let (status, body) = send(
        app.clone(),
        authed("POST", "/api/v1/orders", Some(json!({"amount": "lots"}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST_ERROR");

    let (status, body) = send(
        app,
        authed("POST", "/api/v1/webhooks/not-a-uuid/retry", None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND_ERROR");
}

#[tokio::test]
async fn public_and_test_endpoints_need_no_credentials() {
    let h = harness(true).await;
    let app = build_router(h.state.clone());
    let order = common::create_order(&h, 1_000).await;

    let get = |uri: String| Request::builder().uri(uri).body(Body::empty()).unwrap();

    let (status, body) = send(app.clone(), get("/health".to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");

    let (status, body) = send(app.clone(), get(format!("/api/v1/orders/{}/public", order.id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["amount"], 1_000);

    let (status, body) = send(app.clone(), get("/api/v1/test/merchant".to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["api_key"], API_KEY);
    assert_eq!(body["seeded"], true);

    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/payments/public")
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({"order_id": order.id, "method": "upi", "vpa": "buyer@upi"}).to_string(),
        ))
        .unwrap();
    let (status, _) = send(app.clone(), req).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(app, get("/api/v1/test/jobs/status".to_string())).await;
    assert_eq!(status, StatusCode::OK);
    // one payment job and two webhook jobs waiting
    assert_eq!(body["pending"], 3);
    assert_eq!(body["worker_status"], "running");
}
