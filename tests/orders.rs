mod common;

use common::{create_order, harness, other_merchant};
use paygate::domain::order::{CreateOrderRequest, OrderStatus};
use paygate::error::GatewayError;
use paygate::ids::BASE_SUFFIX_LEN;

#[tokio::test]
async fn amount_below_minimum_is_rejected() {
    let h = harness(true).await;
    let err = h
        .state
        .orders
        .create_order(
            CreateOrderRequest {
                amount: 99,
                currency: None,
                receipt: None,
                notes: None,
            },
            &h.merchant,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Validation(_)));
    assert_eq!(err.code(), "BAD_REQUEST_ERROR");
}

#[tokio::test]
async fn minimum_amount_creates_order_with_defaults() {
    let h = harness(true).await;
    let order = create_order(&h, 100).await;

    let suffix = order.id.strip_prefix("order_").unwrap();
    assert_eq!(suffix.len(), BASE_SUFFIX_LEN);
    assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    assert_eq!(order.currency, "INR");
    assert_eq!(order.status, OrderStatus::Created);
    assert_eq!(order.merchant_id, h.merchant.id);
}

#[tokio::test]
async fn orders_are_scoped_to_their_merchant() {
    let h = harness(true).await;
    let order = create_order(&h, 50_000).await;
    let other = other_merchant(&h).await;

    let fetched = h.state.orders.get_order(&order.id, &h.merchant).await.unwrap();
    assert_eq!(fetched, order);

    let err = h.state.orders.get_order(&order.id, &other).await.unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));
}

#[tokio::test]
async fn public_view_hides_merchant_fields() {
    let h = harness(true).await;
    let order = create_order(&h, 2_500).await;

    let public = h.state.orders.get_public_order(&order.id).await.unwrap();
    let raw = serde_json::to_value(&public).unwrap();
    assert_eq!(raw["amount"], 2_500);
    assert!(raw.get("merchant_id").is_none());
    assert!(raw.get("notes").is_none());

    let missing = h.state.orders.get_public_order("order_missing").await.unwrap_err();
    assert_eq!(missing.code(), "NOT_FOUND_ERROR");
}
