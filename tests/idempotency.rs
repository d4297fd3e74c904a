mod common;

use chrono::{Duration, Utc};
use common::{create_order, harness, upi_request};
use paygate::domain::idempotency::IdempotencyRecord;
use paygate::error::GatewayError;
use paygate::store::IdempotencyStore;

#[tokio::test]
async fn same_key_replays_identical_response() {
    let h = harness(true).await;
    let order = create_order(&h, 10_000).await;
    let guard = &h.state.idempotency;
    let payments = &h.state.payments;

    let first = guard
        .run(Some("key-1"), h.merchant.id, || {
            payments.create_payment(upi_request(&order.id), &h.merchant)
        })
        .await
        .unwrap();
    let second = guard
        .run(Some("key-1"), h.merchant.id, || {
            payments.create_payment(upi_request(&order.id), &h.merchant)
        })
        .await
        .unwrap();

    assert!(!first.is_replay());
    assert!(second.is_replay());
    let a = serde_json::to_vec(&first.into_value()).unwrap();
    let b = serde_json::to_vec(&second.into_value()).unwrap();
    assert_eq!(a, b);
    assert_eq!(h.store.payment_count().await, 1);
}

#[tokio::test]
async fn different_keys_and_no_key_both_execute() {
    let h = harness(true).await;
    let order = create_order(&h, 10_000).await;
    let guard = &h.state.idempotency;
    let payments = &h.state.payments;

    for key in [Some("key-a"), Some("key-b"), None, None, Some("  ")] {
        guard
            .run(key, h.merchant.id, || {
                payments.create_payment(upi_request(&order.id), &h.merchant)
            })
            .await
            .unwrap();
    }
    assert_eq!(h.store.payment_count().await, 5);
}

#[tokio::test]
async fn keys_are_scoped_per_merchant() {
    let h = harness(true).await;
    let other = common::other_merchant(&h).await;
    let guard = &h.state.idempotency;

    let mine = guard
        .run(Some("shared"), h.merchant.id, || async { Ok::<_, GatewayError>("mine") })
        .await
        .unwrap();
    let theirs = guard
        .run(Some("shared"), other.id, || async { Ok::<_, GatewayError>("theirs") })
        .await
        .unwrap();

    assert_eq!(mine.into_value(), serde_json::json!("mine"));
    assert_eq!(theirs.into_value(), serde_json::json!("theirs"));
}

#[tokio::test]
async fn failures_are_not_remembered() {
    let h = harness(true).await;
    let guard = &h.state.idempotency;

    let err = guard
        .run(Some("key-f"), h.merchant.id, || async {
            Err::<serde_json::Value, _>(GatewayError::InvalidVpa)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::InvalidVpa));

    let ok = guard
        .run(Some("key-f"), h.merchant.id, || async {
            Ok::<_, GatewayError>(serde_json::json!({"ok": true}))
        })
        .await
        .unwrap();
    assert!(!ok.is_replay());
}

#[tokio::test]
async fn expired_record_is_replaced() {
    let h = harness(true).await;
    let past = Utc::now() - Duration::hours(25);
    h.store
        .save_idempotency(&IdempotencyRecord {
            key: "old".to_string(),
            merchant_id: h.merchant.id,
            response: serde_json::json!({"stale": true}),
            created_at: past,
            expires_at: past + Duration::hours(24),
        })
        .await
        .unwrap();

    let reply = h
        .state
        .idempotency
        .run(Some("old"), h.merchant.id, || async {
            Ok::<_, GatewayError>(serde_json::json!({"fresh": true}))
        })
        .await
        .unwrap();
    assert!(!reply.is_replay());

    let stored = h
        .store
        .find_live_idempotency("old", h.merchant.id, Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.response, serde_json::json!({"fresh": true}));
}
