use crate::domain::idempotency::IdempotencyRecord;
use crate::domain::merchant::{Merchant, NewMerchant, TestMerchantInfo, WebhookEndpoint};
use crate::domain::order::Order;
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::refund::{Refund, RefundReservation, RefundStatus};
use crate::domain::webhook::{DeliveryUpdate, WebhookLog};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod memory;

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn order_exists(&self, id: &str) -> Result<bool>;
    async fn insert_order(&self, order: &Order) -> Result<()>;
    async fn find_order(&self, id: &str) -> Result<Option<Order>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentError<'a> {
    pub code: &'a str,
    pub description: &'a str,
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn payment_exists(&self, id: &str) -> Result<bool>;
    async fn insert_payment(&self, payment: &Payment) -> Result<()>;
    async fn find_payment(&self, id: &str) -> Result<Option<Payment>>;
    async fn list_payments(&self, merchant_id: Uuid) -> Result<Vec<Payment>>;

    /// Ids of pending or processing payments not updated since `before`.
    async fn stalled_payments(&self, before: DateTime<Utc>, limit: i64) -> Result<Vec<String>>;

    /// Moves the payment from `from` to `to` only while it is still in `from`.
    /// Returns false when another writer got there first.
    async fn transition_payment(
        &self,
        id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
        error: Option<PaymentError<'_>>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Sets `captured` on a payment that is currently `success`.
    async fn mark_captured(&self, id: &str, now: DateTime<Utc>) -> Result<bool>;
}

#[async_trait]
pub trait RefundStore: Send + Sync {
    async fn refund_exists(&self, id: &str) -> Result<bool>;

    /// Inserts `refund` only if the pending and processed refunds for its
    /// payment plus `refund.amount` stay within `limit`. The check and the
    /// insert are atomic with respect to other reservations on the same payment.
    async fn reserve_refund(&self, refund: &Refund, limit: i64) -> Result<RefundReservation>;

    async fn find_refund(&self, id: &str) -> Result<Option<Refund>>;
    async fn sum_refunds(&self, payment_id: &str, statuses: &[RefundStatus]) -> Result<i64>;

    /// Ids of refunds still pending that were created before `before`.
    async fn stalled_refunds(&self, before: DateTime<Utc>, limit: i64) -> Result<Vec<String>>;

    /// pending -> processed; false if the refund was not pending.
    async fn mark_refund_processed(&self, id: &str, now: DateTime<Utc>) -> Result<bool>;
}

#[async_trait]
pub trait WebhookLogStore: Send + Sync {
    /// Inserts the log unless one with the same id exists. Returns whether it was written.
    async fn insert_webhook_log(&self, log: &WebhookLog) -> Result<bool>;
    async fn find_webhook_log(&self, id: Uuid) -> Result<Option<WebhookLog>>;

    /// Applies `update` only while the log is pending with `expected_attempts`.
    async fn record_delivery(
        &self,
        id: Uuid,
        expected_attempts: i32,
        update: &DeliveryUpdate,
    ) -> Result<bool>;

    /// Operator reset: attempts 0, pending, due now. False if not found for the merchant.
    async fn reset_webhook_log(&self, id: Uuid, merchant_id: Uuid, now: DateTime<Utc>) -> Result<bool>;

    async fn list_webhook_logs(
        &self,
        merchant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<WebhookLog>, i64)>;

    /// Pending logs due before `before` whose merchant has an endpoint.
    async fn stalled_webhook_logs(&self, before: DateTime<Utc>, limit: i64) -> Result<Vec<Uuid>>;
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn find_live_idempotency(
        &self,
        key: &str,
        merchant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<IdempotencyRecord>>;
    async fn delete_idempotency(&self, key: &str, merchant_id: Uuid) -> Result<()>;
    async fn save_idempotency(&self, record: &IdempotencyRecord) -> Result<()>;
}

#[async_trait]
pub trait MerchantStore: Send + Sync {
    async fn authenticate(&self, api_key: &str, api_secret: &str) -> Result<Option<Merchant>>;
    async fn webhook_endpoint(&self, merchant_id: Uuid) -> Result<Option<WebhookEndpoint>>;
    async fn find_merchant_by_email(&self, email: &str) -> Result<Option<TestMerchantInfo>>;

    /// Inserts the merchant unless the email is taken. Returns whether a row was written.
    async fn seed_merchant(&self, merchant: &NewMerchant) -> Result<bool>;
}

pub trait LedgerStore:
    OrderStore + PaymentStore + RefundStore + WebhookLogStore + IdempotencyStore + MerchantStore
{
}

impl<T> LedgerStore for T where
    T: OrderStore + PaymentStore + RefundStore + WebhookLogStore + IdempotencyStore + MerchantStore
{
}
