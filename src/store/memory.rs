use crate::domain::idempotency::IdempotencyRecord;
use crate::domain::merchant::{Merchant, NewMerchant, TestMerchantInfo, WebhookEndpoint};
use crate::domain::order::Order;
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::refund::{Refund, RefundReservation, RefundStatus, RESERVED_REFUND_STATUSES};
use crate::domain::webhook::{DeliveryUpdate, WebhookLog, WebhookStatus};
use crate::store::{
    IdempotencyStore, MerchantStore, OrderStore, PaymentError, PaymentStore, RefundStore,
    WebhookLogStore,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct MerchantRow {
    merchant: Merchant,
    api_key: String,
    api_secret: String,
    webhook_url: Option<String>,
    webhook_secret: Option<String>,
    is_active: bool,
}

/// Ledger kept in process memory. Backs the test suite and local runs
/// without Postgres; every clone shares the same maps.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    orders: Arc<RwLock<HashMap<String, Order>>>,
    payments: Arc<RwLock<HashMap<String, Payment>>>,
    refunds: Arc<RwLock<HashMap<String, Refund>>>,
    webhook_logs: Arc<RwLock<HashMap<Uuid, WebhookLog>>>,
    idempotency: Arc<RwLock<HashMap<(String, Uuid), IdempotencyRecord>>>,
    merchants: Arc<RwLock<HashMap<Uuid, MerchantRow>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_merchant_active(&self, merchant_id: Uuid, active: bool) {
        if let Some(row) = self.merchants.write().await.get_mut(&merchant_id) {
            row.is_active = active;
        }
    }

    pub async fn refunds_for_payment(&self, payment_id: &str) -> Vec<Refund> {
        self.refunds
            .read()
            .await
            .values()
            .filter(|r| r.payment_id == payment_id)
            .cloned()
            .collect()
    }

    pub async fn payment_count(&self) -> usize {
        self.payments.read().await.len()
    }
}

fn sum_for(refunds: &HashMap<String, Refund>, payment_id: &str, statuses: &[RefundStatus]) -> i64 {
    refunds
        .values()
        .filter(|r| r.payment_id == payment_id && statuses.contains(&r.status))
        .map(|r| r.amount)
        .sum()
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn order_exists(&self, id: &str) -> Result<bool> {
        Ok(self.orders.read().await.contains_key(id))
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            anyhow::bail!("duplicate order id {}", order.id);
        }
        orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn find_order(&self, id: &str) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(id).cloned())
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn payment_exists(&self, id: &str) -> Result<bool> {
        Ok(self.payments.read().await.contains_key(id))
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        let mut payments = self.payments.write().await;
        if payments.contains_key(&payment.id) {
            anyhow::bail!("duplicate payment id {}", payment.id);
        }
        payments.insert(payment.id.clone(), payment.clone());
        Ok(())
    }

    async fn find_payment(&self, id: &str) -> Result<Option<Payment>> {
        Ok(self.payments.read().await.get(id).cloned())
    }

    async fn list_payments(&self, merchant_id: Uuid) -> Result<Vec<Payment>> {
        let mut out: Vec<Payment> = self
            .payments
            .read()
            .await
            .values()
            .filter(|p| p.merchant_id == merchant_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn stalled_payments(&self, before: DateTime<Utc>, limit: i64) -> Result<Vec<String>> {
        let payments = self.payments.read().await;
        let mut stalled: Vec<&Payment> = payments
            .values()
            .filter(|p| {
                matches!(p.status, PaymentStatus::Pending | PaymentStatus::Processing)
                    && p.updated_at < before
            })
            .collect();
        stalled.sort_by_key(|p| p.updated_at);
        Ok(stalled
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|p| p.id.clone())
            .collect())
    }

    async fn transition_payment(
        &self,
        id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
        error: Option<PaymentError<'_>>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut payments = self.payments.write().await;
        let Some(payment) = payments.get_mut(id) else {
            return Ok(false);
        };
        if payment.status != from {
            return Ok(false);
        }

        payment.status = to;
        payment.error_code = error.map(|e| e.code.to_string());
        payment.error_description = error.map(|e| e.description.to_string());
        payment.updated_at = now;
        Ok(true)
    }

    async fn mark_captured(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut payments = self.payments.write().await;
        match payments.get_mut(id) {
            Some(payment) if payment.status == PaymentStatus::Success => {
                payment.captured = true;
                payment.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl RefundStore for InMemoryStore {
    async fn refund_exists(&self, id: &str) -> Result<bool> {
        Ok(self.refunds.read().await.contains_key(id))
    }

    async fn reserve_refund(&self, refund: &Refund, limit: i64) -> Result<RefundReservation> {
        let mut refunds = self.refunds.write().await;
        let reserved = sum_for(&refunds, &refund.payment_id, &RESERVED_REFUND_STATUSES);
        let available = limit - reserved;
        if refund.amount > available {
            return Ok(RefundReservation::Exceeds { available });
        }
        if refunds.contains_key(&refund.id) {
            anyhow::bail!("duplicate refund id {}", refund.id);
        }

        refunds.insert(refund.id.clone(), refund.clone());
        Ok(RefundReservation::Reserved)
    }

    async fn find_refund(&self, id: &str) -> Result<Option<Refund>> {
        Ok(self.refunds.read().await.get(id).cloned())
    }

    async fn sum_refunds(&self, payment_id: &str, statuses: &[RefundStatus]) -> Result<i64> {
        Ok(sum_for(&*self.refunds.read().await, payment_id, statuses))
    }

    async fn stalled_refunds(&self, before: DateTime<Utc>, limit: i64) -> Result<Vec<String>> {
        let refunds = self.refunds.read().await;
        let mut stalled: Vec<&Refund> = refunds
            .values()
            .filter(|r| r.status == RefundStatus::Pending && r.created_at < before)
            .collect();
        stalled.sort_by_key(|r| r.created_at);
        Ok(stalled
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|r| r.id.clone())
            .collect())
    }

    async fn mark_refund_processed(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut refunds = self.refunds.write().await;
        match refunds.get_mut(id) {
            Some(refund) if refund.status == RefundStatus::Pending => {
                refund.status = RefundStatus::Processed;
                refund.processed_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl WebhookLogStore for InMemoryStore {
    async fn insert_webhook_log(&self, log: &WebhookLog) -> Result<bool> {
        let mut logs = self.webhook_logs.write().await;
        if logs.contains_key(&log.id) {
            return Ok(false);
        }
        logs.insert(log.id, log.clone());
        Ok(true)
    }

    async fn find_webhook_log(&self, id: Uuid) -> Result<Option<WebhookLog>> {
        Ok(self.webhook_logs.read().await.get(&id).cloned())
    }

    async fn record_delivery(
        &self,
        id: Uuid,
        expected_attempts: i32,
        update: &DeliveryUpdate,
    ) -> Result<bool> {
        let mut logs = self.webhook_logs.write().await;
        match logs.get_mut(&id) {
            Some(log) if log.status == WebhookStatus::Pending && log.attempts == expected_attempts => {
                log.status = update.status;
                log.attempts = update.attempts;
                log.last_attempt_at = Some(update.last_attempt_at);
                log.response_code = update.response_code;
                log.response_body = update.response_body.clone();
                log.next_retry_at = update.next_retry_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reset_webhook_log(&self, id: Uuid, merchant_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let mut logs = self.webhook_logs.write().await;
        match logs.get_mut(&id) {
            Some(log) if log.merchant_id == merchant_id => {
                log.status = WebhookStatus::Pending;
                log.attempts = 0;
                log.next_retry_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_webhook_logs(
        &self,
        merchant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<WebhookLog>, i64)> {
        let mut mine: Vec<WebhookLog> = self
            .webhook_logs
            .read()
            .await
            .values()
            .filter(|l| l.merchant_id == merchant_id)
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = mine.len() as i64;
        let page = mine
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn stalled_webhook_logs(&self, before: DateTime<Utc>, limit: i64) -> Result<Vec<Uuid>> {
        let merchants = self.merchants.read().await;
        let has_endpoint = |merchant_id: &Uuid| {
            merchants.get(merchant_id).is_some_and(|m| {
                m.webhook_secret.is_some() && m.webhook_url.as_deref().is_some_and(|u| !u.is_empty())
            })
        };

        let logs = self.webhook_logs.read().await;
        let mut stalled: Vec<&WebhookLog> = logs
            .values()
            .filter(|l| {
                l.status == WebhookStatus::Pending
                    && l.next_retry_at.is_some_and(|due| due < before)
                    && has_endpoint(&l.merchant_id)
            })
            .collect();
        stalled.sort_by_key(|l| l.next_retry_at);
        Ok(stalled
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|l| l.id)
            .collect())
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryStore {
    async fn find_live_idempotency(
        &self,
        key: &str,
        merchant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<IdempotencyRecord>> {
        Ok(self
            .idempotency
            .read()
            .await
            .get(&(key.to_string(), merchant_id))
            .filter(|r| r.is_live(now))
            .cloned())
    }

    async fn delete_idempotency(&self, key: &str, merchant_id: Uuid) -> Result<()> {
        self.idempotency
            .write()
            .await
            .remove(&(key.to_string(), merchant_id));
        Ok(())
    }

    async fn save_idempotency(&self, record: &IdempotencyRecord) -> Result<()> {
        self.idempotency
            .write()
            .await
            .insert((record.key.clone(), record.merchant_id), record.clone());
        Ok(())
    }
}

#[async_trait]
impl MerchantStore for InMemoryStore {
    async fn authenticate(&self, api_key: &str, api_secret: &str) -> Result<Option<Merchant>> {
        Ok(self
            .merchants
            .read()
            .await
            .values()
            .find(|m| m.is_active && m.api_key == api_key && m.api_secret == api_secret)
            .map(|m| m.merchant.clone()))
    }

    async fn webhook_endpoint(&self, merchant_id: Uuid) -> Result<Option<WebhookEndpoint>> {
        let merchants = self.merchants.read().await;
        let Some(row) = merchants.get(&merchant_id) else {
            return Ok(None);
        };
        Ok(match (&row.webhook_url, &row.webhook_secret) {
            (Some(url), Some(secret)) if !url.is_empty() => Some(WebhookEndpoint {
                url: url.clone(),
                secret: secret.clone(),
            }),
            _ => None,
        })
    }

    async fn find_merchant_by_email(&self, email: &str) -> Result<Option<TestMerchantInfo>> {
        Ok(self
            .merchants
            .read()
            .await
            .values()
            .find(|m| m.merchant.email == email)
            .map(|m| TestMerchantInfo {
                id: m.merchant.id,
                email: m.merchant.email.clone(),
                api_key: m.api_key.clone(),
                seeded: true,
            }))
    }

    async fn seed_merchant(&self, merchant: &NewMerchant) -> Result<bool> {
        let mut merchants = self.merchants.write().await;
        if merchants.values().any(|m| m.merchant.email == merchant.email) {
            return Ok(false);
        }
        merchants.insert(
            merchant.id,
            MerchantRow {
                merchant: Merchant {
                    id: merchant.id,
                    name: merchant.name.clone(),
                    email: merchant.email.clone(),
                },
                api_key: merchant.api_key.clone(),
                api_secret: merchant.api_secret.clone(),
                webhook_url: merchant.webhook_url.clone(),
                webhook_secret: merchant.webhook_secret.clone(),
                is_active: true,
            },
        );
        Ok(true)
    }
}
