use crate::domain::instrument::validate_instrument;
use crate::domain::merchant::Merchant;
use crate::domain::payment::{
    CapturePaymentRequest, CreatePaymentRequest, Payment, PaymentStatus,
    PAYMENT_FAILED_CODE, PAYMENT_FAILED_DESCRIPTION,
};
use crate::domain::webhook::WebhookEvent;
use crate::error::{GatewayError, GatewayResult};
use crate::ids::unique_id;
use crate::queue::{EnqueueOptions, Job, JobError, JobQueue};
use crate::service::processing_policy::ProcessingPolicy;
use crate::service::webhook_dispatcher::WebhookDispatcher;
use crate::store::{LedgerStore, PaymentError};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Result of one processing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Settled(PaymentStatus),
    /// Missing, already terminal, or claimed by another worker.
    Skipped,
}

fn payment_event_data(payment: &Payment) -> anyhow::Result<serde_json::Value> {
    Ok(serde_json::json!({ "payment": serde_json::to_value(payment)? }))
}

#[derive(Clone)]
pub struct PaymentService {
    pub store: Arc<dyn LedgerStore>,
    pub queue: Arc<dyn JobQueue>,
    pub policy: Arc<dyn ProcessingPolicy>,
    pub webhooks: WebhookDispatcher,
}

impl PaymentService {
    pub async fn create_payment(&self, req: CreatePaymentRequest, merchant: &Merchant) -> GatewayResult<Payment> {
        self.create_for_merchant(req, merchant.id).await
    }

    /// Hosted checkout path: the merchant is whoever owns the order.
    pub async fn create_public_payment(&self, req: CreatePaymentRequest) -> GatewayResult<Payment> {
        let order = self
            .store
            .find_order(&req.order_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound("Order not found".to_string()))?;
        self.create_for_merchant(req, order.merchant_id).await
    }

    async fn create_for_merchant(&self, req: CreatePaymentRequest, merchant_id: Uuid) -> GatewayResult<Payment> {
        if req.order_id.trim().is_empty() || req.method.trim().is_empty() {
            return Err(GatewayError::Validation("Invalid payment request".to_string()));
        }

        let order = match self.store.find_order(&req.order_id).await? {
            Some(order) if order.merchant_id == merchant_id => order,
            _ => return Err(GatewayError::NotFound("Order not found".to_string())),
        };

        let now = Utc::now();
        let instrument = validate_instrument(&req, now)?;

        let store = self.store.clone();
        let id = unique_id("pay", |candidate| {
            let store = store.clone();
            async move { store.payment_exists(&candidate).await }
        })
        .await?;

        let payment = Payment {
            id,
            order_id: order.id,
            merchant_id,
            amount: order.amount,
            currency: order.currency,
            method: instrument.method,
            vpa: instrument.vpa,
            card_network: instrument.card_network,
            card_last4: instrument.card_last4,
            status: PaymentStatus::Pending,
            captured: false,
            error_code: None,
            error_description: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_payment(&payment).await?;

        let data = payment_event_data(&payment)?;
        self.webhooks
            .emit(merchant_id, WebhookEvent::PaymentCreated, &payment.id, data.clone())
            .await?;
        self.webhooks
            .emit(merchant_id, WebhookEvent::PaymentPending, &payment.id, data)
            .await?;
        self.queue
            .enqueue(
                Job::ProcessPayment {
                    payment_id: payment.id.clone(),
                },
                EnqueueOptions::default(),
            )
            .await?;

        tracing::info!(
            payment_id = %payment.id,
            order_id = %payment.order_id,
            method = payment.method.as_str(),
            amount = payment.amount,
            "payment created"
        );
        Ok(payment)
    }

    /// Worker side: simulates the bank round trip and settles the payment.
    pub async fn process_payment(&self, payment_id: &str) -> Result<ProcessOutcome, JobError> {
        let Some(payment) = self.store.find_payment(payment_id).await? else {
            tracing::warn!(payment_id, "processing job for unknown payment");
            return Ok(ProcessOutcome::Skipped);
        };

        match payment.status {
            PaymentStatus::Pending => {
                let claimed = self
                    .store
                    .transition_payment(
                        &payment.id,
                        PaymentStatus::Pending,
                        PaymentStatus::Processing,
                        None,
                        Utc::now(),
                    )
                    .await?;
                if !claimed {
                    return Ok(ProcessOutcome::Skipped);
                }
            }
            // a previous run died between the two transitions
            PaymentStatus::Processing => {}
            // a previous run may have settled without getting its event out
            PaymentStatus::Success | PaymentStatus::Failed => {
                self.emit_settled(&payment).await?;
                return Ok(ProcessOutcome::Skipped);
            }
            PaymentStatus::Refunded => return Ok(ProcessOutcome::Skipped),
        }

        tokio::time::sleep(self.policy.processing_delay(payment.method)).await;

        let (next, error) = if self.policy.succeeds(payment.method) {
            (PaymentStatus::Success, None)
        } else {
            (
                PaymentStatus::Failed,
                Some(PaymentError {
                    code: PAYMENT_FAILED_CODE,
                    description: PAYMENT_FAILED_DESCRIPTION,
                }),
            )
        };

        let settled = self
            .store
            .transition_payment(&payment.id, PaymentStatus::Processing, next, error, Utc::now())
            .await?;
        if !settled {
            return Ok(ProcessOutcome::Skipped);
        }

        let snapshot = self
            .store
            .find_payment(&payment.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("payment {} vanished after settlement", payment.id))?;
        self.emit_settled(&snapshot).await?;

        tracing::info!(payment_id = %payment.id, status = next.as_str(), "payment settled");
        Ok(ProcessOutcome::Settled(next))
    }

    async fn emit_settled(&self, payment: &Payment) -> anyhow::Result<()> {
        let event = match payment.status {
            PaymentStatus::Success => WebhookEvent::PaymentSuccess,
            PaymentStatus::Failed => WebhookEvent::PaymentFailed,
            _ => return Ok(()),
        };
        self.webhooks
            .emit(payment.merchant_id, event, &payment.id, payment_event_data(payment)?)
            .await?;
        Ok(())
    }

    pub async fn capture_payment(
        &self,
        payment_id: &str,
        req: CapturePaymentRequest,
        merchant: &Merchant,
    ) -> GatewayResult<Payment> {
        if req.amount <= 0 {
            return Err(GatewayError::Validation("Invalid capture amount".to_string()));
        }

        let payment = self.get_payment(payment_id, merchant).await?;
        if payment.status != PaymentStatus::Success {
            return Err(GatewayError::InvalidState("Payment not in capturable state".to_string()));
        }
        if req.amount > payment.amount {
            return Err(GatewayError::Validation("Capture amount exceeds payment amount".to_string()));
        }

        if !self.store.mark_captured(&payment.id, Utc::now()).await? {
            return Err(GatewayError::InvalidState("Payment not in capturable state".to_string()));
        }

        tracing::info!(payment_id = %payment.id, amount = req.amount, "payment captured");
        self.get_payment(payment_id, merchant).await
    }

    pub async fn get_payment(&self, payment_id: &str, merchant: &Merchant) -> GatewayResult<Payment> {
        match self.store.find_payment(payment_id).await? {
            Some(payment) if payment.merchant_id == merchant.id => Ok(payment),
            _ => Err(GatewayError::NotFound("Payment not found".to_string())),
        }
    }

    pub async fn list_payments(&self, merchant: &Merchant) -> GatewayResult<Vec<Payment>> {
        Ok(self.store.list_payments(merchant.id).await?)
    }
}
