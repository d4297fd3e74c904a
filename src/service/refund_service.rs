use crate::domain::merchant::Merchant;
use crate::domain::payment::{check_transition, PaymentStatus};
use crate::domain::refund::{CreateRefundRequest, Refund, RefundReservation, RefundStatus};
use crate::domain::webhook::WebhookEvent;
use crate::error::{GatewayError, GatewayResult};
use crate::ids::unique_id;
use crate::queue::{EnqueueOptions, Job, JobError, JobQueue};
use crate::service::processing_policy::ProcessingPolicy;
use crate::service::webhook_dispatcher::WebhookDispatcher;
use crate::store::LedgerStore;
use chrono::Utc;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundOutcome {
    Processed { payment_refunded: bool },
    Skipped,
}

fn refund_event_data(refund: &Refund) -> anyhow::Result<serde_json::Value> {
    Ok(serde_json::json!({ "refund": serde_json::to_value(refund)? }))
}

#[derive(Clone)]
pub struct RefundService {
    pub store: Arc<dyn LedgerStore>,
    pub queue: Arc<dyn JobQueue>,
    pub policy: Arc<dyn ProcessingPolicy>,
    pub webhooks: WebhookDispatcher,
}

impl RefundService {
    pub async fn create_refund(
        &self,
        payment_id: &str,
        req: CreateRefundRequest,
        merchant: &Merchant,
    ) -> GatewayResult<Refund> {
        if req.amount <= 0 {
            return Err(GatewayError::Validation("Invalid refund amount".to_string()));
        }

        let payment = match self.store.find_payment(payment_id).await? {
            Some(p) if p.merchant_id == merchant.id => p,
            _ => return Err(GatewayError::NotFound("Payment not found".to_string())),
        };
        if payment.status != PaymentStatus::Success {
            return Err(GatewayError::InvalidState("Payment not refundable".to_string()));
        }

        let store = self.store.clone();
        let id = unique_id("rfnd", |candidate| {
            let store = store.clone();
            async move { store.refund_exists(&candidate).await }
        })
        .await?;

        let refund = Refund {
            id,
            payment_id: payment.id.clone(),
            merchant_id: merchant.id,
            amount: req.amount,
            reason: req.reason,
            status: RefundStatus::Pending,
            created_at: Utc::now(),
            processed_at: None,
        };

        if let RefundReservation::Exceeds { available } =
            self.store.reserve_refund(&refund, payment.amount).await?
        {
            return Err(GatewayError::RefundExceedsAvailable { available });
        }

        self.webhooks
            .emit(merchant.id, WebhookEvent::RefundCreated, &refund.id, refund_event_data(&refund)?)
            .await?;
        self.queue
            .enqueue(
                Job::ProcessRefund {
                    refund_id: refund.id.clone(),
                },
                EnqueueOptions::default(),
            )
            .await?;

        tracing::info!(refund_id = %refund.id, payment_id = %payment.id, amount = refund.amount, "refund created");
        Ok(refund)
    }

    /// Worker side. Eligibility is checked again because the payment may have
    /// moved since the refund was accepted. A refund that is already processed
    /// still gets its follow-up steps, so a redelivered job finishes what an
    /// interrupted one started.
    pub async fn process_refund(&self, refund_id: &str) -> Result<RefundOutcome, JobError> {
        let Some(refund) = self.store.find_refund(refund_id).await? else {
            tracing::warn!(refund_id, "refund job for unknown refund");
            return Ok(RefundOutcome::Skipped);
        };

        if refund.status == RefundStatus::Pending {
            let payment = self
                .store
                .find_payment(&refund.payment_id)
                .await?
                .ok_or_else(|| JobError::Fatal(anyhow::anyhow!("payment {} not found", refund.payment_id)))?;
            if payment.status != PaymentStatus::Success {
                return Err(JobError::Fatal(anyhow::anyhow!(
                    "payment {} not refundable in status {}",
                    payment.id,
                    payment.status.as_str()
                )));
            }

            let processed = self
                .store
                .sum_refunds(&payment.id, &[RefundStatus::Processed])
                .await?;
            if processed + refund.amount > payment.amount {
                return Err(JobError::Fatal(anyhow::anyhow!(
                    "refund {} would exceed payment amount",
                    refund.id
                )));
            }

            tokio::time::sleep(self.policy.refund_delay()).await;

            if !self.store.mark_refund_processed(&refund.id, Utc::now()).await? {
                tracing::debug!(refund_id = %refund.id, "refund processed by another run");
            }
        }

        let payment_refunded = self.settle_payment(&refund.payment_id).await?;

        let snapshot = self
            .store
            .find_refund(&refund.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("refund {} vanished after processing", refund.id))?;
        self.webhooks
            .emit(
                snapshot.merchant_id,
                WebhookEvent::RefundProcessed,
                &snapshot.id,
                refund_event_data(&snapshot)?,
            )
            .await?;

        tracing::info!(refund_id = %refund.id, payment_id = %refund.payment_id, payment_refunded, "refund processed");
        Ok(RefundOutcome::Processed { payment_refunded })
    }

    /// Moves the payment to refunded once processed refunds add up to exactly
    /// its amount. Returns whether the payment ends up refunded.
    async fn settle_payment(&self, payment_id: &str) -> anyhow::Result<bool> {
        let payment = self
            .store
            .find_payment(payment_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("payment {} not found", payment_id))?;
        if payment.status == PaymentStatus::Refunded {
            return Ok(true);
        }

        let processed = self
            .store
            .sum_refunds(&payment.id, &[RefundStatus::Processed])
            .await?;
        if processed != payment.amount || check_transition(payment.status, PaymentStatus::Refunded).is_err() {
            return Ok(false);
        }

        let moved = self
            .store
            .transition_payment(
                &payment.id,
                PaymentStatus::Success,
                PaymentStatus::Refunded,
                None,
                Utc::now(),
            )
            .await?;
        if moved {
            return Ok(true);
        }
        Ok(self
            .store
            .find_payment(&payment.id)
            .await?
            .is_some_and(|p| p.status == PaymentStatus::Refunded))
    }

    pub async fn get_refund(&self, refund_id: &str, merchant: &Merchant) -> GatewayResult<Refund> {
        match self.store.find_refund(refund_id).await? {
            Some(r) if r.merchant_id == merchant.id => Ok(r),
            _ => Err(GatewayError::NotFound("Refund not found".to_string())),
        }
    }
}
