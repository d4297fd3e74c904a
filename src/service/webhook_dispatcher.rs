use crate::domain::merchant::Merchant;
use crate::domain::webhook::{event_log_id, WebhookEvent, WebhookLog, WebhookLogPage, WebhookStatus};
use crate::error::{GatewayError, GatewayResult};
use crate::queue::{EnqueueOptions, Job, JobQueue};
use crate::service::retry_schedule::{classify_attempt, RetrySchedule};
use crate::service::signature::sign;
use crate::service::webhook_sender::WebhookSender;
use crate::store::LedgerStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_PAGE_LIMIT: i64 = 100;
const MAX_STORED_RESPONSE_BODY: usize = 4096;

/// What a single `deliver` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Log missing or already terminal.
    Skipped,
    /// Merchant has no endpoint configured.
    NoEndpoint,
    Delivered,
    RetryScheduled { attempts: i32, delay: Duration },
    Exhausted,
    /// Another delivery of the same log recorded this attempt first.
    Superseded,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetryAccepted {
    pub id: Uuid,
    pub status: WebhookStatus,
    pub message: &'static str,
}

pub fn build_envelope(event: WebhookEvent, data: serde_json::Value, now: DateTime<Utc>) -> serde_json::Value {
    serde_json::json!({
        "event": event.as_str(),
        "timestamp": now.timestamp(),
        "data": data,
    })
}

fn clip_body(mut body: String) -> String {
    if body.len() > MAX_STORED_RESPONSE_BODY {
        let mut cut = MAX_STORED_RESPONSE_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

#[derive(Clone)]
pub struct WebhookDispatcher {
    pub store: Arc<dyn LedgerStore>,
    pub queue: Arc<dyn JobQueue>,
    pub sender: Arc<dyn WebhookSender>,
    pub schedule: RetrySchedule,
}

impl WebhookDispatcher {
    /// Persists the pending log for `event` about `subject` and queues its first
    /// delivery. Emitting again for the same subject and event reuses the log;
    /// a log that never got an attempt is queued again in case its first
    /// enqueue was lost.
    pub async fn emit(
        &self,
        merchant_id: Uuid,
        event: WebhookEvent,
        subject: &str,
        data: serde_json::Value,
    ) -> Result<Uuid> {
        let now = Utc::now();
        let log = WebhookLog {
            id: event_log_id(subject, event),
            merchant_id,
            event: event.as_str().to_string(),
            payload: build_envelope(event, data, now),
            status: WebhookStatus::Pending,
            attempts: 0,
            last_attempt_at: None,
            response_code: None,
            response_body: None,
            next_retry_at: Some(now),
            created_at: now,
        };

        let queue_it = if self.store.insert_webhook_log(&log).await? {
            true
        } else {
            match self.store.find_webhook_log(log.id).await? {
                Some(existing) => existing.status == WebhookStatus::Pending && existing.attempts == 0,
                None => false,
            }
        };

        if queue_it {
            self.queue
                .enqueue(
                    Job::DeliverWebhook {
                        webhook_log_id: log.id,
                    },
                    EnqueueOptions::default(),
                )
                .await?;
            tracing::debug!(webhook_log_id = %log.id, event = event.as_str(), subject, "webhook queued");
        }
        Ok(log.id)
    }

    /// Makes one delivery attempt for the log and records the result.
    pub async fn deliver(&self, webhook_log_id: Uuid) -> Result<DeliveryOutcome> {
        let Some(log) = self.store.find_webhook_log(webhook_log_id).await? else {
            return Ok(DeliveryOutcome::Skipped);
        };
        if log.status.is_terminal() {
            return Ok(DeliveryOutcome::Skipped);
        }

        let Some(endpoint) = self.store.webhook_endpoint(log.merchant_id).await? else {
            tracing::debug!(webhook_log_id = %log.id, "merchant has no webhook endpoint, dropping");
            return Ok(DeliveryOutcome::NoEndpoint);
        };

        let body = serde_json::to_vec(&log.payload)?;
        let signature = sign(&endpoint.secret, &body);

        let (response_code, response_body) =
            match self.sender.post(&endpoint.url, body, &signature).await {
                Ok(reply) => (Some(i32::from(reply.status)), Some(clip_body(reply.body))),
                Err(err) => {
                    tracing::warn!(webhook_log_id = %log.id, error = %err, "webhook post failed");
                    (None, None)
                }
            };

        let update = classify_attempt(log.attempts, response_code, response_body, &self.schedule, Utc::now());
        if !self.store.record_delivery(log.id, log.attempts, &update).await? {
            return Ok(DeliveryOutcome::Superseded);
        }

        let outcome = match update.status {
            WebhookStatus::Success => DeliveryOutcome::Delivered,
            WebhookStatus::Failed => DeliveryOutcome::Exhausted,
            WebhookStatus::Pending => {
                let delay = self.schedule.delay_for(update.attempts);
                self.queue
                    .enqueue(
                        Job::DeliverWebhook {
                            webhook_log_id: log.id,
                        },
                        EnqueueOptions::delayed(delay),
                    )
                    .await?;
                DeliveryOutcome::RetryScheduled {
                    attempts: update.attempts,
                    delay,
                }
            }
        };

        tracing::info!(
            webhook_log_id = %log.id,
            event = %log.event,
            attempts = update.attempts,
            response_code = ?update.response_code,
            status = update.status.as_str(),
            "webhook attempt recorded"
        );
        Ok(outcome)
    }

    /// Operator retry: resets the attempt budget and queues an immediate delivery.
    pub async fn retry(&self, webhook_log_id: Uuid, merchant: &Merchant) -> GatewayResult<RetryAccepted> {
        let reset = self
            .store
            .reset_webhook_log(webhook_log_id, merchant.id, Utc::now())
            .await?;
        if !reset {
            return Err(GatewayError::NotFound("Webhook not found".to_string()));
        }

        self.queue
            .enqueue(Job::DeliverWebhook { webhook_log_id }, EnqueueOptions::default())
            .await?;

        Ok(RetryAccepted {
            id: webhook_log_id,
            status: WebhookStatus::Pending,
            message: "Webhook retry scheduled",
        })
    }

    pub async fn list(
        &self,
        merchant: &Merchant,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> GatewayResult<WebhookLogPage> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        let offset = offset.unwrap_or(0);
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) || offset < 0 {
            return Err(GatewayError::Validation("Invalid pagination parameters".to_string()));
        }

        let (logs, total) = self.store.list_webhook_logs(merchant.id, limit, offset).await?;
        Ok(WebhookLogPage {
            data: logs.into_iter().map(Into::into).collect(),
            total,
            limit,
            offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn envelope_shape() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let env = build_envelope(
            WebhookEvent::PaymentSuccess,
            serde_json::json!({"payment": {"id": "pay_1"}}),
            now,
        );
        assert_eq!(env["event"], "payment.success");
        assert_eq!(env["timestamp"], now.timestamp());
        assert_eq!(env["data"]["payment"]["id"], "pay_1");
    }

    #[test]
    fn long_bodies_are_clipped_on_char_boundary() {
        let body = "é".repeat(MAX_STORED_RESPONSE_BODY);
        let clipped = clip_body(body);
        assert!(clipped.len() <= MAX_STORED_RESPONSE_BODY);
        assert!(clipped.chars().all(|c| c == 'é'));
    }
}
