use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const MAX_DELIVERY_ATTEMPTS: i32 = 5;

const EVENT_LOG_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_9d3b_4c57_8a10_52e7_b3d9_0c41);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEvent {
    #[serde(rename = "payment.created")]
    PaymentCreated,
    #[serde(rename = "payment.pending")]
    PaymentPending,
    #[serde(rename = "payment.success")]
    PaymentSuccess,
    #[serde(rename = "payment.failed")]
    PaymentFailed,
    #[serde(rename = "refund.created")]
    RefundCreated,
    #[serde(rename = "refund.processed")]
    RefundProcessed,
}

impl WebhookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEvent::PaymentCreated => "payment.created",
            WebhookEvent::PaymentPending => "payment.pending",
            WebhookEvent::PaymentSuccess => "payment.success",
            WebhookEvent::PaymentFailed => "payment.failed",
            WebhookEvent::RefundCreated => "refund.created",
            WebhookEvent::RefundProcessed => "refund.processed",
        }
    }
}

/// Log id for `event` about `subject` (a payment or refund id). Emitting the
/// same event twice for one subject lands on the same log.
pub fn event_log_id(subject: &str, event: WebhookEvent) -> Uuid {
    Uuid::new_v5(
        &EVENT_LOG_NAMESPACE,
        format!("{}:{}", subject, event.as_str()).as_bytes(),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookStatus {
    Pending,
    Success,
    Failed,
}

impl WebhookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookStatus::Pending => "pending",
            WebhookStatus::Success => "success",
            WebhookStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "pending" => Ok(WebhookStatus::Pending),
            "success" => Ok(WebhookStatus::Success),
            "failed" => Ok(WebhookStatus::Failed),
            other => anyhow::bail!("unknown webhook status {}", other),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, WebhookStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookLog {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub event: String,
    pub payload: serde_json::Value,
    pub status: WebhookStatus,
    pub attempts: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub response_code: Option<i32>,
    pub response_body: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fields written after one delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryUpdate {
    pub status: WebhookStatus,
    pub attempts: i32,
    pub last_attempt_at: DateTime<Utc>,
    pub response_code: Option<i32>,
    pub response_body: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookLogSummary {
    pub id: Uuid,
    pub event: String,
    pub status: WebhookStatus,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub response_code: Option<i32>,
}

impl From<WebhookLog> for WebhookLogSummary {
    fn from(log: WebhookLog) -> Self {
        Self {
            id: log.id,
            event: log.event,
            status: log.status,
            attempts: log.attempts,
            created_at: log.created_at,
            last_attempt_at: log.last_attempt_at,
            response_code: log.response_code,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookLogPage {
    pub data: Vec<WebhookLogSummary>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}
