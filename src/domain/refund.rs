use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    Pending,
    Processed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Processed => "processed",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "pending" => Ok(RefundStatus::Pending),
            "processed" => Ok(RefundStatus::Processed),
            other => anyhow::bail!("unknown refund status {}", other),
        }
    }
}

/// Statuses that count against a payment's refundable amount.
pub const RESERVED_REFUND_STATUSES: [RefundStatus; 2] = [RefundStatus::Pending, RefundStatus::Processed];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub payment_id: String,
    pub merchant_id: Uuid,
    pub amount: i64,
    pub reason: Option<String>,
    pub status: RefundStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRefundRequest {
    pub amount: i64,
    pub reason: Option<String>,
}

/// Result of the atomic check-and-insert performed by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundReservation {
    Reserved,
    Exceeds { available: i64 },
}
