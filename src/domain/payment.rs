use crate::error::{GatewayError, GatewayResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub const PAYMENT_FAILED_CODE: &str = "PAYMENT_FAILED";
pub const PAYMENT_FAILED_DESCRIPTION: &str = "Payment processing failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Upi,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Upi => "upi",
            PaymentMethod::Card => "card",
        }
    }

    pub fn parse(s: &str) -> GatewayResult<Self> {
        match s {
            "upi" => Ok(PaymentMethod::Upi),
            "card" => Ok(PaymentMethod::Card),
            _ => Err(GatewayError::InvalidMethod),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Success,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "processing" => Ok(PaymentStatus::Processing),
            "success" => Ok(PaymentStatus::Success),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => anyhow::bail!("unknown payment status {}", other),
        }
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (*self, next),
            (PaymentStatus::Pending, PaymentStatus::Processing)
                | (PaymentStatus::Processing, PaymentStatus::Success)
                | (PaymentStatus::Processing, PaymentStatus::Failed)
                | (PaymentStatus::Success, PaymentStatus::Refunded)
        )
    }

    /// Processing jobs arriving for a payment in one of these states are no-ops.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Success | PaymentStatus::Failed | PaymentStatus::Refunded
        )
    }
}

pub fn check_transition(from: PaymentStatus, to: PaymentStatus) -> GatewayResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(GatewayError::InvalidState(format!(
            "payment cannot move from {} to {}",
            from.as_str(),
            to.as_str()
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    pub merchant_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub method: PaymentMethod,
    pub vpa: Option<String>,
    pub card_network: Option<String>,
    pub card_last4: Option<String>,
    pub status: PaymentStatus,
    pub captured: bool,
    pub error_code: Option<String>,
    pub error_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw card fields as submitted. Never persisted; only the derived network and
/// last four digits survive validation.
#[derive(Clone, Deserialize)]
pub struct CardInput {
    pub number: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub expiry_month: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub expiry_year: Option<String>,
    pub cvv: Option<String>,
    pub holder_name: Option<String>,
}

// checkout forms send expiry as either "07" or 7
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl std::fmt::Debug for CardInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardInput")
            .field("number", &"[redacted]")
            .field("expiry_month", &self.expiry_month)
            .field("expiry_year", &self.expiry_year)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentRequest {
    pub order_id: String,
    pub method: String,
    pub vpa: Option<String>,
    pub card: Option<CardInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CapturePaymentRequest {
    pub amount: i64,
}
