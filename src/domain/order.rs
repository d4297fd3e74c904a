use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_ORDER_AMOUNT: i64 = 100;
pub const DEFAULT_CURRENCY: &str = "INR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Created,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "created" => Ok(OrderStatus::Created),
            other => anyhow::bail!("unknown order status {}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub merchant_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub notes: Option<serde_json::Value>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub amount: i64,
    pub currency: Option<String>,
    pub receipt: Option<String>,
    pub notes: Option<serde_json::Value>,
}

/// What the hosted checkout may see without merchant credentials.
#[derive(Debug, Clone, Serialize)]
pub struct PublicOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: OrderStatus,
}

impl From<Order> for PublicOrder {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            amount: order.amount,
            currency: order.currency,
            status: order.status,
        }
    }
}
