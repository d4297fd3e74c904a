use crate::domain::idempotency::{validity_window, IdempotencyRecord};
use crate::error::GatewayResult;
use crate::store::LedgerStore;
use chrono::Utc;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum Idempotent {
    Fresh(serde_json::Value),
    Replayed(serde_json::Value),
}

impl Idempotent {
    pub fn into_value(self) -> serde_json::Value {
        match self {
            Idempotent::Fresh(v) | Idempotent::Replayed(v) => v,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, Idempotent::Replayed(_))
    }
}

/// Replays the stored response for a live `(key, merchant)` pair instead of
/// running the operation again. Only successful responses are stored.
///
/// Stale records are deleted before the operation runs and the new response
/// is written after it, so a crash in between can execute twice.
#[derive(Clone)]
pub struct IdempotencyGuard {
    pub store: Arc<dyn LedgerStore>,
}

impl IdempotencyGuard {
    pub async fn run<T, F, Fut>(
        &self,
        key: Option<&str>,
        merchant_id: Uuid,
        op: F,
    ) -> GatewayResult<Idempotent>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let key = key.map(str::trim).filter(|k| !k.is_empty());
        let Some(key) = key else {
            let response = op().await?;
            return Ok(Idempotent::Fresh(serde_json::to_value(response).map_err(anyhow::Error::from)?));
        };

        let now = Utc::now();
        if let Some(record) = self.store.find_live_idempotency(key, merchant_id, now).await? {
            tracing::debug!(idempotency_key = key, %merchant_id, "replaying stored response");
            return Ok(Idempotent::Replayed(record.response));
        }
        self.store.delete_idempotency(key, merchant_id).await?;

        let response = serde_json::to_value(op().await?).map_err(anyhow::Error::from)?;

        let created_at = Utc::now();
        self.store
            .save_idempotency(&IdempotencyRecord {
                key: key.to_string(),
                merchant_id,
                response: response.clone(),
                created_at,
                expires_at: created_at + validity_window(),
            })
            .await?;

        Ok(Idempotent::Fresh(response))
    }
}
