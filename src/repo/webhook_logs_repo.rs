use crate::domain::webhook::{DeliveryUpdate, WebhookLog, WebhookStatus};
use crate::repo::pg_store::PgStore;
use crate::store::WebhookLogStore;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

const LOG_COLUMNS: &str = "id, merchant_id, event, payload, status, attempts, last_attempt_at, response_code, \
     response_body, next_retry_at, created_at";

fn log_from_row(row: &PgRow) -> Result<WebhookLog> {
    let status: String = row.try_get("status")?;
    Ok(WebhookLog {
        id: row.try_get("id")?,
        merchant_id: row.try_get("merchant_id")?,
        event: row.try_get("event")?,
        payload: row.try_get("payload")?,
        status: WebhookStatus::parse(&status)?,
        attempts: row.try_get("attempts")?,
        last_attempt_at: row.try_get("last_attempt_at")?,
        response_code: row.try_get("response_code")?,
        response_body: row.try_get("response_body")?,
        next_retry_at: row.try_get("next_retry_at")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl WebhookLogStore for PgStore {
    async fn insert_webhook_log(&self, log: &WebhookLog) -> Result<bool> {
        let res = sqlx::query(
            r#"
            INSERT INTO webhook_logs (id, merchant_id, event, payload, status, attempts, next_retry_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(log.id)
        .bind(log.merchant_id)
        .bind(&log.event)
        .bind(&log.payload)
        .bind(log.status.as_str())
        .bind(log.attempts)
        .bind(log.next_retry_at)
        .bind(log.created_at)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    async fn find_webhook_log(&self, id: Uuid) -> Result<Option<WebhookLog>> {
        let row = sqlx::query(&format!("SELECT {} FROM webhook_logs WHERE id = $1", LOG_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(log_from_row).transpose()
    }

    async fn record_delivery(
        &self,
        id: Uuid,
        expected_attempts: i32,
        update: &DeliveryUpdate,
    ) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE webhook_logs
            SET status = $3, attempts = $4, last_attempt_at = $5,
                response_code = $6, response_body = $7, next_retry_at = $8
            WHERE id = $1 AND attempts = $2 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(expected_attempts)
        .bind(update.status.as_str())
        .bind(update.attempts)
        .bind(update.last_attempt_at)
        .bind(update.response_code)
        .bind(&update.response_body)
        .bind(update.next_retry_at)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    async fn reset_webhook_log(&self, id: Uuid, merchant_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE webhook_logs
            SET status = 'pending', attempts = 0, next_retry_at = $3
            WHERE id = $1 AND merchant_id = $2
            "#,
        )
        .bind(id)
        .bind(merchant_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    async fn list_webhook_logs(
        &self,
        merchant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<WebhookLog>, i64)> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM webhook_logs WHERE merchant_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            LOG_COLUMNS
        ))
        .bind(merchant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM webhook_logs WHERE merchant_id = $1")
            .bind(merchant_id)
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        let logs = rows.iter().map(log_from_row).collect::<Result<Vec<_>>>()?;
        Ok((logs, total))
    }

    async fn stalled_webhook_logs(&self, before: DateTime<Utc>, limit: i64) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            r#"
            SELECT w.id
            FROM webhook_logs w
            JOIN merchants m ON m.id = w.merchant_id
            WHERE w.status = 'pending'
              AND w.next_retry_at < $1
              AND m.webhook_secret IS NOT NULL
              AND COALESCE(m.webhook_url, '') <> ''
            ORDER BY w.next_retry_at
            LIMIT $2
            "#,
        )
        .bind(before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| r.try_get::<Uuid, _>("id").map_err(Into::into))
            .collect()
    }
}
