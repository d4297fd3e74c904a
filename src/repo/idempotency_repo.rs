use crate::domain::idempotency::IdempotencyRecord;
use crate::repo::pg_store::PgStore;
use crate::store::IdempotencyStore;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

#[async_trait]
impl IdempotencyStore for PgStore {
    async fn find_live_idempotency(
        &self,
        key: &str,
        merchant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<IdempotencyRecord>> {
        let row = sqlx::query(
            r#"
            SELECT key, merchant_id, response, created_at, expires_at
            FROM idempotency_keys
            WHERE key = $1 AND merchant_id = $2 AND expires_at > $3
            "#,
        )
        .bind(key)
        .bind(merchant_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(IdempotencyRecord {
            key: row.try_get("key")?,
            merchant_id: row.try_get("merchant_id")?,
            response: row.try_get("response")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
        }))
    }

    async fn delete_idempotency(&self, key: &str, merchant_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM idempotency_keys WHERE key = $1 AND merchant_id = $2")
            .bind(key)
            .bind(merchant_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_idempotency(&self, record: &IdempotencyRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO idempotency_keys (key, merchant_id, response, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (key, merchant_id) DO UPDATE SET
                response = EXCLUDED.response,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&record.key)
        .bind(record.merchant_id)
        .bind(&record.response)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
