use crate::domain::merchant::{Merchant, NewMerchant, TestMerchantInfo, WebhookEndpoint};
use crate::repo::pg_store::PgStore;
use crate::store::MerchantStore;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

#[async_trait]
impl MerchantStore for PgStore {
    async fn authenticate(&self, api_key: &str, api_secret: &str) -> Result<Option<Merchant>> {
        let row = sqlx::query(
            "SELECT id, name, email FROM merchants WHERE api_key = $1 AND api_secret = $2 AND is_active = true",
        )
        .bind(api_key)
        .bind(api_secret)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Merchant {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
        }))
    }

    async fn webhook_endpoint(&self, merchant_id: Uuid) -> Result<Option<WebhookEndpoint>> {
        let row = sqlx::query("SELECT webhook_url, webhook_secret FROM merchants WHERE id = $1")
            .bind(merchant_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let url: Option<String> = row.try_get("webhook_url")?;
        let secret: Option<String> = row.try_get("webhook_secret")?;
        Ok(match (url, secret) {
            (Some(url), Some(secret)) if !url.is_empty() => Some(WebhookEndpoint { url, secret }),
            _ => None,
        })
    }

    async fn find_merchant_by_email(&self, email: &str) -> Result<Option<TestMerchantInfo>> {
        let row = sqlx::query("SELECT id, email, api_key FROM merchants WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(TestMerchantInfo {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            api_key: row.try_get("api_key")?,
            seeded: true,
        }))
    }

    async fn seed_merchant(&self, merchant: &NewMerchant) -> Result<bool> {
        let res = sqlx::query(
            r#"
            INSERT INTO merchants (id, name, email, api_key, api_secret, webhook_url, webhook_secret)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(merchant.id)
        .bind(&merchant.name)
        .bind(&merchant.email)
        .bind(&merchant.api_key)
        .bind(&merchant.api_secret)
        .bind(&merchant.webhook_url)
        .bind(&merchant.webhook_secret)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }
}
