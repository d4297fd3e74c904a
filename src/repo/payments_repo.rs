use crate::domain::payment::{Payment, PaymentMethod, PaymentStatus};
use crate::repo::pg_store::PgStore;
use crate::store::{PaymentError, PaymentStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

const PAYMENT_COLUMNS: &str = "id, order_id, merchant_id, amount, currency, method, vpa, card_network, card_last4, \
     status, captured, error_code, error_description, created_at, updated_at";

fn payment_from_row(row: &PgRow) -> Result<Payment> {
    let method: String = row.try_get("method")?;
    let status: String = row.try_get("status")?;
    Ok(Payment {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        merchant_id: row.try_get("merchant_id")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        method: PaymentMethod::parse(&method)?,
        vpa: row.try_get("vpa")?,
        card_network: row.try_get("card_network")?,
        card_last4: row.try_get("card_last4")?,
        status: PaymentStatus::parse(&status)?,
        captured: row.try_get("captured")?,
        error_code: row.try_get("error_code")?,
        error_description: row.try_get("error_description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl PaymentStore for PgStore {
    async fn payment_exists(&self, id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, order_id, merchant_id, amount, currency,
                method, vpa, card_network, card_last4, status,
                captured, error_code, error_description, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5,
                $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15
            )
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.order_id)
        .bind(payment.merchant_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.method.as_str())
        .bind(&payment.vpa)
        .bind(&payment.card_network)
        .bind(&payment.card_last4)
        .bind(payment.status.as_str())
        .bind(payment.captured)
        .bind(&payment.error_code)
        .bind(&payment.error_description)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_payment(&self, id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!("SELECT {} FROM payments WHERE id = $1", PAYMENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn list_payments(&self, merchant_id: Uuid) -> Result<Vec<Payment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM payments WHERE merchant_id = $1 ORDER BY created_at DESC",
            PAYMENT_COLUMNS
        ))
        .bind(merchant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(payment_from_row).collect()
    }

    async fn stalled_payments(&self, before: DateTime<Utc>, limit: i64) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM payments
            WHERE status IN ('pending', 'processing') AND updated_at < $1
            ORDER BY updated_at
            LIMIT $2
            "#,
        )
        .bind(before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("id").map_err(Into::into))
            .collect()
    }

    async fn transition_payment(
        &self,
        id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
        error: Option<PaymentError<'_>>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE payments
            SET status = $3, error_code = $4, error_description = $5, updated_at = $6
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(error.map(|e| e.code))
        .bind(error.map(|e| e.description))
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    async fn mark_captured(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE payments SET captured = true, updated_at = $2 WHERE id = $1 AND status = 'success'",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }
}
