use crate::domain::refund::{Refund, RefundReservation, RefundStatus, RESERVED_REFUND_STATUSES};
use crate::repo::pg_store::PgStore;
use crate::store::RefundStore;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;

fn refund_from_row(row: &PgRow) -> Result<Refund> {
    let status: String = row.try_get("status")?;
    Ok(Refund {
        id: row.try_get("id")?,
        payment_id: row.try_get("payment_id")?,
        merchant_id: row.try_get("merchant_id")?,
        amount: row.try_get("amount")?,
        reason: row.try_get("reason")?,
        status: RefundStatus::parse(&status)?,
        created_at: row.try_get("created_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

fn status_names(statuses: &[RefundStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

#[async_trait]
impl RefundStore for PgStore {
    async fn refund_exists(&self, id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM refunds WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn reserve_refund(&self, refund: &Refund, limit: i64) -> Result<RefundReservation> {
        let mut tx = self.pool.begin().await?;

        // the payment row lock serialises reservations against the same payment
        sqlx::query("SELECT id FROM payments WHERE id = $1 FOR UPDATE")
            .bind(&refund.payment_id)
            .fetch_optional(&mut *tx)
            .await?;

        let reserved: i64 = sqlx::query(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT AS total FROM refunds WHERE payment_id = $1 AND status = ANY($2)",
        )
        .bind(&refund.payment_id)
        .bind(status_names(&RESERVED_REFUND_STATUSES))
        .fetch_one(&mut *tx)
        .await?
        .try_get("total")?;

        let available = limit - reserved;
        if refund.amount > available {
            tx.rollback().await?;
            return Ok(RefundReservation::Exceeds { available });
        }

        sqlx::query(
            r#"
            INSERT INTO refunds (id, payment_id, merchant_id, amount, reason, status, created_at, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&refund.id)
        .bind(&refund.payment_id)
        .bind(refund.merchant_id)
        .bind(refund.amount)
        .bind(&refund.reason)
        .bind(refund.status.as_str())
        .bind(refund.created_at)
        .bind(refund.processed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(RefundReservation::Reserved)
    }

    async fn find_refund(&self, id: &str) -> Result<Option<Refund>> {
        let row = sqlx::query(
            "SELECT id, payment_id, merchant_id, amount, reason, status, created_at, processed_at FROM refunds WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(refund_from_row).transpose()
    }

    async fn sum_refunds(&self, payment_id: &str, statuses: &[RefundStatus]) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT AS total FROM refunds WHERE payment_id = $1 AND status = ANY($2)",
        )
        .bind(payment_id)
        .bind(status_names(statuses))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("total")?)
    }

    async fn stalled_refunds(&self, before: DateTime<Utc>, limit: i64) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT id FROM refunds WHERE status = 'pending' AND created_at < $1 ORDER BY created_at LIMIT $2",
        )
        .bind(before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("id").map_err(Into::into))
            .collect()
    }

    async fn mark_refund_processed(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE refunds SET status = 'processed', processed_at = $2 WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }
}
