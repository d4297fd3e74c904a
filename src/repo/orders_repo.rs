use crate::domain::order::{Order, OrderStatus};
use crate::repo::pg_store::PgStore;
use crate::store::OrderStore;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;

fn order_from_row(row: &PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    Ok(Order {
        id: row.try_get("id")?,
        merchant_id: row.try_get("merchant_id")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        receipt: row.try_get("receipt")?,
        notes: row.try_get("notes")?,
        status: OrderStatus::parse(&status)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl OrderStore for PgStore {
    async fn order_exists(&self, id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, merchant_id, amount, currency, receipt, notes, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&order.id)
        .bind(order.merchant_id)
        .bind(order.amount)
        .bind(&order.currency)
        .bind(&order.receipt)
        .bind(&order.notes)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_order(&self, id: &str) -> Result<Option<Order>> {
        let row = sqlx::query(
            "SELECT id, merchant_id, amount, currency, receipt, notes, status, created_at, updated_at FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(order_from_row).transpose()
    }
}
