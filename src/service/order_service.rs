use crate::domain::merchant::Merchant;
use crate::domain::order::{CreateOrderRequest, Order, OrderStatus, PublicOrder, DEFAULT_CURRENCY, MIN_ORDER_AMOUNT};
use crate::error::{GatewayError, GatewayResult};
use crate::ids::unique_id;
use crate::store::LedgerStore;
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone)]
pub struct OrderService {
    pub store: Arc<dyn LedgerStore>,
}

impl OrderService {
    pub async fn create_order(&self, req: CreateOrderRequest, merchant: &Merchant) -> GatewayResult<Order> {
        if req.amount < MIN_ORDER_AMOUNT {
            return Err(GatewayError::Validation("amount must be at least 100".to_string()));
        }

        let store = self.store.clone();
        let id = unique_id("order", |candidate| {
            let store = store.clone();
            async move { store.order_exists(&candidate).await }
        })
        .await?;

        let now = Utc::now();
        let order = Order {
            id,
            merchant_id: merchant.id,
            amount: req.amount,
            currency: req
                .currency
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            receipt: req.receipt,
            notes: req.notes,
            status: OrderStatus::Created,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_order(&order).await?;
        tracing::info!(order_id = %order.id, merchant_id = %merchant.id, amount = order.amount, "order created");
        Ok(order)
    }

    pub async fn get_order(&self, id: &str, merchant: &Merchant) -> GatewayResult<Order> {
        match self.store.find_order(id).await? {
            Some(order) if order.merchant_id == merchant.id => Ok(order),
            _ => Err(GatewayError::NotFound("Order not found".to_string())),
        }
    }

    pub async fn get_public_order(&self, id: &str) -> GatewayResult<PublicOrder> {
        self.store
            .find_order(id)
            .await?
            .map(PublicOrder::from)
            .ok_or_else(|| GatewayError::NotFound("Order not found".to_string()))
    }
}
