use crate::domain::merchant::Merchant;
use crate::domain::webhook::WebhookLogPage;
use crate::error::{GatewayError, GatewayResult};
use crate::service::webhook_dispatcher::RetryAccepted;
use crate::AppState;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_webhooks(
    State(state): State<AppState>,
    Extension(merchant): Extension<Merchant>,
    params: Result<Query<PageParams>, QueryRejection>,
) -> GatewayResult<Json<WebhookLogPage>> {
    let Query(params) = params.map_err(|e| GatewayError::Validation(e.body_text()))?;
    Ok(Json(
        state
            .webhooks
            .list(&merchant, params.limit, params.offset)
            .await?,
    ))
}

pub async fn retry_webhook(
    State(state): State<AppState>,
    Extension(merchant): Extension<Merchant>,
    Path(webhook_id): Path<String>,
) -> GatewayResult<Json<RetryAccepted>> {
    // a malformed id cannot belong to the merchant
    let id = Uuid::parse_str(&webhook_id)
        .map_err(|_| GatewayError::NotFound("Webhook not found".to_string()))?;
    Ok(Json(state.webhooks.retry(id, &merchant).await?))
}
