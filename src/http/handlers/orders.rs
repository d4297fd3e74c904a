use crate::domain::merchant::Merchant;
use crate::domain::order::{CreateOrderRequest, Order, PublicOrder};
use crate::error::GatewayResult;
use crate::http::extract::ApiJson;
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};

pub async fn create_order(
    State(state): State<AppState>,
    Extension(merchant): Extension<Merchant>,
    ApiJson(req): ApiJson<CreateOrderRequest>,
) -> GatewayResult<(StatusCode, Json<Order>)> {
    let order = state.orders.create_order(req, &merchant).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn get_order(
    State(state): State<AppState>,
    Extension(merchant): Extension<Merchant>,
    Path(order_id): Path<String>,
) -> GatewayResult<Json<Order>> {
    Ok(Json(state.orders.get_order(&order_id, &merchant).await?))
}

pub async fn get_public_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> GatewayResult<Json<PublicOrder>> {
    Ok(Json(state.orders.get_public_order(&order_id).await?))
}
