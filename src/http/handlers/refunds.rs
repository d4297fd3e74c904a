use crate::domain::merchant::Merchant;
use crate::domain::refund::{CreateRefundRequest, Refund};
use crate::error::GatewayResult;
use crate::http::extract::ApiJson;
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};

pub async fn create_refund(
    State(state): State<AppState>,
    Extension(merchant): Extension<Merchant>,
    Path(payment_id): Path<String>,
    ApiJson(req): ApiJson<CreateRefundRequest>,
) -> GatewayResult<(StatusCode, Json<Refund>)> {
    let refund = state.refunds.create_refund(&payment_id, req, &merchant).await?;
    Ok((StatusCode::CREATED, Json(refund)))
}

pub async fn get_refund(
    State(state): State<AppState>,
    Extension(merchant): Extension<Merchant>,
    Path(refund_id): Path<String>,
) -> GatewayResult<Json<Refund>> {
    Ok(Json(state.refunds.get_refund(&refund_id, &merchant).await?))
}
