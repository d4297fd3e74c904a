use crate::domain::idempotency::IDEMPOTENCY_HEADER;
use crate::domain::merchant::Merchant;
use crate::domain::payment::{CapturePaymentRequest, CreatePaymentRequest, Payment};
use crate::error::GatewayResult;
use crate::http::extract::ApiJson;
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};

pub async fn create_payment(
    State(state): State<AppState>,
    Extension(merchant): Extension<Merchant>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<CreatePaymentRequest>,
) -> GatewayResult<(StatusCode, Json<serde_json::Value>)> {
    let key = headers.get(IDEMPOTENCY_HEADER).and_then(|h| h.to_str().ok());

    let reply = state
        .idempotency
        .run(key, merchant.id, || state.payments.create_payment(req, &merchant))
        .await?;

    if reply.is_replay() {
        tracing::info!(merchant_id = %merchant.id, "idempotent replay of payment creation");
    }
    Ok((StatusCode::CREATED, Json(reply.into_value())))
}

pub async fn create_public_payment(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreatePaymentRequest>,
) -> GatewayResult<(StatusCode, Json<Payment>)> {
    let payment = state.payments.create_public_payment(req).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Extension(merchant): Extension<Merchant>,
) -> GatewayResult<Json<Vec<Payment>>> {
    Ok(Json(state.payments.list_payments(&merchant).await?))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Extension(merchant): Extension<Merchant>,
    Path(payment_id): Path<String>,
) -> GatewayResult<Json<Payment>> {
    Ok(Json(state.payments.get_payment(&payment_id, &merchant).await?))
}

pub async fn capture_payment(
    State(state): State<AppState>,
    Extension(merchant): Extension<Merchant>,
    Path(payment_id): Path<String>,
    ApiJson(req): ApiJson<CapturePaymentRequest>,
) -> GatewayResult<Json<Payment>> {
    Ok(Json(
        state.payments.capture_payment(&payment_id, req, &merchant).await?,
    ))
}
