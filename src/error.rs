use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("VPA format invalid")]
    InvalidVpa,

    #[error("Card validation failed")]
    InvalidCard,

    #[error("Card expiry date invalid")]
    ExpiredCard,

    #[error("Invalid payment method")]
    InvalidMethod,

    #[error("Refund amount exceeds available amount ({available} available)")]
    RefundExceedsAvailable { available: i64 },

    #[error("Invalid API credentials")]
    Authentication,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Validation(_) => "BAD_REQUEST_ERROR",
            GatewayError::NotFound(_) => "NOT_FOUND_ERROR",
            GatewayError::InvalidState(_) => "INVALID_STATE_ERROR",
            GatewayError::InvalidVpa => "INVALID_VPA",
            GatewayError::InvalidCard => "INVALID_CARD",
            GatewayError::ExpiredCard => "EXPIRED_CARD",
            GatewayError::InvalidMethod => "INVALID_METHOD",
            GatewayError::RefundExceedsAvailable { .. } => "REFUND_EXCEEDS_AVAILABLE",
            GatewayError::Authentication => "AUTHENTICATION_ERROR",
            GatewayError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Authentication => StatusCode::UNAUTHORIZED,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        let description = match self {
            // store/queue failures stay in the logs
            GatewayError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        ErrorEnvelope {
            error: ErrorPayload {
                code: self.code().to_string(),
                description,
            },
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        if let GatewayError::Internal(err) = &self {
            tracing::error!(error = %err, "request failed");
        }
        (self.status(), Json(self.envelope())).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorPayload,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub description: String,
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(GatewayError::InvalidVpa.code(), "INVALID_VPA");
        assert_eq!(
            GatewayError::RefundExceedsAvailable { available: 10 }.code(),
            "REFUND_EXCEEDS_AVAILABLE"
        );
        assert_eq!(
            GatewayError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = GatewayError::from(anyhow::anyhow!("connection refused"));
        let env = err.envelope();
        assert_eq!(env.error.code, "INTERNAL_ERROR");
        assert!(!env.error.description.contains("refused"));
    }
}
