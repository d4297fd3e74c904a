use crate::error::GatewayError;
use crate::AppState;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

pub const API_KEY_HEADER: &str = "X-Api-Key";
pub const API_SECRET_HEADER: &str = "X-Api-Secret";

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resolves the API key pair to an active merchant and stores it as a request
/// extension for the handlers.
pub async fn require_merchant(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let credentials = {
        let headers = request.headers();
        (header(headers, API_KEY_HEADER), header(headers, API_SECRET_HEADER))
    };
    let (Some(api_key), Some(api_secret)) = credentials else {
        return Err(GatewayError::Authentication);
    };

    let merchant = state
        .store
        .authenticate(&api_key, &api_secret)
        .await?
        .ok_or(GatewayError::Authentication)?;

    request.extensions_mut().insert(merchant);
    Ok(next.run(request).await)
}
