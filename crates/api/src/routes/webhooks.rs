//! Paddle webhook route

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use billhook_billing::{WebhookReceipt, SIGNATURE_HEADER};

use crate::{
    error::ApiResult,
    routes::{success, ApiResponse},
    state::AppState,
};

/// Receive a Paddle notification.
///
/// The raw body is passed through untouched: the signature covers the exact
/// bytes Paddle sent.
pub async fn paddle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ApiResponse<WebhookReceipt>>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let receipt = state.billing.webhooks.handle(signature, &body).await?;
    let message = receipt.outcome.message();

    Ok(success(receipt, message))
}
