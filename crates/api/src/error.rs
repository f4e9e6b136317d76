//! API error type and HTTP mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use billhook_billing::BillingError;
use serde_json::json;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::WebhookNotConfigured => {
                ApiError::ServiceUnavailable("Paddle webhooks are not configured".to_string())
            }
            BillingError::WebhookSignatureInvalid => {
                ApiError::Unauthorized("Invalid webhook signature".to_string())
            }
            BillingError::InvalidPayload(msg) => ApiError::Validation(format!("Invalid payload: {}", msg)),
            BillingError::MissingEventMetadata => {
                ApiError::Validation("Missing event_id or event_type".to_string())
            }
            BillingError::NotFound(msg) => ApiError::NotFound(msg),
            BillingError::Database(msg) => ApiError::Database(msg),
            e @ (BillingError::ReconciliationFailed(_)
            | BillingError::Config(_)
            | BillingError::Internal(_)) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ApiError::Database(detail) | ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed with internal error");
                "Internal server error".to_string()
            }
            ApiError::Unauthorized(msg)
            | ApiError::Validation(msg)
            | ApiError::NotFound(msg)
            | ApiError::ServiceUnavailable(msg) => msg.clone(),
        };

        let body = Json(json!({
            "status": "error",
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}
