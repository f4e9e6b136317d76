//! API routes

pub mod billing;
pub mod webhooks;

#[cfg(test)]
mod routes_tests;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::state::AppState;

/// Success envelope shared by every JSON route
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    pub message: String,
    pub data: T,
}

pub fn success<T: Serialize>(data: T, message: impl Into<String>) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        status: "success",
        message: message.into(),
        data,
    })
}

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/webhooks/paddle", post(webhooks::paddle_webhook))
        .route("/v1/billing", get(billing::billing_overview))
        .route("/v1/billing/invoices", get(billing::billing_invoices))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = match &state.pool {
        Some(pool) => match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => "ok",
            Err(e) => {
                tracing::warn!(error = %e, "Health check database probe failed");
                "unavailable"
            }
        },
        None => "not_configured",
    };

    let status = if database == "unavailable" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "ok" } else { "degraded" },
            "version": env!("CARGO_PKG_VERSION"),
            "database": database,
            "webhooks_configured": state.billing.webhooks.is_configured(),
        })),
    )
}
