//! Billing error types

use thiserror::Error;

/// Result alias used throughout the billing crate
pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, Error)]
pub enum BillingError {
    /// No shared secret is configured, so no webhook can be authenticated
    #[error("Paddle webhook secret is not configured")]
    WebhookNotConfigured,

    /// Missing, malformed, stale or mismatched `Paddle-Signature`
    #[error("Invalid webhook signature")]
    WebhookSignatureInvalid,

    /// Body is not a decodable webhook envelope
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    /// Envelope decoded but `event_id` or `event_type` is blank
    #[error("Webhook payload missing event metadata")]
    MissingEventMetadata,

    /// The event was claimed but applying it to billing state failed
    #[error("Webhook reconciliation failed: {0}")]
    ReconciliationFailed(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillingError {
    /// Whether the sender should redeliver after seeing this error.
    ///
    /// Authentication and malformed-input rejections are terminal for this
    /// delivery; infrastructure and reconciliation failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BillingError::ReconciliationFailed(_)
                | BillingError::Database(_)
                | BillingError::Internal(_)
                | BillingError::WebhookNotConfigured
        )
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(e: sqlx::Error) -> Self {
        BillingError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for BillingError {
    fn from(e: serde_json::Error) -> Self {
        BillingError::InvalidPayload(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(BillingError::Database("down".into()).is_retryable());
        assert!(BillingError::ReconciliationFailed("fk".into()).is_retryable());
        assert!(!BillingError::WebhookSignatureInvalid.is_retryable());
        assert!(!BillingError::MissingEventMetadata.is_retryable());
        assert!(!BillingError::InvalidPayload("eof".into()).is_retryable());
    }
}
