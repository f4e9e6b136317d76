//! Paddle webhook handling
//!
//! Composes verification, decoding, the idempotency claim, tenant resolution
//! and reconciliation into the lifecycle of one delivery:
//!
//! `received -> verified -> decoded -> claimed -> resolved -> reconciled -> finalized`
//!
//! Nothing durable happens before the claim. Once claimed, the event is always
//! finalized, whatever reconciliation did.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::config::PaddleConfig;
use crate::error::{BillingError, BillingResult};
use crate::event::WebhookEvent;
use crate::ledger::IdempotencyLedger;
use crate::reconcile::{ReconcileOutcome, Reconciler};
use crate::signature::SignatureVerifier;
use crate::store::{BillingStore, ClaimStatus};

/// HTTP-visible result of a delivery that was accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// Reconciliation wrote billing state
    Processed,
    /// A previous delivery already claimed this event
    AlreadyProcessed,
    /// Claimed and finalized without side effects
    Ignored,
}

impl WebhookOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed => "Webhook processed successfully",
            WebhookOutcome::AlreadyProcessed => "Webhook already processed",
            WebhookOutcome::Ignored => "Webhook acknowledged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookReceipt {
    pub event_id: String,
    pub event_type: String,
    pub outcome: WebhookOutcome,
}

/// Webhook handler for Paddle notifications
#[derive(Clone)]
pub struct WebhookHandler {
    verifier: SignatureVerifier,
    ledger: IdempotencyLedger,
    reconciler: Reconciler,
}

impl WebhookHandler {
    pub fn new(config: &PaddleConfig, store: Arc<dyn BillingStore>) -> Self {
        Self {
            verifier: SignatureVerifier::new(
                config.webhook_secret.clone(),
                config.signature_tolerance,
            ),
            ledger: IdempotencyLedger::new(store.clone(), config.claim_policy),
            reconciler: Reconciler::new(store),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.verifier.is_configured()
    }

    pub fn ledger(&self) -> &IdempotencyLedger {
        &self.ledger
    }

    /// Authenticate the raw body against its `Paddle-Signature` header
    pub fn verify(&self, signature: Option<&str>, body: &[u8]) -> BillingResult<()> {
        if !self.verifier.is_configured() {
            return Err(BillingError::WebhookNotConfigured);
        }

        let signature = signature.map(str::trim).unwrap_or_default();
        if signature.is_empty() {
            tracing::warn!("Paddle webhook received without signature header");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        if !self.verifier.verify(signature, body) {
            tracing::warn!(body_len = body.len(), "Paddle webhook signature rejected");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        Ok(())
    }

    /// Process one delivery end to end.
    ///
    /// Errors before the claim leave no durable trace. A reconciliation
    /// failure is finalized as `failed` and returned as
    /// [`BillingError::ReconciliationFailed`].
    pub async fn handle(&self, signature: Option<&str>, body: &[u8]) -> BillingResult<WebhookReceipt> {
        let started_at = Instant::now();

        self.verify(signature, body)?;

        let event = WebhookEvent::decode(body).map_err(|e| {
            tracing::warn!(error = %e, "Rejected undecodable Paddle webhook");
            e
        })?;

        let claimed = self.ledger.claim(&event.event_id, &event.event_type).await?;
        if !claimed {
            let reason = self.ledger.describe_existing(&event.event_id).await;
            tracing::info!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                reason = %reason,
                "Duplicate Paddle webhook event - atomic idempotency check"
            );
            return Ok(WebhookReceipt {
                event_id: event.event_id,
                event_type: event.event_type,
                outcome: WebhookOutcome::AlreadyProcessed,
            });
        }

        tracing::info!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            "Processing Paddle webhook event (claimed exclusive processing rights)"
        );

        // Reconcile and finalize outlive the request future, so a timeout or a
        // dropped connection cannot leave the claim stuck in `processing`.
        let reconciler = self.reconciler.clone();
        let ledger = self.ledger.clone();
        let (event, result) = tokio::spawn(async move {
            let result = reconciler.reconcile(&event).await;
            match &result {
                Ok(_) => {
                    ledger
                        .finalize(&event.event_id, ClaimStatus::Processed, None)
                        .await
                }
                Err(e) => {
                    let message = e.to_string();
                    ledger
                        .finalize(&event.event_id, ClaimStatus::Failed, Some(&message))
                        .await
                }
            }
            (event, result)
        })
        .await
        .map_err(|e| BillingError::Internal(format!("webhook processing task failed: {}", e)))?;

        match result {
            Ok(outcome) => {
                tracing::info!(
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    result = outcome.as_str(),
                    duration_ms = started_at.elapsed().as_millis() as u64,
                    "Paddle webhook processed successfully"
                );
                Ok(WebhookReceipt {
                    event_id: event.event_id,
                    event_type: event.event_type,
                    outcome: receipt_outcome(&outcome),
                })
            }
            Err(e) => {
                tracing::error!(
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    error = %e,
                    retryable = e.is_retryable(),
                    duration_ms = started_at.elapsed().as_millis() as u64,
                    "Paddle webhook processing failed"
                );
                Err(e)
            }
        }
    }
}

fn receipt_outcome(outcome: &ReconcileOutcome) -> WebhookOutcome {
    if outcome.is_noop() {
        WebhookOutcome::Ignored
    } else {
        WebhookOutcome::Processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::sign;
    use crate::store::MemoryStore;
    use time::OffsetDateTime;

    const SECRET: &str = "pdl_ntfset_webhook_tests";

    fn handler(secret: &str) -> WebhookHandler {
        let config = PaddleConfig {
            webhook_secret: secret.to_string(),
            ..PaddleConfig::default()
        };
        let store = MemoryStore::new()
            .with_plan("free", "Free", 0, None)
            .with_tenant("org_1", "free");
        WebhookHandler::new(&config, Arc::new(store))
    }

    fn signed(body: &[u8]) -> String {
        sign(OffsetDateTime::now_utc().unix_timestamp(), body, SECRET).unwrap()
    }

    #[tokio::test]
    async fn test_unconfigured_secret_rejects_everything() {
        let handler = handler("");
        let body = br#"{"event_id":"evt_1","event_type":"subscription.updated"}"#;
        let err = handler.handle(Some(&signed(body)), body).await.unwrap_err();
        assert!(matches!(err, BillingError::WebhookNotConfigured));
    }

    #[tokio::test]
    async fn test_missing_or_bad_signature_rejected_before_claim() {
        let handler = handler(SECRET);
        let body = br#"{"event_id":"evt_1","event_type":"subscription.updated"}"#;

        let err = handler.handle(None, body).await.unwrap_err();
        assert!(matches!(err, BillingError::WebhookSignatureInvalid));

        let err = handler.handle(Some("  "), body).await.unwrap_err();
        assert!(matches!(err, BillingError::WebhookSignatureInvalid));

        let err = handler
            .handle(Some("ts=1;h1=deadbeef"), body)
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::WebhookSignatureInvalid));

        assert!(handler.ledger().find_claim("evt_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_body_rejected_before_claim() {
        let handler = handler(SECRET);

        let body = b"{not json";
        let err = handler.handle(Some(&signed(body)), body).await.unwrap_err();
        assert!(matches!(err, BillingError::InvalidPayload(_)));

        let body = br#"{"event_id":"","event_type":"subscription.updated"}"#;
        let err = handler.handle(Some(&signed(body)), body).await.unwrap_err();
        assert!(matches!(err, BillingError::MissingEventMetadata));

        let claims = handler.ledger().list_claims(None, 10, 0).await.unwrap();
        assert!(claims.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_delivery_short_circuits() {
        let handler = handler(SECRET);
        let body = br#"{"event_id":"evt_1","event_type":"subscription.updated","data":{"id":"sub_1","custom_data":{"organisation_id":"org_1"}}}"#;

        let first = handler.handle(Some(&signed(body)), body).await.unwrap();
        assert_eq!(first.outcome, WebhookOutcome::Processed);

        let second = handler.handle(Some(&signed(body)), body).await.unwrap();
        assert_eq!(second.outcome, WebhookOutcome::AlreadyProcessed);
        assert_eq!(second.event_id, "evt_1");
    }

    #[tokio::test]
    async fn test_noop_event_is_finalized_processed() {
        let handler = handler(SECRET);
        let body = br#"{"event_id":"evt_2","event_type":"customer.created","data":{"id":"ctm_1"}}"#;

        let receipt = handler.handle(Some(&signed(body)), body).await.unwrap();
        assert_eq!(receipt.outcome, WebhookOutcome::Ignored);

        let claim = handler.ledger().find_claim("evt_2").await.unwrap().unwrap();
        assert_eq!(claim.status, ClaimStatus::Processed);
    }

    #[tokio::test]
    async fn test_reconciliation_failure_is_finalized_failed() {
        let handler = handler(SECRET);
        let body = br#"{"event_id":"evt_3","event_type":"transaction.paid","data":{"id":"txn_1","custom_data":{"organisation_id":"org_ghost"}}}"#;

        let err = handler.handle(Some(&signed(body)), body).await.unwrap_err();
        assert!(matches!(err, BillingError::ReconciliationFailed(_)));

        let claim = handler.ledger().find_claim("evt_3").await.unwrap().unwrap();
        assert_eq!(claim.status, ClaimStatus::Failed);
        assert!(claim.error_message.unwrap().contains("org_ghost"));
    }

    #[test]
    fn test_outcome_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(WebhookOutcome::AlreadyProcessed).unwrap(),
            serde_json::json!("already_processed")
        );
    }
}
