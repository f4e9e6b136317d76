//! Idempotency ledger for inbound webhook events
//!
//! A claim is taken with one atomic insert-if-absent keyed by the upstream
//! event id. Whoever inserts the row owns the event; every other delivery of
//! the same id sees `claimed == false` and must not reconcile.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ClaimPolicy;
use crate::error::BillingResult;
use crate::store::{BillingStore, ClaimHealth, ClaimStatus, EventClaimRecord};

/// Attempts made for a finalize write before giving up
const FINALIZE_ATTEMPTS: usize = 2;

#[derive(Clone)]
pub struct IdempotencyLedger {
    store: Arc<dyn BillingStore>,
    policy: ClaimPolicy,
}

impl IdempotencyLedger {
    pub fn new(store: Arc<dyn BillingStore>, policy: ClaimPolicy) -> Self {
        Self { store, policy }
    }

    /// Try to take exclusive processing rights for `event_id`.
    ///
    /// `Ok(false)` means another delivery already owns (or owned) the event.
    /// A store failure is returned as an error so the sender redelivers.
    pub async fn claim(&self, event_id: &str, event_type: &str) -> BillingResult<bool> {
        let claimed = self
            .store
            .insert_claim(event_id, event_type, self.policy)
            .await
            .map_err(|e| {
                tracing::error!(
                    event_id = %event_id,
                    event_type = %event_type,
                    error = %e,
                    "Failed to claim webhook event for processing"
                );
                e
            })?;

        if claimed {
            tracing::debug!(event_id = %event_id, event_type = %event_type, "Webhook event claimed");
        }
        Ok(claimed)
    }

    /// Record the terminal status of a claimed event.
    ///
    /// Best effort: failures are retried once and then logged, never returned.
    pub async fn finalize(&self, event_id: &str, status: ClaimStatus, error_message: Option<&str>) {
        let mut last_error = None;

        for attempt in 1..=FINALIZE_ATTEMPTS {
            match self
                .store
                .finalize_claim(event_id, status, error_message)
                .await
            {
                Ok(()) => return,
                Err(e) => {
                    if attempt < FINALIZE_ATTEMPTS {
                        tracing::warn!(
                            event_id = %event_id,
                            error = %e,
                            "First attempt to finalize webhook event failed, retrying..."
                        );
                    }
                    last_error = Some(e);
                }
            }
        }

        if let Some(e) = last_error {
            tracing::error!(
                event_id = %event_id,
                status = %status,
                error_message = ?error_message,
                error = %e,
                "CRITICAL: Failed to finalize webhook claim after retry. \
                 Event may appear stuck in 'processing' state. \
                 Manual intervention may be required."
            );
        }
    }

    /// Why a claim was refused, for duplicate-delivery logging
    pub async fn describe_existing(&self, event_id: &str) -> &'static str {
        match self.store.find_claim(event_id).await {
            Ok(Some(record)) => match record.status {
                ClaimStatus::Processed => "already processed successfully",
                ClaimStatus::Processing => "currently being processed by another worker",
                ClaimStatus::Failed => "previously failed reconciliation",
            },
            Ok(None) => "unknown (race condition?)",
            Err(_) => "unknown (lookup failed)",
        }
    }

    pub async fn find_claim(&self, event_id: &str) -> BillingResult<Option<EventClaimRecord>> {
        self.store.find_claim(event_id).await
    }

    pub async fn list_claims(
        &self,
        status: Option<ClaimStatus>,
        limit: i64,
        offset: i64,
    ) -> BillingResult<Vec<EventClaimRecord>> {
        self.store
            .list_claims(status, limit.clamp(1, 500), offset.max(0))
            .await
    }

    pub async fn health(&self, stuck_after: Duration) -> BillingResult<ClaimHealth> {
        self.store.claim_health(stuck_after).await
    }
}
