//! Claim ledger audit sweep
//!
//! Reports ledger health on a schedule. The sweep only reads: failed and
//! stuck claims are surfaced for operators, never reset.

use std::time::Duration;

use billhook_billing::{BillingResult, ClaimHealth, ClaimStatus, IdempotencyLedger};
use tracing::{info, warn};

/// Failed claims listed individually per sweep
const FAILED_SAMPLE_SIZE: i64 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditReport {
    pub health: ClaimHealth,
    /// Event ids of the most recent failed claims
    pub recent_failures: Vec<String>,
}

impl AuditReport {
    pub fn needs_attention(&self) -> bool {
        self.health.failed > 0 || self.health.stuck > 0
    }
}

/// Run one audit pass over the claim ledger
pub async fn run_sweep(
    ledger: &IdempotencyLedger,
    stuck_after: Duration,
) -> BillingResult<AuditReport> {
    let health = ledger.health(stuck_after).await?;

    let failed = if health.failed > 0 {
        ledger
            .list_claims(Some(ClaimStatus::Failed), FAILED_SAMPLE_SIZE, 0)
            .await?
    } else {
        Vec::new()
    };

    for claim in &failed {
        warn!(
            event_id = %claim.event_id,
            event_type = %claim.event_type,
            error_message = ?claim.error_message,
            "Webhook claim failed reconciliation"
        );
    }

    let report = AuditReport {
        health,
        recent_failures: failed.into_iter().map(|c| c.event_id).collect(),
    };

    if report.needs_attention() {
        warn!(
            processing = health.processing,
            processed = health.processed,
            failed = health.failed,
            stuck = health.stuck,
            stuck_after_secs = stuck_after.as_secs(),
            "Claim ledger has failed or stuck webhook events - manual review required"
        );
    } else {
        info!(
            processing = health.processing,
            processed = health.processed,
            "Claim ledger healthy"
        );
    }

    Ok(report)
}
