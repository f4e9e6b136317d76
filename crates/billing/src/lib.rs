// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Billhook Billing Module
//!
//! Ingests Paddle webhook notifications and applies them to organisation
//! billing state.
//!
//! ## Features
//!
//! - **Signature Verification**: `Paddle-Signature` HMAC-SHA256 with a replay window
//! - **Idempotency Ledger**: atomic per-event claims so duplicate deliveries apply once
//! - **Tenant Resolution**: custom data, then subscription id, then customer id
//! - **Reconciliation**: subscription merge-upserts and transaction invoice upserts
//! - **Reporting**: read-only billing overview and invoice list

pub mod config;
pub mod error;
pub mod event;
pub mod extract;
pub mod ledger;
pub mod reconcile;
pub mod reporting;
pub mod resolver;
pub mod signature;
pub mod status;
pub mod store;
pub mod webhooks;


// Config
pub use config::{ClaimPolicy, PaddleConfig, DEFAULT_STUCK_AFTER};

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use event::{EventFamily, VerifiedEvent, WebhookEvent};

// Ledger
pub use ledger::IdempotencyLedger;

// Reconciliation
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use resolver::{ResolutionSource, ResolvedTenant, TenantLookup, TenantResolver};

// Reporting
pub use reporting::{BillingOverview, InvoiceSummary, ReportingService, INVOICE_LIST_LIMIT};

// Signature
pub use signature::{SignatureVerifier, SIGNATURE_HEADER};

// Status
pub use status::{InvoiceStatus, SubscriptionStatus};

// Store
pub use store::{
    BillingStore, ClaimHealth, ClaimStatus, EventClaimRecord, MemoryStore, PgBillingStore,
};

// Webhooks
pub use webhooks::{WebhookHandler, WebhookOutcome, WebhookReceipt};

use std::sync::Arc;

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
#[derive(Clone)]
pub struct BillingService {
    pub webhooks: WebhookHandler,
    pub ledger: IdempotencyLedger,
    pub reporting: ReportingService,
}

impl BillingService {
    /// Create a billing service over any store
    pub fn new(config: &PaddleConfig, store: Arc<dyn BillingStore>) -> Self {
        let webhooks = WebhookHandler::new(config, store.clone());
        Self {
            ledger: webhooks.ledger().clone(),
            reporting: ReportingService::new(store, config.api_key_configured),
            webhooks,
        }
    }

    /// Create a billing service backed by Postgres
    pub fn from_pool(config: &PaddleConfig, pool: PgPool) -> Self {
        Self::new(config, Arc::new(PgBillingStore::new(pool)))
    }
}
