//! Durable store behind the webhook pipeline
//!
//! Every cross-request guarantee of the pipeline is delegated to this trait:
//! the claim insert must be a single atomic insert-if-absent keyed by event
//! id, and each reconciliation write must be a single atomic statement.
//! Nothing above this layer holds locks.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgBillingStore;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use billhook_shared::TenantId;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::ClaimPolicy;
use crate::error::BillingResult;
use crate::status::{InvoiceStatus, SubscriptionStatus};

/// Lifecycle of a claim row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Processing,
    Processed,
    Failed,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Processing => "processing",
            ClaimStatus::Processed => "processed",
            ClaimStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "processing" => Some(ClaimStatus::Processing),
            "processed" => Some(ClaimStatus::Processed),
            "failed" => Some(ClaimStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the claim ledger
#[derive(Debug, Clone, Serialize)]
pub struct EventClaimRecord {
    pub event_id: String,
    pub event_type: String,
    pub status: ClaimStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub processed_at: Option<OffsetDateTime>,
    pub error_message: Option<String>,
}

/// Counts used by the claim audit sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClaimHealth {
    pub processing: i64,
    pub processed: i64,
    pub failed: i64,
    /// `processing` claims older than the stuck threshold
    pub stuck: i64,
}

/// Billing projection of an organisation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantBilling {
    pub tenant_id: TenantId,
    pub plan_id: String,
    pub subscription_status: SubscriptionStatus,
    pub paddle_customer_id: Option<String>,
    pub paddle_subscription_id: Option<String>,
    pub current_period_ends_at: Option<OffsetDateTime>,
    pub paddle_updated_at: Option<OffsetDateTime>,
}

/// A plan from the local catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRecord {
    pub id: String,
    pub display_name: String,
    pub monthly_price_cents: i32,
    pub paddle_price_id: Option<String>,
}

/// Organisation billing state joined with its plan, for reporting
#[derive(Debug, Clone)]
pub struct BillingOverviewRow {
    pub plan_id: String,
    pub plan_display_name: String,
    pub monthly_price_cents: i32,
    pub subscription_status: SubscriptionStatus,
    pub paddle_customer_id: Option<String>,
    pub paddle_subscription_id: Option<String>,
    pub current_period_ends_at: Option<OffsetDateTime>,
}

/// Stored invoice, one per Paddle transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRecord {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub paddle_transaction_id: String,
    pub paddle_invoice_id: Option<String>,
    pub invoice_number: Option<String>,
    pub status: InvoiceStatus,
    pub currency_code: Option<String>,
    pub total_amount_cents: i64,
    pub billed_at: Option<OffsetDateTime>,
    pub invoice_url: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Merge-upsert of a subscription event onto an organisation.
///
/// `None` fields keep the stored value. `price_id` only changes the plan when
/// a catalog plan carries that Paddle price id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    pub tenant_id: TenantId,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub status: SubscriptionStatus,
    pub current_period_ends_at: Option<OffsetDateTime>,
    pub price_id: Option<String>,
}

/// Overwrite-upsert of a transaction snapshot, keyed by `transaction_id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceUpsert {
    pub tenant_id: TenantId,
    pub transaction_id: String,
    pub invoice_id: Option<String>,
    pub invoice_number: Option<String>,
    pub status: InvoiceStatus,
    pub currency_code: Option<String>,
    pub total_amount_cents: i64,
    pub billed_at: Option<OffsetDateTime>,
    pub invoice_url: Option<String>,
}

#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Atomically create a `processing` claim for `event_id`.
    ///
    /// Returns `false` when a claim already exists and `policy` does not allow
    /// taking it over. Must be one indivisible statement.
    async fn insert_claim(
        &self,
        event_id: &str,
        event_type: &str,
        policy: ClaimPolicy,
    ) -> BillingResult<bool>;

    /// Set the terminal status of an existing claim
    async fn finalize_claim(
        &self,
        event_id: &str,
        status: ClaimStatus,
        error_message: Option<&str>,
    ) -> BillingResult<()>;

    async fn find_claim(&self, event_id: &str) -> BillingResult<Option<EventClaimRecord>>;

    /// Claims newest first, optionally filtered by status
    async fn list_claims(
        &self,
        status: Option<ClaimStatus>,
        limit: i64,
        offset: i64,
    ) -> BillingResult<Vec<EventClaimRecord>>;

    async fn claim_health(&self, stuck_after: Duration) -> BillingResult<ClaimHealth>;

    async fn tenant_by_subscription(&self, subscription_id: &str)
        -> BillingResult<Option<TenantId>>;

    async fn tenant_by_customer(&self, customer_id: &str) -> BillingResult<Option<TenantId>>;

    async fn find_tenant(&self, tenant_id: &TenantId) -> BillingResult<Option<TenantBilling>>;

    /// Apply a merge-upsert; returns the number of organisations updated
    async fn merge_subscription(&self, update: &SubscriptionUpdate) -> BillingResult<u64>;

    async fn upsert_invoice(&self, upsert: &InvoiceUpsert) -> BillingResult<()>;

    async fn find_invoice(&self, transaction_id: &str) -> BillingResult<Option<InvoiceRecord>>;

    async fn billing_overview(&self, tenant_id: &TenantId)
        -> BillingResult<Option<BillingOverviewRow>>;

    /// Invoices ordered by `billed_at DESC NULLS LAST, created_at DESC`
    async fn recent_invoices(
        &self,
        tenant_id: &TenantId,
        limit: i64,
    ) -> BillingResult<Vec<InvoiceRecord>>;
}
