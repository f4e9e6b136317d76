//! In-memory implementation of [`BillingStore`]
//!
//! Mirrors the Postgres semantics closely enough to run the whole pipeline
//! without a database: the claim insert is atomic under one lock, the
//! subscription merge follows the same COALESCE rules, and invoices enforce
//! the organisation foreign key.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use billhook_shared::TenantId;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    BillingOverviewRow, BillingStore, ClaimHealth, ClaimStatus, EventClaimRecord, InvoiceRecord,
    InvoiceUpsert, PlanRecord, SubscriptionUpdate, TenantBilling,
};
use crate::config::ClaimPolicy;
use crate::error::{BillingError, BillingResult};
use crate::status::SubscriptionStatus;

#[derive(Default)]
struct MemoryState {
    claims: HashMap<String, EventClaimRecord>,
    tenants: HashMap<TenantId, TenantBilling>,
    plans: Vec<PlanRecord>,
    invoices: HashMap<String, InvoiceRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plan to the catalog
    pub fn with_plan(
        mut self,
        id: &str,
        display_name: &str,
        monthly_price_cents: i32,
        paddle_price_id: Option<&str>,
    ) -> Self {
        self.state.get_mut().plans.push(PlanRecord {
            id: id.to_string(),
            display_name: display_name.to_string(),
            monthly_price_cents,
            paddle_price_id: paddle_price_id.map(str::to_string),
        });
        self
    }

    /// Add an organisation on `plan_id` with no Paddle identifiers yet
    pub fn with_tenant(mut self, tenant_id: &str, plan_id: &str) -> Self {
        if let Some(tenant_id) = TenantId::parse(tenant_id) {
            self.state.get_mut().tenants.insert(
                tenant_id.clone(),
                TenantBilling {
                    tenant_id,
                    plan_id: plan_id.to_string(),
                    subscription_status: SubscriptionStatus::Inactive,
                    paddle_customer_id: None,
                    paddle_subscription_id: None,
                    current_period_ends_at: None,
                    paddle_updated_at: None,
                },
            );
        }
        self
    }

    /// Add a fully specified organisation
    pub fn with_tenant_billing(mut self, tenant: TenantBilling) -> Self {
        self.state
            .get_mut()
            .tenants
            .insert(tenant.tenant_id.clone(), tenant);
        self
    }

    /// Number of invoice rows, for assertions
    pub async fn invoice_count(&self) -> usize {
        self.state.lock().await.invoices.len()
    }
}

fn is_stuck(claim: &EventClaimRecord, stuck_after: Duration, now: OffsetDateTime) -> bool {
    claim.status == ClaimStatus::Processing && claim.received_at + stuck_after < now
}

/// Claim messages form an audit trail; new entries never replace old ones
fn append_message(trail: &mut Option<String>, message: &str) {
    *trail = Some(match trail.take() {
        Some(existing) => format!("{} | {}", existing, message),
        None => message.to_string(),
    });
}

#[async_trait]
impl BillingStore for MemoryStore {
    async fn insert_claim(
        &self,
        event_id: &str,
        event_type: &str,
        policy: ClaimPolicy,
    ) -> BillingResult<bool> {
        let mut state = self.state.lock().await;
        let now = OffsetDateTime::now_utc();

        if let Some(existing) = state.claims.get_mut(event_id) {
            let reclaimable = match policy {
                ClaimPolicy::Never => false,
                ClaimPolicy::ReclaimFailed { stuck_after } => {
                    existing.status == ClaimStatus::Failed || is_stuck(existing, stuck_after, now)
                }
            };
            if !reclaimable {
                return Ok(false);
            }
            let note = format!("Reclaimed from {} at {}", existing.status, now);
            append_message(&mut existing.error_message, &note);
            existing.status = ClaimStatus::Processing;
            existing.received_at = now;
            existing.processed_at = None;
            return Ok(true);
        }

        state.claims.insert(
            event_id.to_string(),
            EventClaimRecord {
                event_id: event_id.to_string(),
                event_type: event_type.to_string(),
                status: ClaimStatus::Processing,
                received_at: now,
                processed_at: None,
                error_message: None,
            },
        );
        Ok(true)
    }

    async fn finalize_claim(
        &self,
        event_id: &str,
        status: ClaimStatus,
        error_message: Option<&str>,
    ) -> BillingResult<()> {
        let mut state = self.state.lock().await;
        if let Some(claim) = state.claims.get_mut(event_id) {
            claim.status = status;
            claim.processed_at = Some(OffsetDateTime::now_utc());
            if let Some(message) = error_message.filter(|m| !m.is_empty()) {
                append_message(&mut claim.error_message, message);
            }
        }
        Ok(())
    }

    async fn find_claim(&self, event_id: &str) -> BillingResult<Option<EventClaimRecord>> {
        Ok(self.state.lock().await.claims.get(event_id).cloned())
    }

    async fn list_claims(
        &self,
        status: Option<ClaimStatus>,
        limit: i64,
        offset: i64,
    ) -> BillingResult<Vec<EventClaimRecord>> {
        let state = self.state.lock().await;
        let mut claims: Vec<EventClaimRecord> = state
            .claims
            .values()
            .filter(|c| status.map_or(true, |s| c.status == s))
            .cloned()
            .collect();
        claims.sort_by(|a, b| b.received_at.cmp(&a.received_at));

        Ok(claims
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn claim_health(&self, stuck_after: Duration) -> BillingResult<ClaimHealth> {
        let state = self.state.lock().await;
        let now = OffsetDateTime::now_utc();
        let mut health = ClaimHealth::default();
        for claim in state.claims.values() {
            match claim.status {
                ClaimStatus::Processing => health.processing += 1,
                ClaimStatus::Processed => health.processed += 1,
                ClaimStatus::Failed => health.failed += 1,
            }
            if is_stuck(claim, stuck_after, now) {
                health.stuck += 1;
            }
        }
        Ok(health)
    }

    async fn tenant_by_subscription(
        &self,
        subscription_id: &str,
    ) -> BillingResult<Option<TenantId>> {
        let state = self.state.lock().await;
        Ok(state
            .tenants
            .values()
            .find(|t| t.paddle_subscription_id.as_deref() == Some(subscription_id))
            .map(|t| t.tenant_id.clone()))
    }

    async fn tenant_by_customer(&self, customer_id: &str) -> BillingResult<Option<TenantId>> {
        let state = self.state.lock().await;
        Ok(state
            .tenants
            .values()
            .find(|t| t.paddle_customer_id.as_deref() == Some(customer_id))
            .map(|t| t.tenant_id.clone()))
    }

    async fn find_tenant(&self, tenant_id: &TenantId) -> BillingResult<Option<TenantBilling>> {
        Ok(self.state.lock().await.tenants.get(tenant_id).cloned())
    }

    async fn merge_subscription(&self, update: &SubscriptionUpdate) -> BillingResult<u64> {
        let mut state = self.state.lock().await;

        let plan_id = update.price_id.as_deref().and_then(|price| {
            state
                .plans
                .iter()
                .find(|p| p.paddle_price_id.as_deref() == Some(price))
                .map(|p| p.id.clone())
        });

        let Some(tenant) = state.tenants.get_mut(&update.tenant_id) else {
            return Ok(0);
        };

        if let Some(customer_id) = update.customer_id.as_ref().filter(|s| !s.is_empty()) {
            tenant.paddle_customer_id = Some(customer_id.clone());
        }
        if let Some(subscription_id) = update.subscription_id.as_ref().filter(|s| !s.is_empty()) {
            tenant.paddle_subscription_id = Some(subscription_id.clone());
        }
        tenant.subscription_status = update.status;
        if let Some(ends_at) = update.current_period_ends_at {
            tenant.current_period_ends_at = Some(ends_at);
        }
        if let Some(plan_id) = plan_id {
            tenant.plan_id = plan_id;
        }
        tenant.paddle_updated_at = Some(OffsetDateTime::now_utc());

        Ok(1)
    }

    async fn upsert_invoice(&self, upsert: &InvoiceUpsert) -> BillingResult<()> {
        let mut state = self.state.lock().await;

        if !state.tenants.contains_key(&upsert.tenant_id) {
            return Err(BillingError::Database(format!(
                "insert or update on table \"billing_invoices\" violates foreign key constraint: organisation {} does not exist",
                upsert.tenant_id
            )));
        }

        let now = OffsetDateTime::now_utc();
        let (id, tenant_id, created_at) = match state.invoices.get(&upsert.transaction_id) {
            // organisation_id is not part of the overwrite set
            Some(existing) => (existing.id, existing.tenant_id.clone(), existing.created_at),
            None => (Uuid::new_v4(), upsert.tenant_id.clone(), now),
        };

        state.invoices.insert(
            upsert.transaction_id.clone(),
            InvoiceRecord {
                id,
                tenant_id,
                paddle_transaction_id: upsert.transaction_id.clone(),
                paddle_invoice_id: upsert.invoice_id.clone(),
                invoice_number: upsert.invoice_number.clone(),
                status: upsert.status,
                currency_code: upsert.currency_code.clone(),
                total_amount_cents: upsert.total_amount_cents,
                billed_at: upsert.billed_at,
                invoice_url: upsert.invoice_url.clone(),
                created_at,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn find_invoice(&self, transaction_id: &str) -> BillingResult<Option<InvoiceRecord>> {
        Ok(self.state.lock().await.invoices.get(transaction_id).cloned())
    }

    async fn billing_overview(
        &self,
        tenant_id: &TenantId,
    ) -> BillingResult<Option<BillingOverviewRow>> {
        let state = self.state.lock().await;
        let Some(tenant) = state.tenants.get(tenant_id) else {
            return Ok(None);
        };
        // Inner join semantics: an organisation on an unknown plan has no row
        let Some(plan) = state.plans.iter().find(|p| p.id == tenant.plan_id) else {
            return Ok(None);
        };

        Ok(Some(BillingOverviewRow {
            plan_id: plan.id.clone(),
            plan_display_name: plan.display_name.clone(),
            monthly_price_cents: plan.monthly_price_cents,
            subscription_status: tenant.subscription_status,
            paddle_customer_id: tenant.paddle_customer_id.clone(),
            paddle_subscription_id: tenant.paddle_subscription_id.clone(),
            current_period_ends_at: tenant.current_period_ends_at,
        }))
    }

    async fn recent_invoices(
        &self,
        tenant_id: &TenantId,
        limit: i64,
    ) -> BillingResult<Vec<InvoiceRecord>> {
        let state = self.state.lock().await;
        let mut invoices: Vec<InvoiceRecord> = state
            .invoices
            .values()
            .filter(|i| &i.tenant_id == tenant_id)
            .cloned()
            .collect();

        invoices.sort_by(|a, b| match (a.billed_at, b.billed_at) {
            (Some(x), Some(y)) => y.cmp(&x).then(b.created_at.cmp(&a.created_at)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => b.created_at.cmp(&a.created_at),
        });
        invoices.truncate(limit.max(0) as usize);

        Ok(invoices)
    }
}
