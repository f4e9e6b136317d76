//! Apply verified events to durable billing state
//!
//! `subscription.*` events merge onto the organisation row: absent fields keep
//! what is stored. `transaction.*` events overwrite the invoice row keyed by
//! transaction id, so replaying a transaction snapshot is harmless.

use std::sync::Arc;

use billhook_shared::TenantId;
use serde_json::Value;

use crate::error::{BillingError, BillingResult};
use crate::event::{EventFamily, VerifiedEvent};
use crate::extract::{first_int, first_non_empty, first_timestamp};
use crate::resolver::{ResolutionSource, TenantLookup, TenantResolver};
use crate::status::{InvoiceStatus, SubscriptionStatus};
use crate::store::{BillingStore, InvoiceUpsert, SubscriptionUpdate};

// Candidate paths, highest precedence first
const STATUS: &[&str] = &["/status"];
const CUSTOMER_ID: &[&str] = &["/customer_id"];
const SUBSCRIPTION_ID: &[&str] = &["/id", "/subscription_id"];
const PERIOD_END: &[&str] = &["/next_billed_at", "/current_billing_period/ends_at"];
const PRICE_ID: &[&str] = &["/items/0/price/id", "/items/0/price_id"];

const TRANSACTION_ID: &[&str] = &["/id"];
const INVOICE_ID: &[&str] = &["/invoice_id"];
const INVOICE_NUMBER: &[&str] = &["/details/invoice_number"];
const CURRENCY: &[&str] = &["/currency_code", "/details/totals/currency_code"];
const TOTAL: &[&str] = &["/details/totals/grand_total", "/details/totals/total"];
const BILLED_AT: &[&str] = &["/billed_at", "/updated_at", "/created_at"];
const INVOICE_URL: &[&str] = &["/invoice_url", "/details/receipt_url"];

impl SubscriptionUpdate {
    /// Build the merge-upsert for a `subscription.*` payload
    pub fn from_payload(tenant_id: TenantId, data: &Value) -> Self {
        let status = first_non_empty(data, STATUS).unwrap_or_default();

        Self {
            tenant_id,
            customer_id: first_non_empty(data, CUSTOMER_ID),
            subscription_id: first_non_empty(data, SUBSCRIPTION_ID),
            status: SubscriptionStatus::normalise(&status),
            current_period_ends_at: first_timestamp(data, PERIOD_END),
            price_id: first_non_empty(data, PRICE_ID),
        }
    }
}

impl InvoiceUpsert {
    /// Build the overwrite-upsert for a `transaction.*` payload.
    ///
    /// Returns `None` without a transaction id: there is no key to upsert on.
    pub fn from_payload(tenant_id: TenantId, data: &Value) -> Option<Self> {
        let transaction_id = first_non_empty(data, TRANSACTION_ID)?;
        let status = first_non_empty(data, STATUS).unwrap_or_default();

        Some(Self {
            tenant_id,
            transaction_id,
            invoice_id: first_non_empty(data, INVOICE_ID),
            invoice_number: first_non_empty(data, INVOICE_NUMBER),
            status: InvoiceStatus::normalise(&status),
            currency_code: first_non_empty(data, CURRENCY),
            total_amount_cents: first_int(data, TOTAL),
            billed_at: first_timestamp(data, BILLED_AT),
            invoice_url: first_non_empty(data, INVOICE_URL),
        })
    }
}

/// What reconciliation did with an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    SubscriptionMerged {
        tenant_id: TenantId,
        source: ResolutionSource,
    },
    InvoiceUpserted {
        tenant_id: TenantId,
        transaction_id: String,
        source: ResolutionSource,
    },
    /// `data` absent or null
    EmptyPayload,
    /// Event family this pipeline does not reconcile
    UnhandledEventType,
    /// No resolution strategy produced a tenant
    TenantNotFound,
    /// Transaction payload without an `id`
    MissingTransactionId,
}

impl ReconcileOutcome {
    /// True when no billing state was written
    pub fn is_noop(&self) -> bool {
        !matches!(
            self,
            ReconcileOutcome::SubscriptionMerged { .. } | ReconcileOutcome::InvoiceUpserted { .. }
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::SubscriptionMerged { .. } => "subscription_merged",
            ReconcileOutcome::InvoiceUpserted { .. } => "invoice_upserted",
            ReconcileOutcome::EmptyPayload => "empty_payload",
            ReconcileOutcome::UnhandledEventType => "unhandled_event_type",
            ReconcileOutcome::TenantNotFound => "tenant_not_found",
            ReconcileOutcome::MissingTransactionId => "missing_transaction_id",
        }
    }
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn BillingStore>,
    resolver: TenantResolver,
}

impl Reconciler {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        let resolver = TenantResolver::new(store.clone());
        Self { store, resolver }
    }

    /// Resolve the tenant of `event` and apply its payload.
    ///
    /// Every failure is reported as [`BillingError::ReconciliationFailed`].
    pub async fn reconcile(&self, event: &VerifiedEvent) -> BillingResult<ReconcileOutcome> {
        let Some(data) = &event.data else {
            return Ok(ReconcileOutcome::EmptyPayload);
        };

        if event.family == EventFamily::Other {
            tracing::info!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                "Received unhandled Paddle event type - no handler configured"
            );
            return Ok(ReconcileOutcome::UnhandledEventType);
        }

        if !data.is_object() {
            return Err(BillingError::ReconciliationFailed(format!(
                "failed to decode {} webhook data: expected a JSON object",
                event.family.as_str()
            )));
        }

        let lookup = TenantLookup::from_payload(event.family, data);
        let Some(resolved) = self.resolver.resolve(&lookup).await else {
            tracing::info!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                subscription_id = ?lookup.subscription_id,
                customer_id = ?lookup.customer_id,
                "No organisation matches Paddle event - skipping"
            );
            return Ok(ReconcileOutcome::TenantNotFound);
        };

        match event.family {
            EventFamily::Subscription => {
                let update = SubscriptionUpdate::from_payload(resolved.tenant_id.clone(), data);
                let rows = self
                    .store
                    .merge_subscription(&update)
                    .await
                    .map_err(|e| BillingError::ReconciliationFailed(e.to_string()))?;

                if rows == 0 {
                    tracing::warn!(
                        event_id = %event.event_id,
                        organisation_id = %resolved.tenant_id,
                        "Subscription event references an organisation that does not exist"
                    );
                    return Ok(ReconcileOutcome::TenantNotFound);
                }

                tracing::info!(
                    event_id = %event.event_id,
                    organisation_id = %resolved.tenant_id,
                    resolved_by = resolved.source.as_str(),
                    subscription_status = %update.status,
                    "Merged Paddle subscription state"
                );

                Ok(ReconcileOutcome::SubscriptionMerged {
                    tenant_id: resolved.tenant_id,
                    source: resolved.source,
                })
            }
            EventFamily::Transaction => {
                let Some(upsert) = InvoiceUpsert::from_payload(resolved.tenant_id.clone(), data)
                else {
                    tracing::warn!(
                        event_id = %event.event_id,
                        organisation_id = %resolved.tenant_id,
                        "Transaction event without transaction id - skipping"
                    );
                    return Ok(ReconcileOutcome::MissingTransactionId);
                };

                self.store
                    .upsert_invoice(&upsert)
                    .await
                    .map_err(|e| BillingError::ReconciliationFailed(e.to_string()))?;

                tracing::info!(
                    event_id = %event.event_id,
                    organisation_id = %resolved.tenant_id,
                    resolved_by = resolved.source.as_str(),
                    transaction_id = %upsert.transaction_id,
                    invoice_status = %upsert.status,
                    total_amount_cents = upsert.total_amount_cents,
                    "Upserted Paddle transaction invoice"
                );

                Ok(ReconcileOutcome::InvoiceUpserted {
                    tenant_id: resolved.tenant_id,
                    transaction_id: upsert.transaction_id,
                    source: resolved.source,
                })
            }
            EventFamily::Other => Ok(ReconcileOutcome::UnhandledEventType),
        }
    }
}
