//! Read-only billing reports for the active organisation

use std::sync::Arc;

use billhook_shared::TenantId;
use serde::Serialize;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::error::{BillingError, BillingResult};
use crate::status::{InvoiceStatus, SubscriptionStatus};
use crate::store::{BillingOverviewRow, BillingStore, InvoiceRecord};

/// Most recent invoices returned by [`ReportingService::list_invoices`]
pub const INVOICE_LIST_LIMIT: i64 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingOverview {
    pub plan_id: String,
    pub plan_display_name: String,
    pub monthly_price_cents: i32,
    pub subscription_status: SubscriptionStatus,
    pub billing_enabled: bool,
    pub has_customer_account: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_period_ends_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceSummary {
    pub status: InvoiceStatus,
    pub currency_code: String,
    pub total_amount_cents: i64,
    pub invoice_number: String,
    pub invoice_url: String,
    pub invoice_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billed_at: Option<String>,
    pub billed_at_timestamp: Option<String>,
}

fn format_timestamp(ts: OffsetDateTime) -> BillingResult<String> {
    ts.to_offset(UtcOffset::UTC)
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second]Z"
        ))
        .map_err(|e| BillingError::Internal(format!("failed to format timestamp: {}", e)))
}

fn format_date(ts: OffsetDateTime) -> BillingResult<String> {
    ts.to_offset(UtcOffset::UTC)
        .format(format_description!("[year]-[month]-[day]"))
        .map_err(|e| BillingError::Internal(format!("failed to format date: {}", e)))
}

impl BillingOverview {
    fn from_row(row: BillingOverviewRow, billing_enabled: bool) -> BillingResult<Self> {
        let has_customer_account = row
            .paddle_customer_id
            .as_deref()
            .is_some_and(|id| !id.is_empty());

        Ok(Self {
            plan_id: row.plan_id,
            plan_display_name: row.plan_display_name,
            monthly_price_cents: row.monthly_price_cents,
            subscription_status: row.subscription_status,
            billing_enabled,
            has_customer_account,
            subscription_id: row.paddle_subscription_id,
            current_period_ends_at: row.current_period_ends_at.map(format_timestamp).transpose()?,
        })
    }
}

impl InvoiceSummary {
    fn from_record(record: InvoiceRecord) -> BillingResult<Self> {
        let invoice_url = record.invoice_url.unwrap_or_default();
        let (billed_at, billed_at_timestamp) = match record.billed_at {
            Some(ts) => (Some(format_date(ts)?), Some(format_timestamp(ts)?)),
            None => (None, None),
        };

        Ok(Self {
            status: record.status,
            currency_code: record
                .currency_code
                .unwrap_or_default()
                .trim()
                .to_uppercase(),
            total_amount_cents: record.total_amount_cents,
            invoice_number: record.invoice_number.unwrap_or_default(),
            invoice_available: !invoice_url.trim().is_empty(),
            invoice_url,
            billed_at,
            billed_at_timestamp,
        })
    }
}

#[derive(Clone)]
pub struct ReportingService {
    store: Arc<dyn BillingStore>,
    billing_enabled: bool,
}

impl ReportingService {
    pub fn new(store: Arc<dyn BillingStore>, billing_enabled: bool) -> Self {
        Self {
            store,
            billing_enabled,
        }
    }

    pub async fn overview(&self, tenant_id: &TenantId) -> BillingResult<BillingOverview> {
        let row = self.store.billing_overview(tenant_id).await.map_err(|e| {
            tracing::error!(organisation_id = %tenant_id, error = %e, "Failed to load billing overview");
            e
        })?;

        let Some(row) = row else {
            return Err(BillingError::NotFound(format!("organisation {}", tenant_id)));
        };

        BillingOverview::from_row(row, self.billing_enabled)
    }

    pub async fn list_invoices(&self, tenant_id: &TenantId) -> BillingResult<Vec<InvoiceSummary>> {
        let records = self
            .store
            .recent_invoices(tenant_id, INVOICE_LIST_LIMIT)
            .await
            .map_err(|e| {
                tracing::error!(organisation_id = %tenant_id, error = %e, "Failed to query billing invoices");
                e
            })?;

        records.into_iter().map(InvoiceSummary::from_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InvoiceUpsert, MemoryStore, TenantBilling};
    use serde_json::json;
    use time::macros::datetime;

    fn org(id: &str) -> TenantId {
        TenantId::parse(id).unwrap()
    }

    #[tokio::test]
    async fn test_overview_formatting() {
        let store = MemoryStore::new()
            .with_plan("pro", "Pro", 2900, Some("pri_pro"))
            .with_tenant_billing(TenantBilling {
                tenant_id: org("org_1"),
                plan_id: "pro".to_string(),
                subscription_status: SubscriptionStatus::PastDue,
                paddle_customer_id: Some("ctm_1".to_string()),
                paddle_subscription_id: Some("sub_1".to_string()),
                current_period_ends_at: Some(datetime!(2025-03-01 12:30:45.5 +02:00)),
                paddle_updated_at: None,
            });
        let service = ReportingService::new(Arc::new(store), true);

        let overview = service.overview(&org("org_1")).await.unwrap();
        assert_eq!(
            serde_json::to_value(&overview).unwrap(),
            json!({
                "plan_id": "pro",
                "plan_display_name": "Pro",
                "monthly_price_cents": 2900,
                "subscription_status": "past_due",
                "billing_enabled": true,
                "has_customer_account": true,
                "subscription_id": "sub_1",
                "current_period_ends_at": "2025-03-01T10:30:45Z"
            })
        );
    }

    #[tokio::test]
    async fn test_overview_omits_absent_fields() {
        let store = MemoryStore::new()
            .with_plan("free", "Free", 0, None)
            .with_tenant("org_1", "free");
        let service = ReportingService::new(Arc::new(store), false);

        let value = serde_json::to_value(service.overview(&org("org_1")).await.unwrap()).unwrap();
        assert_eq!(value["has_customer_account"], false);
        assert_eq!(value["billing_enabled"], false);
        assert!(value.get("subscription_id").is_none());
        assert!(value.get("current_period_ends_at").is_none());
    }

    #[tokio::test]
    async fn test_overview_unknown_organisation() {
        let service = ReportingService::new(Arc::new(MemoryStore::new()), false);
        let err = service.overview(&org("org_missing")).await.unwrap_err();
        assert!(matches!(err, BillingError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_invoice_list_formatting() {
        let store = MemoryStore::new()
            .with_plan("free", "Free", 0, None)
            .with_tenant("org_1", "free");
        store
            .upsert_invoice(&InvoiceUpsert {
                tenant_id: org("org_1"),
                transaction_id: "txn_1".to_string(),
                invoice_id: Some("inv_1".to_string()),
                invoice_number: Some("2025-0001".to_string()),
                status: InvoiceStatus::Completed,
                currency_code: Some(" eur ".to_string()),
                total_amount_cents: 1999,
                billed_at: Some(datetime!(2025-01-05 23:15:00 UTC)),
                invoice_url: Some("https://example.test/inv".to_string()),
            })
            .await
            .unwrap();
        store
            .upsert_invoice(&InvoiceUpsert {
                tenant_id: org("org_1"),
                transaction_id: "txn_2".to_string(),
                invoice_id: None,
                invoice_number: None,
                status: InvoiceStatus::Draft,
                currency_code: None,
                total_amount_cents: 0,
                billed_at: None,
                invoice_url: Some("   ".to_string()),
            })
            .await
            .unwrap();

        let service = ReportingService::new(Arc::new(store), true);
        let invoices = serde_json::to_value(service.list_invoices(&org("org_1")).await.unwrap()).unwrap();

        assert_eq!(
            invoices,
            json!([
                {
                    "status": "completed",
                    "currency_code": "EUR",
                    "total_amount_cents": 1999,
                    "invoice_number": "2025-0001",
                    "invoice_url": "https://example.test/inv",
                    "invoice_available": true,
                    "billed_at": "2025-01-05",
                    "billed_at_timestamp": "2025-01-05T23:15:00Z"
                },
                {
                    "status": "draft",
                    "currency_code": "",
                    "total_amount_cents": 0,
                    "invoice_number": "",
                    "invoice_url": "   ",
                    "invoice_available": false,
                    "billed_at_timestamp": null
                }
            ])
        );
    }

    #[tokio::test]
    async fn test_invoice_list_empty() {
        let store = MemoryStore::new()
            .with_plan("free", "Free", 0, None)
            .with_tenant("org_1", "free");
        let service = ReportingService::new(Arc::new(store), true);
        assert!(service.list_invoices(&org("org_1")).await.unwrap().is_empty());
    }
}
