//! Postgres implementation of [`BillingStore`]

use std::time::Duration;

use async_trait::async_trait;
use billhook_shared::TenantId;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    BillingOverviewRow, BillingStore, ClaimHealth, ClaimStatus, EventClaimRecord, InvoiceRecord,
    InvoiceUpsert, SubscriptionUpdate, TenantBilling,
};
use crate::config::ClaimPolicy;
use crate::error::{BillingError, BillingResult};
use crate::status::{InvoiceStatus, SubscriptionStatus};

#[derive(Clone)]
pub struct PgBillingStore {
    pool: PgPool,
}

impl PgBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ClaimRow {
    event_id: String,
    event_type: String,
    status: String,
    received_at: OffsetDateTime,
    processed_at: Option<OffsetDateTime>,
    error_message: Option<String>,
}

impl TryFrom<ClaimRow> for EventClaimRecord {
    type Error = BillingError;

    fn try_from(row: ClaimRow) -> Result<Self, Self::Error> {
        let status = ClaimStatus::parse(&row.status).ok_or_else(|| {
            BillingError::Database(format!(
                "claim {} has unexpected status '{}'",
                row.event_id, row.status
            ))
        })?;
        Ok(EventClaimRecord {
            event_id: row.event_id,
            event_type: row.event_type,
            status,
            received_at: row.received_at,
            processed_at: row.processed_at,
            error_message: row.error_message,
        })
    }
}

#[derive(Debug, FromRow)]
struct TenantRow {
    id: TenantId,
    plan_id: String,
    subscription_status: String,
    paddle_customer_id: Option<String>,
    paddle_subscription_id: Option<String>,
    current_period_ends_at: Option<OffsetDateTime>,
    paddle_updated_at: Option<OffsetDateTime>,
}

#[derive(Debug, FromRow)]
struct OverviewRow {
    plan_id: String,
    display_name: String,
    monthly_price_cents: i32,
    subscription_status: String,
    paddle_customer_id: Option<String>,
    paddle_subscription_id: Option<String>,
    current_period_ends_at: Option<OffsetDateTime>,
}

#[derive(Debug, FromRow)]
struct InvoiceRow {
    id: Uuid,
    organisation_id: TenantId,
    paddle_transaction_id: String,
    paddle_invoice_id: Option<String>,
    invoice_number: Option<String>,
    status: String,
    currency_code: Option<String>,
    total_amount_cents: i64,
    billed_at: Option<OffsetDateTime>,
    invoice_url: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<InvoiceRow> for InvoiceRecord {
    fn from(row: InvoiceRow) -> Self {
        InvoiceRecord {
            id: row.id,
            tenant_id: row.organisation_id,
            paddle_transaction_id: row.paddle_transaction_id,
            paddle_invoice_id: row.paddle_invoice_id,
            invoice_number: row.invoice_number,
            status: InvoiceStatus::from_stored(&row.status),
            currency_code: row.currency_code,
            total_amount_cents: row.total_amount_cents,
            billed_at: row.billed_at,
            invoice_url: row.invoice_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const INVOICE_COLUMNS: &str = r#"
    id, organisation_id, paddle_transaction_id, paddle_invoice_id, invoice_number,
    status, currency_code, total_amount_cents, billed_at, invoice_url,
    created_at, updated_at
"#;

const CLAIM_COLUMNS: &str =
    "event_id, event_type, status, received_at, processed_at, error_message";

#[async_trait]
impl BillingStore for PgBillingStore {
    async fn insert_claim(
        &self,
        event_id: &str,
        event_type: &str,
        policy: ClaimPolicy,
    ) -> BillingResult<bool> {
        // Both variants are a single statement backed by the primary key on
        // event_id; zero rows affected means someone else owns the claim.
        let result = match policy {
            ClaimPolicy::Never => {
                sqlx::query(
                    r#"
                    INSERT INTO paddle_webhook_events (event_id, event_type, status, received_at)
                    VALUES ($1, $2, 'processing', NOW())
                    ON CONFLICT (event_id) DO NOTHING
                    "#,
                )
                .bind(event_id)
                .bind(event_type)
                .execute(&self.pool)
                .await?
            }
            ClaimPolicy::ReclaimFailed { stuck_after } => {
                sqlx::query(
                    r#"
                    INSERT INTO paddle_webhook_events (event_id, event_type, status, received_at)
                    VALUES ($1, $2, 'processing', NOW())
                    ON CONFLICT (event_id) DO UPDATE SET
                        status = 'processing',
                        received_at = NOW(),
                        processed_at = NULL,
                        error_message = CONCAT_WS(
                            ' | ',
                            paddle_webhook_events.error_message,
                            CONCAT('Reclaimed from ', paddle_webhook_events.status, ' at ', NOW()::TEXT)
                        )
                    WHERE paddle_webhook_events.status = 'failed'
                       OR (paddle_webhook_events.status = 'processing'
                           AND paddle_webhook_events.received_at
                               < NOW() - make_interval(secs => $3))
                    "#,
                )
                .bind(event_id)
                .bind(event_type)
                .bind(stuck_after.as_secs_f64())
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() == 1)
    }

    async fn finalize_claim(
        &self,
        event_id: &str,
        status: ClaimStatus,
        error_message: Option<&str>,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE paddle_webhook_events
            SET status = $2,
                processed_at = NOW(),
                error_message = NULLIF(CONCAT_WS(' | ', error_message, NULLIF($3, '')), '')
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(status.as_str())
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_claim(&self, event_id: &str) -> BillingResult<Option<EventClaimRecord>> {
        let row: Option<ClaimRow> = sqlx::query_as(&format!(
            "SELECT {} FROM paddle_webhook_events WHERE event_id = $1",
            CLAIM_COLUMNS
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(EventClaimRecord::try_from).transpose()
    }

    async fn list_claims(
        &self,
        status: Option<ClaimStatus>,
        limit: i64,
        offset: i64,
    ) -> BillingResult<Vec<EventClaimRecord>> {
        let rows: Vec<ClaimRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM paddle_webhook_events
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY received_at DESC
            LIMIT $2 OFFSET $3
            "#,
            CLAIM_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EventClaimRecord::try_from).collect()
    }

    async fn claim_health(&self, stuck_after: Duration) -> BillingResult<ClaimHealth> {
        let (processing, processed, failed, stuck): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'processing'),
                COUNT(*) FILTER (WHERE status = 'processed'),
                COUNT(*) FILTER (WHERE status = 'failed'),
                COUNT(*) FILTER (
                    WHERE status = 'processing'
                      AND received_at < NOW() - make_interval(secs => $1)
                )
            FROM paddle_webhook_events
            "#,
        )
        .bind(stuck_after.as_secs_f64())
        .fetch_one(&self.pool)
        .await?;

        Ok(ClaimHealth {
            processing,
            processed,
            failed,
            stuck,
        })
    }

    async fn tenant_by_subscription(
        &self,
        subscription_id: &str,
    ) -> BillingResult<Option<TenantId>> {
        let row: Option<(TenantId,)> = sqlx::query_as(
            "SELECT id FROM organisations WHERE paddle_subscription_id = $1 LIMIT 1",
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id,)| id))
    }

    async fn tenant_by_customer(&self, customer_id: &str) -> BillingResult<Option<TenantId>> {
        let row: Option<(TenantId,)> =
            sqlx::query_as("SELECT id FROM organisations WHERE paddle_customer_id = $1 LIMIT 1")
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id,)| id))
    }

    async fn find_tenant(&self, tenant_id: &TenantId) -> BillingResult<Option<TenantBilling>> {
        let row: Option<TenantRow> = sqlx::query_as(
            r#"
            SELECT id, plan_id, subscription_status, paddle_customer_id,
                   paddle_subscription_id, current_period_ends_at, paddle_updated_at
            FROM organisations
            WHERE id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| TenantBilling {
            tenant_id: r.id,
            plan_id: r.plan_id,
            subscription_status: SubscriptionStatus::from_stored(&r.subscription_status),
            paddle_customer_id: r.paddle_customer_id,
            paddle_subscription_id: r.paddle_subscription_id,
            current_period_ends_at: r.current_period_ends_at,
            paddle_updated_at: r.paddle_updated_at,
        }))
    }

    async fn merge_subscription(&self, update: &SubscriptionUpdate) -> BillingResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE organisations o
            SET
                paddle_customer_id = COALESCE(NULLIF($2, ''), o.paddle_customer_id),
                paddle_subscription_id = COALESCE(NULLIF($3, ''), o.paddle_subscription_id),
                subscription_status = COALESCE(NULLIF($4, ''), o.subscription_status),
                current_period_ends_at = COALESCE($5, o.current_period_ends_at),
                plan_id = COALESCE(
                    (SELECT id FROM plans WHERE paddle_price_id = NULLIF($6, '') LIMIT 1),
                    o.plan_id
                ),
                paddle_updated_at = NOW(),
                updated_at = NOW()
            WHERE o.id = $1
            "#,
        )
        .bind(&update.tenant_id)
        .bind(update.customer_id.as_deref())
        .bind(update.subscription_id.as_deref())
        .bind(update.status.as_str())
        .bind(update.current_period_ends_at)
        .bind(update.price_id.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn upsert_invoice(&self, upsert: &InvoiceUpsert) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO billing_invoices (
                organisation_id,
                paddle_transaction_id,
                paddle_invoice_id,
                invoice_number,
                status,
                currency_code,
                total_amount_cents,
                billed_at,
                invoice_url,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (paddle_transaction_id) DO UPDATE SET
                paddle_invoice_id = EXCLUDED.paddle_invoice_id,
                invoice_number = EXCLUDED.invoice_number,
                status = EXCLUDED.status,
                currency_code = EXCLUDED.currency_code,
                total_amount_cents = EXCLUDED.total_amount_cents,
                billed_at = EXCLUDED.billed_at,
                invoice_url = EXCLUDED.invoice_url,
                updated_at = NOW()
            "#,
        )
        .bind(&upsert.tenant_id)
        .bind(&upsert.transaction_id)
        .bind(upsert.invoice_id.as_deref())
        .bind(upsert.invoice_number.as_deref())
        .bind(upsert.status.as_str())
        .bind(upsert.currency_code.as_deref())
        .bind(upsert.total_amount_cents)
        .bind(upsert.billed_at)
        .bind(upsert.invoice_url.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_invoice(&self, transaction_id: &str) -> BillingResult<Option<InvoiceRecord>> {
        let row: Option<InvoiceRow> = sqlx::query_as(&format!(
            "SELECT {} FROM billing_invoices WHERE paddle_transaction_id = $1",
            INVOICE_COLUMNS
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(InvoiceRecord::from))
    }

    async fn billing_overview(
        &self,
        tenant_id: &TenantId,
    ) -> BillingResult<Option<BillingOverviewRow>> {
        let row: Option<OverviewRow> = sqlx::query_as(
            r#"
            SELECT
                o.plan_id,
                p.display_name,
                p.monthly_price_cents,
                o.subscription_status,
                o.paddle_customer_id,
                o.paddle_subscription_id,
                o.current_period_ends_at
            FROM organisations o
            JOIN plans p ON p.id = o.plan_id
            WHERE o.id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| BillingOverviewRow {
            plan_id: r.plan_id,
            plan_display_name: r.display_name,
            monthly_price_cents: r.monthly_price_cents,
            subscription_status: SubscriptionStatus::from_stored(&r.subscription_status),
            paddle_customer_id: r.paddle_customer_id,
            paddle_subscription_id: r.paddle_subscription_id,
            current_period_ends_at: r.current_period_ends_at,
        }))
    }

    async fn recent_invoices(
        &self,
        tenant_id: &TenantId,
        limit: i64,
    ) -> BillingResult<Vec<InvoiceRecord>> {
        let rows: Vec<InvoiceRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM billing_invoices
            WHERE organisation_id = $1
            ORDER BY billed_at DESC NULLS LAST, created_at DESC
            LIMIT $2
            "#,
            INVOICE_COLUMNS
        ))
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(InvoiceRecord::from).collect())
    }
}
