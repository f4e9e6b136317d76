//! Read-only billing routes for the active organisation

use axum::{extract::State, Json};
use billhook_billing::{BillingOverview, InvoiceSummary};
use serde::Serialize;

use crate::{
    auth::ActiveOrganisation,
    error::ApiResult,
    routes::{success, ApiResponse},
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct BillingOverviewData {
    pub billing: BillingOverview,
}

#[derive(Debug, Serialize)]
pub struct InvoiceListData {
    pub invoices: Vec<InvoiceSummary>,
}

/// GET /v1/billing
pub async fn billing_overview(
    State(state): State<AppState>,
    organisation: ActiveOrganisation,
) -> ApiResult<Json<ApiResponse<BillingOverviewData>>> {
    let billing = state
        .billing
        .reporting
        .overview(organisation.tenant_id())
        .await?;

    Ok(success(
        BillingOverviewData { billing },
        "Billing overview retrieved successfully",
    ))
}

/// GET /v1/billing/invoices
pub async fn billing_invoices(
    State(state): State<AppState>,
    organisation: ActiveOrganisation,
) -> ApiResult<Json<ApiResponse<InvoiceListData>>> {
    let invoices = state
        .billing
        .reporting
        .list_invoices(organisation.tenant_id())
        .await?;

    Ok(success(
        InvoiceListData { invoices },
        "Invoices retrieved successfully",
    ))
}
