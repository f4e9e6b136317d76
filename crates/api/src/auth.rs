//! Active organisation extraction
//!
//! Authentication is owned by the host application. Its auth layer inserts an
//! [`ActiveOrganisation`] into the request extensions; billing routes only read
//! it back.

use axum::{extract::FromRequestParts, http::request::Parts};
use billhook_shared::TenantId;

use crate::error::ApiError;

/// The organisation the current request acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveOrganisation(pub TenantId);

impl ActiveOrganisation {
    pub fn tenant_id(&self) -> &TenantId {
        &self.0
    }
}

impl<S> FromRequestParts<S> for ActiveOrganisation
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ActiveOrganisation>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("Active organisation required".to_string()))
    }
}
