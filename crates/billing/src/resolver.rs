//! Map an event payload onto the organisation it belongs to
//!
//! Resolution order is fixed: the organisation id Paddle echoes back in
//! `custom_data`, then the organisation holding the subscription id, then the
//! organisation holding the customer id. The first hit wins and later
//! strategies are not consulted. Lookup failures are logged and treated as a
//! miss so a flaky lookup never blocks a later strategy.

use std::sync::Arc;

use billhook_shared::TenantId;
use serde_json::Value;

use crate::event::EventFamily;
use crate::extract::first_non_empty;
use crate::store::BillingStore;

const ORGANISATION_ID: &[&str] = &["/custom_data/organisation_id"];
const CUSTOMER_ID: &[&str] = &["/customer_id"];
const SUBSCRIPTION_ENTITY_ID: &[&str] = &["/id"];
const TRANSACTION_SUBSCRIPTION_ID: &[&str] = &["/subscription_id"];

/// The identifiers a payload offers for tenant resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantLookup {
    pub organisation_id: Option<TenantId>,
    pub subscription_id: Option<String>,
    pub customer_id: Option<String>,
}

impl TenantLookup {
    /// Pull the lookup keys out of `data`.
    ///
    /// For `subscription.*` the subscription id is the entity's own `id`; for
    /// `transaction.*` it is the `subscription_id` the transaction refers to.
    pub fn from_payload(family: EventFamily, data: &Value) -> Self {
        let subscription_candidates = match family {
            EventFamily::Transaction => TRANSACTION_SUBSCRIPTION_ID,
            _ => SUBSCRIPTION_ENTITY_ID,
        };

        Self {
            organisation_id: first_non_empty(data, ORGANISATION_ID)
                .and_then(|id| TenantId::parse(&id)),
            subscription_id: first_non_empty(data, subscription_candidates),
            customer_id: first_non_empty(data, CUSTOMER_ID),
        }
    }
}

/// How a tenant was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Metadata,
    Subscription,
    Customer,
}

impl ResolutionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionSource::Metadata => "metadata",
            ResolutionSource::Subscription => "subscription",
            ResolutionSource::Customer => "customer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTenant {
    pub tenant_id: TenantId,
    pub source: ResolutionSource,
}

#[derive(Clone)]
pub struct TenantResolver {
    store: Arc<dyn BillingStore>,
}

impl TenantResolver {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    /// Resolve the owning tenant, or `None` when no strategy matches
    pub async fn resolve(&self, lookup: &TenantLookup) -> Option<ResolvedTenant> {
        if let Some(tenant_id) = &lookup.organisation_id {
            return Some(ResolvedTenant {
                tenant_id: tenant_id.clone(),
                source: ResolutionSource::Metadata,
            });
        }

        if let Some(subscription_id) = &lookup.subscription_id {
            match self.store.tenant_by_subscription(subscription_id).await {
                Ok(Some(tenant_id)) => {
                    return Some(ResolvedTenant {
                        tenant_id,
                        source: ResolutionSource::Subscription,
                    })
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(
                        subscription_id = %subscription_id,
                        error = %e,
                        "Failed fallback lookup by Paddle subscription id"
                    );
                }
            }
        }

        if let Some(customer_id) = &lookup.customer_id {
            match self.store.tenant_by_customer(customer_id).await {
                Ok(Some(tenant_id)) => {
                    return Some(ResolvedTenant {
                        tenant_id,
                        source: ResolutionSource::Customer,
                    })
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(
                        customer_id = %customer_id,
                        error = %e,
                        "Failed fallback lookup by Paddle customer id"
                    );
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::SubscriptionStatus;
    use crate::store::{MemoryStore, TenantBilling};
    use serde_json::json;

    fn tenant(id: &str, subscription: Option<&str>, customer: Option<&str>) -> TenantBilling {
        TenantBilling {
            tenant_id: TenantId::parse(id).unwrap(),
            plan_id: "free".to_string(),
            subscription_status: SubscriptionStatus::Active,
            paddle_customer_id: customer.map(str::to_string),
            paddle_subscription_id: subscription.map(str::to_string),
            current_period_ends_at: None,
            paddle_updated_at: None,
        }
    }

    fn resolver() -> TenantResolver {
        let store = MemoryStore::new()
            .with_plan("free", "Free", 0, None)
            .with_tenant_billing(tenant("org_sub", Some("sub_1"), Some("ctm_other")))
            .with_tenant_billing(tenant("org_ctm", None, Some("ctm_1")));
        TenantResolver::new(Arc::new(store))
    }

    #[test]
    fn test_lookup_uses_entity_id_for_subscriptions() {
        let data = json!({"id": "sub_1", "subscription_id": "sub_ignored", "customer_id": "ctm_1"});
        let lookup = TenantLookup::from_payload(EventFamily::Subscription, &data);
        assert_eq!(lookup.subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(lookup.customer_id.as_deref(), Some("ctm_1"));
        assert!(lookup.organisation_id.is_none());
    }

    #[test]
    fn test_lookup_uses_subscription_id_for_transactions() {
        let data = json!({"id": "txn_1", "subscription_id": "sub_1"});
        let lookup = TenantLookup::from_payload(EventFamily::Transaction, &data);
        assert_eq!(lookup.subscription_id.as_deref(), Some("sub_1"));
    }

    #[test]
    fn test_lookup_ignores_blank_organisation_id() {
        let data = json!({"custom_data": {"organisation_id": "  "}});
        let lookup = TenantLookup::from_payload(EventFamily::Subscription, &data);
        assert!(lookup.organisation_id.is_none());
    }

    #[tokio::test]
    async fn test_metadata_wins_over_subscription_lookup() {
        let data = json!({
            "id": "sub_1",
            "custom_data": {"organisation_id": "org_meta"}
        });
        let lookup = TenantLookup::from_payload(EventFamily::Subscription, &data);
        let resolved = resolver().resolve(&lookup).await.unwrap();
        assert_eq!(resolved.tenant_id.as_str(), "org_meta");
        assert_eq!(resolved.source, ResolutionSource::Metadata);
    }

    #[tokio::test]
    async fn test_subscription_wins_over_customer() {
        let data = json!({"id": "sub_1", "customer_id": "ctm_1"});
        let lookup = TenantLookup::from_payload(EventFamily::Subscription, &data);
        let resolved = resolver().resolve(&lookup).await.unwrap();
        assert_eq!(resolved.tenant_id.as_str(), "org_sub");
        assert_eq!(resolved.source, ResolutionSource::Subscription);
    }

    #[tokio::test]
    async fn test_customer_fallback() {
        let data = json!({"id": "sub_unknown", "customer_id": "ctm_1"});
        let lookup = TenantLookup::from_payload(EventFamily::Subscription, &data);
        let resolved = resolver().resolve(&lookup).await.unwrap();
        assert_eq!(resolved.tenant_id.as_str(), "org_ctm");
        assert_eq!(resolved.source, ResolutionSource::Customer);
    }

    #[tokio::test]
    async fn test_no_match_is_none() {
        let data = json!({"id": "sub_unknown", "customer_id": "ctm_unknown"});
        let lookup = TenantLookup::from_payload(EventFamily::Subscription, &data);
        assert!(resolver().resolve(&lookup).await.is_none());

        let lookup = TenantLookup::from_payload(EventFamily::Transaction, &json!({}));
        assert!(resolver().resolve(&lookup).await.is_none());
    }
}
