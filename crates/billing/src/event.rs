//! Inbound webhook envelope

use serde::Deserialize;
use serde_json::Value;

use crate::error::{BillingError, BillingResult};

/// A decoded Paddle notification.
///
/// `data` and `meta` stay untyped: their shape depends on the event type and
/// the API version the notification destination was created with.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub meta: Option<Value>,
}

/// Envelope whose identifiers have been checked
#[derive(Debug, Clone)]
pub struct VerifiedEvent {
    pub event_id: String,
    pub event_type: String,
    pub family: EventFamily,
    pub data: Option<Value>,
}

impl WebhookEvent {
    /// Decode the raw body and require non-blank `event_id` and `event_type`
    pub fn decode(body: &[u8]) -> BillingResult<VerifiedEvent> {
        let event: WebhookEvent = serde_json::from_slice(body)?;

        let event_id = event
            .event_id
            .as_deref()
            .map(str::trim)
            .unwrap_or_default();
        let event_type = event
            .event_type
            .as_deref()
            .map(str::trim)
            .unwrap_or_default();
        if event_id.is_empty() || event_type.is_empty() {
            return Err(BillingError::MissingEventMetadata);
        }

        let event_id = event_id.to_string();
        let event_type = event_type.to_string();
        let family = EventFamily::of(&event_type);

        Ok(VerifiedEvent {
            event_id,
            event_type,
            family,
            data: event.data.filter(|d| !d.is_null()),
        })
    }
}

/// The event families the pipeline knows how to reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFamily {
    /// `subscription.*`
    Subscription,
    /// `transaction.*`
    Transaction,
    /// Anything else; acknowledged without side effects
    Other,
}

impl EventFamily {
    pub fn of(event_type: &str) -> Self {
        if event_type.starts_with("subscription.") {
            EventFamily::Subscription
        } else if event_type.starts_with("transaction.") {
            EventFamily::Transaction
        } else {
            EventFamily::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventFamily::Subscription => "subscription",
            EventFamily::Transaction => "transaction",
            EventFamily::Other => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid_envelope() {
        let body = br#"{"event_id":"evt_1","event_type":"transaction.paid","occurred_at":"2025-01-01T00:00:00Z","data":{"id":"txn_1"},"meta":null}"#;
        let event = WebhookEvent::decode(body).unwrap();
        assert_eq!(event.event_id, "evt_1");
        assert_eq!(event.event_type, "transaction.paid");
        assert_eq!(event.family, EventFamily::Transaction);
        assert_eq!(event.data.unwrap()["id"], "txn_1");
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        let err = WebhookEvent::decode(b"{not json").unwrap_err();
        assert!(matches!(err, BillingError::InvalidPayload(_)));
    }

    #[test]
    fn test_decode_rejects_blank_identifiers() {
        for body in [
            br#"{"event_type":"subscription.updated"}"#.as_slice(),
            br#"{"event_id":"  ","event_type":"subscription.updated"}"#.as_slice(),
            br#"{"event_id":"evt_1"}"#.as_slice(),
            br#"{"event_id":"evt_1","event_type":null}"#.as_slice(),
        ] {
            let err = WebhookEvent::decode(body).unwrap_err();
            assert!(
                matches!(err, BillingError::MissingEventMetadata),
                "expected missing metadata for {}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn test_null_data_becomes_none() {
        let event =
            WebhookEvent::decode(br#"{"event_id":"evt_1","event_type":"x.y","data":null}"#).unwrap();
        assert!(event.data.is_none());
    }

    #[test]
    fn test_family_dispatch_by_prefix() {
        assert_eq!(EventFamily::of("subscription.created"), EventFamily::Subscription);
        assert_eq!(EventFamily::of("subscription.past_due"), EventFamily::Subscription);
        assert_eq!(EventFamily::of("transaction.completed"), EventFamily::Transaction);
        assert_eq!(EventFamily::of("customer.created"), EventFamily::Other);
        assert_eq!(EventFamily::of("subscriptions"), EventFamily::Other);
    }
}
