//! Closed status enumerations for stored billing state
//!
//! Upstream status strings are never stored verbatim. Anything outside the
//! allow-list becomes `Unknown`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Subscription status stored on an organisation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Inactive,
    Active,
    Trialing,
    PastDue,
    Paused,
    Canceled,
    Cancelled,
    Unknown,
}

impl SubscriptionStatus {
    /// Normalise an upstream status. Blank means `active`, because
    /// subscription creation events may omit the status entirely.
    pub fn normalise(raw: &str) -> Self {
        let lowered = raw.trim().to_ascii_lowercase();
        if lowered.is_empty() {
            return SubscriptionStatus::Active;
        }
        Self::from_stored(&lowered)
    }

    /// Map an exact stored value; unrecognised values become `Unknown`
    pub fn from_stored(value: &str) -> Self {
        match value {
            "inactive" => SubscriptionStatus::Inactive,
            "active" => SubscriptionStatus::Active,
            "trialing" => SubscriptionStatus::Trialing,
            "past_due" => SubscriptionStatus::PastDue,
            "paused" => SubscriptionStatus::Paused,
            "canceled" => SubscriptionStatus::Canceled,
            "cancelled" => SubscriptionStatus::Cancelled,
            _ => SubscriptionStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Inactive => "inactive",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of an invoice (Paddle transaction)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Ready,
    Billed,
    Paid,
    Completed,
    PastDue,
    Canceled,
    Cancelled,
    Refunded,
    Failed,
    Unknown,
}

impl InvoiceStatus {
    /// Normalise an upstream status. Blank means `paid`.
    pub fn normalise(raw: &str) -> Self {
        let lowered = raw.trim().to_ascii_lowercase();
        if lowered.is_empty() {
            return InvoiceStatus::Paid;
        }
        Self::from_stored(&lowered)
    }

    pub fn from_stored(value: &str) -> Self {
        match value {
            "draft" => InvoiceStatus::Draft,
            "ready" => InvoiceStatus::Ready,
            "billed" => InvoiceStatus::Billed,
            "paid" => InvoiceStatus::Paid,
            "completed" => InvoiceStatus::Completed,
            "past_due" => InvoiceStatus::PastDue,
            "canceled" => InvoiceStatus::Canceled,
            "cancelled" => InvoiceStatus::Cancelled,
            "refunded" => InvoiceStatus::Refunded,
            "failed" => InvoiceStatus::Failed,
            _ => InvoiceStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Ready => "ready",
            InvoiceStatus::Billed => "billed",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Completed => "completed",
            InvoiceStatus::PastDue => "past_due",
            InvoiceStatus::Canceled => "canceled",
            InvoiceStatus::Cancelled => "cancelled",
            InvoiceStatus::Refunded => "refunded",
            InvoiceStatus::Failed => "failed",
            InvoiceStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_status_allow_list() {
        for raw in [
            "inactive", "active", "trialing", "past_due", "paused", "canceled", "cancelled",
        ] {
            assert_eq!(SubscriptionStatus::normalise(raw).as_str(), raw);
        }
    }

    #[test]
    fn test_subscription_status_is_case_insensitive() {
        assert_eq!(SubscriptionStatus::normalise("PAST_DUE"), SubscriptionStatus::PastDue);
        assert_eq!(SubscriptionStatus::normalise(" Trialing "), SubscriptionStatus::Trialing);
    }

    #[test]
    fn test_blank_subscription_status_defaults_to_active() {
        assert_eq!(SubscriptionStatus::normalise(""), SubscriptionStatus::Active);
        assert_eq!(SubscriptionStatus::normalise("   "), SubscriptionStatus::Active);
    }

    #[test]
    fn test_unrecognised_statuses_become_unknown() {
        assert_eq!(SubscriptionStatus::normalise("weird_status"), SubscriptionStatus::Unknown);
        assert_eq!(InvoiceStatus::normalise("weird_status"), InvoiceStatus::Unknown);
        assert_eq!(SubscriptionStatus::normalise("weird_status").as_str(), "unknown");
        // valid for invoices, not for subscriptions
        assert_eq!(SubscriptionStatus::normalise("refunded"), SubscriptionStatus::Unknown);
    }

    #[test]
    fn test_invoice_status_allow_list_and_default() {
        for raw in [
            "draft", "ready", "billed", "paid", "completed", "past_due", "canceled", "cancelled",
            "refunded", "failed",
        ] {
            assert_eq!(InvoiceStatus::normalise(raw).as_str(), raw);
        }
        assert_eq!(InvoiceStatus::normalise(""), InvoiceStatus::Paid);
        assert_eq!(InvoiceStatus::normalise("trialing"), InvoiceStatus::Unknown);
    }

    #[test]
    fn test_serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&SubscriptionStatus::PastDue).unwrap(),
            "\"past_due\""
        );
    }
}
