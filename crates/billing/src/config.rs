//! Paddle billing configuration

use std::time::Duration;

use crate::error::{BillingError, BillingResult};
use crate::signature::DEFAULT_SIGNATURE_TOLERANCE;

/// Default age after which a `processing` claim counts as stuck
pub const DEFAULT_STUCK_AFTER: Duration = Duration::from_secs(30 * 60);

/// What the ledger does when a claim row for an event already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClaimPolicy {
    /// An event id is claimed at most once, ever. A delivery that failed
    /// reconciliation is never re-applied by redelivery alone.
    #[default]
    Never,
    /// Redelivery may re-claim an event whose claim is `failed`, or still
    /// `processing` after `stuck_after`. The re-claim is a single conditional
    /// upsert, so concurrent redeliveries still produce one winner.
    ReclaimFailed { stuck_after: Duration },
}

/// Configuration for the Paddle webhook pipeline
#[derive(Debug, Clone)]
pub struct PaddleConfig {
    /// Shared secret used for `Paddle-Signature` HMACs. Empty disables the endpoint.
    pub webhook_secret: String,
    /// Maximum allowed clock skew between the signed timestamp and now
    pub signature_tolerance: Duration,
    pub claim_policy: ClaimPolicy,
    /// Whether outbound Paddle API calls are configured (reported, never used here)
    pub api_key_configured: bool,
}

impl Default for PaddleConfig {
    fn default() -> Self {
        Self {
            webhook_secret: String::new(),
            signature_tolerance: DEFAULT_SIGNATURE_TOLERANCE,
            claim_policy: ClaimPolicy::Never,
            api_key_configured: false,
        }
    }
}

impl PaddleConfig {
    /// Build the configuration from environment variables
    ///
    /// - `PADDLE_WEBHOOK_SECRET` (optional, empty disables webhooks)
    /// - `PADDLE_SIGNATURE_TOLERANCE_SECS` (default 300)
    /// - `PADDLE_WEBHOOK_RECLAIM_FAILED` (default false)
    /// - `CLAIM_STUCK_AFTER_MINUTES` (default 30)
    /// - `PADDLE_API_KEY` (presence only)
    pub fn from_env() -> BillingResult<Self> {
        let webhook_secret = std::env::var("PADDLE_WEBHOOK_SECRET")
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        let signature_tolerance = match std::env::var("PADDLE_SIGNATURE_TOLERANCE_SECS") {
            Ok(raw) => Duration::from_secs(raw.trim().parse::<u64>().map_err(|e| {
                BillingError::Config(format!("PADDLE_SIGNATURE_TOLERANCE_SECS: {}", e))
            })?),
            Err(_) => DEFAULT_SIGNATURE_TOLERANCE,
        };

        let stuck_after = stuck_after_from_env()?;
        let claim_policy = if env_flag("PADDLE_WEBHOOK_RECLAIM_FAILED") {
            ClaimPolicy::ReclaimFailed { stuck_after }
        } else {
            ClaimPolicy::Never
        };

        let api_key_configured = std::env::var("PADDLE_API_KEY")
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false);

        if webhook_secret.is_empty() {
            tracing::warn!("PADDLE_WEBHOOK_SECRET not set - Paddle webhooks will be rejected");
        }

        Ok(Self {
            webhook_secret,
            signature_tolerance,
            claim_policy,
            api_key_configured,
        })
    }

    pub fn webhooks_enabled(&self) -> bool {
        !self.webhook_secret.is_empty()
    }
}

/// Read `CLAIM_STUCK_AFTER_MINUTES`, defaulting to 30 minutes
pub fn stuck_after_from_env() -> BillingResult<Duration> {
    match std::env::var("CLAIM_STUCK_AFTER_MINUTES") {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|m| Duration::from_secs(m * 60))
            .map_err(|e| BillingError::Config(format!("CLAIM_STUCK_AFTER_MINUTES: {}", e))),
        Err(_) => Ok(DEFAULT_STUCK_AFTER),
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
