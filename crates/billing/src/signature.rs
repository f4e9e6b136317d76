//! Paddle webhook signature verification
//!
//! Paddle signs every notification with a `Paddle-Signature` header of the
//! form `ts=<unix-seconds>;h1=<hex hmac-sha256>`. The HMAC is computed over
//! `"<ts>:<raw body>"` with the endpoint's shared secret.
//!
//! Verification is fail-closed: every parse failure, missing field, stale
//! timestamp or digest mismatch yields `false`. Nothing here returns an error.

use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

/// Name of the header carrying the signature
pub const SIGNATURE_HEADER: &str = "Paddle-Signature";

/// Replay window: signed timestamps further than this from now are rejected
pub const DEFAULT_SIGNATURE_TOLERANCE: Duration = Duration::from_secs(5 * 60);

/// The two fields of a `Paddle-Signature` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader<'a> {
    pub timestamp: &'a str,
    pub h1: &'a str,
}

impl<'a> SignatureHeader<'a> {
    /// Parse `ts=...;h1=...`. Segments are trimmed, unknown keys ignored.
    /// Returns `None` unless both `ts` and `h1` are present and non-empty.
    pub fn parse(header: &'a str) -> Option<Self> {
        let mut timestamp: Option<&str> = None;
        let mut h1: Option<&str> = None;

        for part in header.trim().split(';') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "ts" => timestamp = Some(value),
                "h1" => h1 = Some(value),
                _ => {}
            }
        }

        match (timestamp, h1) {
            (Some(timestamp), Some(h1)) if !timestamp.is_empty() && !h1.is_empty() => {
                Some(Self { timestamp, h1 })
            }
            _ => None,
        }
    }
}

/// Hex-encoded HMAC-SHA256 of `"<timestamp>:<body>"`
pub fn compute_signature(timestamp: &str, body: &[u8], secret: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Build a complete header value for `body` signed at `timestamp`
pub fn sign(timestamp: i64, body: &[u8], secret: &str) -> Option<String> {
    let ts = timestamp.to_string();
    let h1 = compute_signature(&ts, body, secret)?;
    Some(format!("ts={};h1={}", ts, h1))
}

/// Verify a signature header with the default five-minute window
pub fn verify(signature_header: &str, body: &[u8], secret: &str) -> bool {
    SignatureVerifier::new(secret, DEFAULT_SIGNATURE_TOLERANCE).verify(signature_header, body)
}

/// Verifier bound to one shared secret and freshness window
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance: Duration,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>, tolerance: Duration) -> Self {
        Self {
            secret: secret.into(),
            tolerance,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.secret.is_empty()
    }

    pub fn verify(&self, signature_header: &str, body: &[u8]) -> bool {
        self.verify_at(
            signature_header,
            body,
            OffsetDateTime::now_utc().unix_timestamp(),
        )
    }

    /// Verify against an explicit "now" (unix seconds)
    pub fn verify_at(&self, signature_header: &str, body: &[u8], now: i64) -> bool {
        if self.secret.is_empty() {
            return false;
        }

        let Some(header) = SignatureHeader::parse(signature_header) else {
            tracing::debug!("Paddle-Signature missing ts or h1");
            return false;
        };

        let Ok(timestamp) = header.timestamp.parse::<i64>() else {
            tracing::debug!(ts = header.timestamp, "Paddle-Signature timestamp is not numeric");
            return false;
        };

        let skew = now.saturating_sub(timestamp).unsigned_abs();
        if skew > self.tolerance.as_secs() {
            tracing::warn!(
                timestamp = timestamp,
                now = now,
                skew_secs = skew,
                "Paddle-Signature timestamp outside tolerance"
            );
            return false;
        }

        let Some(expected) = compute_signature(header.timestamp, body, &self.secret) else {
            return false;
        };

        expected.as_bytes().ct_eq(header.h1.as_bytes()).into()
    }
}
