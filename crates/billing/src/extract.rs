//! Defensive field extraction from Paddle payloads
//!
//! Paddle payload shapes drift between API versions and event subtypes. Each
//! logical field is described by an ordered list of JSON pointers; the first
//! candidate holding a usable value wins. Absent, null, blank or wrongly
//! typed candidates are skipped, never reported as errors.

use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

/// First candidate that is a non-blank string, trimmed
pub fn first_non_empty(data: &Value, candidates: &[&str]) -> Option<String> {
    candidates.iter().find_map(|pointer| {
        data.pointer(pointer)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// First candidate that parses as an RFC 3339 timestamp, normalised to UTC
pub fn first_timestamp(data: &Value, candidates: &[&str]) -> Option<OffsetDateTime> {
    candidates.iter().find_map(|pointer| {
        let raw = data.pointer(pointer)?.as_str()?.trim();
        if raw.is_empty() {
            return None;
        }
        OffsetDateTime::parse(raw, &Rfc3339)
            .ok()
            .map(|ts| ts.to_offset(UtcOffset::UTC))
    })
}

/// First candidate that parses as an integer, or 0.
///
/// Paddle encodes money as decimal strings of minor units (`"1999"`); plain
/// JSON integers are accepted too.
pub fn first_int(data: &Value, candidates: &[&str]) -> i64 {
    candidates
        .iter()
        .find_map(|pointer| match data.pointer(pointer)? {
            Value::String(s) => s.trim().parse::<i64>().ok(),
            Value::Number(n) => n.as_i64(),
            _ => None,
        })
        .unwrap_or(0)
}
