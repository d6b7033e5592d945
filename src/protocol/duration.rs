//! Compound duration string parsing.

use crate::error::{RpcError, RpcResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

static COMPONENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s*(d|h|m|s)").expect("static regex is valid"));

/// Parses strings like `"1d2h30m"` or `"45s"` into a [`Duration`].
/// Case-insensitive; at least one component is required. Rejects
/// strings with no recognized component or with leftover characters
/// that don't belong to any component.
pub fn parse_duration(raw: &str) -> RpcResult<Duration> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RpcError::InvalidExpiry(raw.to_string()));
    }

    let mut consumed = 0usize;
    let mut total_seconds: u64 = 0;
    let mut matched_any = false;

    for caps in COMPONENT_RE.captures_iter(trimmed) {
        let whole = caps.get(0).expect("group 0 always present");
        if whole.start() != consumed {
            // A gap means characters outside any component (e.g. stray
            // punctuation or a duplicated unit) — reject rather than
            // silently ignore them.
            return Err(RpcError::InvalidExpiry(raw.to_string()));
        }
        consumed = whole.end();

        let amount: u64 = caps[1]
            .parse()
            .map_err(|_| RpcError::InvalidExpiry(raw.to_string()))?;
        let unit_seconds = match caps[2].to_ascii_lowercase().as_str() {
            "d" => 86_400,
            "h" => 3_600,
            "m" => 60,
            "s" => 1,
            _ => unreachable!("regex only captures d|h|m|s"),
        };
        total_seconds = total_seconds.saturating_add(amount.saturating_mul(unit_seconds));
        matched_any = true;
    }

    if !matched_any || consumed != trimmed.len() {
        return Err(RpcError::InvalidExpiry(raw.to_string()));
    }

    Ok(Duration::from_secs(total_seconds))
}
