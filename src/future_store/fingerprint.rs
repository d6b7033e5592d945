//! Cache fingerprinting for opt-in request deduplication.
//!
//! `fingerprint = sha256(method || canonical-url || canonical-headers ||
//! body)`. Headers are sorted by name before hashing so that two
//! logically identical requests with headers attached in a different
//! order still fingerprint the same.

use sha2::{Digest, Sha256};

/// Computes the cache key for a prospective `send`, described in spec
/// §4.4.
pub fn compute(method: &str, url: &str, headers: &[(String, String)], body: &[u8]) -> String {
    let mut sorted_headers: Vec<&(String, String)> = headers.iter().collect();
    sorted_headers.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\0");
    hasher.update(url.as_bytes());
    hasher.update(b"\0");
    for (k, v) in &sorted_headers {
        hasher.update(k.as_bytes());
        hasher.update(b":");
        hasher.update(v.as_bytes());
        hasher.update(b"\0");
    }
    hasher.update(body);

    hex::encode(hasher.finalize())
}
