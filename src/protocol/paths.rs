//! Deterministic request/response/rejection path construction.
//!
//! ```text
//! <rpc-dir>/<endpoint>/<sender>/<id>.request
//! <rpc-dir>/<endpoint>/<sender>/<id>.response
//! <rpc-dir>/<endpoint>/<sender>/<id>.syftrejected.request
//! ```
//!
//! The per-sender subdirectory exists because permissions routinely
//! grant write-access to an endpoint's request directory to a broad set
//! of principals; segregating by sender limits the blast radius of
//! misbehavior to that sender's own subdirectory.

use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const REQUEST_SUFFIX: &str = "request";
pub const RESPONSE_SUFFIX: &str = "response";
pub const REJECTION_SUFFIX: &str = "syftrejected.request";

/// Directory holding one sender's request/response/rejection files for
/// one endpoint.
pub fn sender_dir(rpc_dir: &Path, endpoint: &str, sender: &str) -> PathBuf {
    rpc_dir.join(endpoint).join(sender)
}

pub fn request_path(rpc_dir: &Path, endpoint: &str, sender: &str, id: Uuid) -> PathBuf {
    sender_dir(rpc_dir, endpoint, sender).join(format!("{id}.{REQUEST_SUFFIX}"))
}

pub fn response_path(rpc_dir: &Path, endpoint: &str, sender: &str, id: Uuid) -> PathBuf {
    sender_dir(rpc_dir, endpoint, sender).join(format!("{id}.{RESPONSE_SUFFIX}"))
}

pub fn rejection_path(rpc_dir: &Path, endpoint: &str, sender: &str, id: Uuid) -> PathBuf {
    sender_dir(rpc_dir, endpoint, sender).join(format!("{id}.{REJECTION_SUFFIX}"))
}

/// Given a request file path, derive the sibling response path it would
/// have (if any exists).
pub fn sibling_response_path(request_path: &Path) -> Option<PathBuf> {
    sibling_with_suffix(request_path, REQUEST_SUFFIX, RESPONSE_SUFFIX)
}

/// Given a request file path, derive the sibling rejection-marker path.
pub fn sibling_rejection_path(request_path: &Path) -> Option<PathBuf> {
    sibling_with_suffix(request_path, REQUEST_SUFFIX, REJECTION_SUFFIX)
}

fn sibling_with_suffix(path: &Path, from_suffix: &str, to_suffix: &str) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let stripped = name.strip_suffix(&format!(".{from_suffix}"))?;
    Some(path.with_file_name(format!("{stripped}.{to_suffix}")))
}

/// Extracts the id embedded in a `.request`/`.response` file name.
pub fn id_from_filename(path: &Path) -> Option<Uuid> {
    let name = path.file_name()?.to_str()?;
    let id_part = name.split('.').next()?;
    Uuid::parse_str(id_part).ok()
}

/// True iff the file name ends in `.request` but not `.syftrejected.request`.
pub fn is_plain_request_file(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };
    name.ends_with(&format!(".{REQUEST_SUFFIX}")) && !name.ends_with(REJECTION_SUFFIX)
}
