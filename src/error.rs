//! Unified error handling for the RPC fabric.
//!
//! A single `thiserror`-derived enum covers every failure kind called out
//! in the protocol, permissions, server, bridge and cleanup subsystems, so
//! call sites can match on a stable set of variants instead of threading
//! ad-hoc string errors between modules.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for all `syft_rpc` operations.
#[derive(Error, Debug)]
pub enum RpcError {
    // --- I/O ---
    #[error("I/O error: {source} (path: {path:?})")]
    Io {
        source: io::Error,
        path: Option<PathBuf>,
    },

    #[error("failed to atomically write {path}")]
    AtomicWrite { path: PathBuf },

    // --- URL / path model ---
    #[error("malformed syft:// url: {0}")]
    MalformedUrl(String),

    // --- Protocol codec ---
    #[error("body of type {type_name} cannot be serialized")]
    UnserializableBody { type_name: String },

    #[error("invalid expiry duration string: {0:?}")]
    InvalidExpiry(String),

    #[error("failed to decode record at {path:?}: {reason}")]
    DecodeError { path: Option<PathBuf>, reason: String },

    #[error("wire encoding error: {0}")]
    Wire(String),

    // --- Permissions ---
    #[error("not authorized: {operation} on {path}")]
    NotAuthorized { operation: String, path: String },

    #[error("malformed policy file {path:?}: {reason}")]
    MalformedPolicy { path: PathBuf, reason: String },

    // --- Future store / client ---
    #[error("timed out waiting for response to request {id}")]
    Timeout { id: String },

    #[error("request {id} expired before a response arrived")]
    Expired { id: String },

    #[error("request {id} was rejected by the responder")]
    Rejected { id: String },

    #[error("future store error: {0}")]
    Store(String),

    // --- Event server ---
    #[error("filesystem watcher error: {0}")]
    Watcher(String),

    #[error("no route matches endpoint {endpoint}")]
    NoRoute { endpoint: String },

    // --- HTTP bridge ---
    #[error("upstream HTTP request failed: {0}")]
    BridgeUpstream(String),

    #[error("host {host} is not in the bridge allow-list")]
    NotAllowed { host: String },

    // --- Configuration ---
    #[error("configuration error: {field} - {message}")]
    Configuration { field: String, message: String },

    #[error("missing required configuration: {field}")]
    MissingConfiguration { field: String },

    // --- Serialization passthrough ---
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias used throughout the crate.
pub type RpcResult<T> = Result<T, RpcError>;

/// Broad category of an [`RpcError`], useful for metrics/telemetry
/// grouping without matching every variant at each call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    FileSystem,
    Protocol,
    Permissions,
    Store,
    Server,
    Bridge,
    Configuration,
    Serialization,
    Internal,
}

impl RpcError {
    /// Get the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            RpcError::Io { .. } | RpcError::AtomicWrite { .. } => ErrorCategory::FileSystem,

            RpcError::MalformedUrl(_)
            | RpcError::UnserializableBody { .. }
            | RpcError::InvalidExpiry(_)
            | RpcError::DecodeError { .. }
            | RpcError::Wire(_) => ErrorCategory::Protocol,

            RpcError::NotAuthorized { .. } | RpcError::MalformedPolicy { .. } => {
                ErrorCategory::Permissions
            }

            RpcError::Timeout { .. }
            | RpcError::Expired { .. }
            | RpcError::Rejected { .. }
            | RpcError::Store(_) => ErrorCategory::Store,

            RpcError::Watcher(_) | RpcError::NoRoute { .. } => ErrorCategory::Server,

            RpcError::BridgeUpstream(_) | RpcError::NotAllowed { .. } => ErrorCategory::Bridge,

            RpcError::Configuration { .. } | RpcError::MissingConfiguration { .. } => {
                ErrorCategory::Configuration
            }

            RpcError::Json(_) | RpcError::Yaml(_) => ErrorCategory::Serialization,

            RpcError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Whether retrying the operation that produced this error might
    /// succeed without any change in caller behavior (e.g. transient I/O).
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            RpcError::Timeout { .. } | RpcError::Watcher(_) | RpcError::BridgeUpstream(_) => true,
            _ => false,
        }
    }
}

/// Adds `.context(...)` / `.with_context(...)` to `io::Result`, mirroring
/// the ergonomics of the wider Rust ecosystem's `anyhow::Context`.
pub trait ErrorContext<T> {
    fn with_context<F>(self, f: F) -> RpcResult<T>
    where
        F: FnOnce() -> String;

    fn context(self, msg: &str) -> RpcResult<T>;
}

impl<T> ErrorContext<T> for Result<T, io::Error> {
    fn with_context<F>(self, f: F) -> RpcResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| RpcError::Internal(format!("{}: {}", f(), e)))
    }

    fn context(self, msg: &str) -> RpcResult<T> {
        self.map_err(|e| RpcError::Internal(format!("{}: {}", msg, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorizes_permission_errors() {
        let err = RpcError::NotAuthorized {
            operation: "read".into(),
            path: "data/private".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Permissions);
        assert!(!err.is_retryable());
    }

    #[test]
    fn io_timeout_is_retryable() {
        let err = RpcError::Io {
            source: io::Error::new(io::ErrorKind::TimedOut, "slow disk"),
            path: None,
        };
        assert!(err.is_retryable());
    }
}
