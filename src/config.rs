//! Unified configuration module.
//!
//! Consolidates the per-component configuration structs
//! into one coherent system with defaults and a builder, plus the "config
//! loader contract" (`ClientContext`) host applications implement to wire
//! this crate to their own datasite identity and workspace.

use crate::error::{RpcError, RpcResult};
use crate::url::SyftUrl;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for one app's event server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventServerConfig {
    /// Determines the RPC subtree this server watches and publishes to.
    pub app_name: String,

    /// Handler worker pool size.
    pub workers: usize,

    /// Bounded intake queue capacity.
    pub intake_capacity: usize,

    /// Interval for the periodic rescan that complements the watcher.
    pub poll_interval: Duration,

    /// Grace period given to in-flight handlers on `stop()`.
    pub shutdown_grace_period: Duration,
}

impl Default for EventServerConfig {
    fn default() -> Self {
        Self {
            app_name: "app".to_string(),
            workers: 4,
            intake_capacity: 256,
            poll_interval: Duration::from_secs(5),
            shutdown_grace_period: Duration::from_secs(10),
        }
    }
}

/// Configuration for the background cleanup service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// How often the sweep runs.
    pub interval: Duration,

    /// How long after a record's own `expires` it remains on disk before
    /// eviction. Distinct from the record's own expiry: default is zero,
    /// i.e. evict as soon as a record is past its own expiry.
    pub retention: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            retention: Duration::from_secs(0),
        }
    }
}

/// Configuration for the HTTP-over-filesystem bridge.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    /// Host names permitted for outbound HTTP forwarding.
    pub allowed_hosts: Vec<String>,

    /// Upstream request timeout.
    pub upstream_timeout: Duration,
}

/// Top-level configuration combining every component used by one app.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RpcConfig {
    pub server: EventServerConfigOrDefault,
    pub cleanup: CleanupConfig,
    pub bridge: BridgeConfig,
}

/// Newtype so `RpcConfig` can derive `Default` even though
/// `EventServerConfig::default()` needs an app name filled in by callers;
/// deriving `Default` at the top level and relying on field-level
/// `Default` impls underneath.
pub type EventServerConfigOrDefault = EventServerConfig;

/// Builder with validation.
#[derive(Default)]
pub struct ConfigBuilder {
    config: RpcConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RpcConfig::default(),
        }
    }

    pub fn server(mut self, server: EventServerConfig) -> Self {
        self.config.server = server;
        self
    }

    pub fn cleanup(mut self, cleanup: CleanupConfig) -> Self {
        self.config.cleanup = cleanup;
        self
    }

    pub fn bridge(mut self, bridge: BridgeConfig) -> Self {
        self.config.bridge = bridge;
        self
    }

    pub fn build(self) -> RpcResult<RpcConfig> {
        if self.config.server.workers == 0 {
            return Err(RpcError::Configuration {
                field: "server.workers".to_string(),
                message: "worker pool size cannot be 0".to_string(),
            });
        }
        if self.config.server.app_name.is_empty() {
            return Err(RpcError::MissingConfiguration {
                field: "server.app_name".to_string(),
            });
        }
        Ok(self.config)
    }
}

/// The "config loader contract": the host application supplies
/// an opaque collaborator exposing local identity, workspace root, and a
/// path→URL conversion, rather than this crate reading environment state
/// directly, taken in at construction time instead of reaching for
/// global config.
pub trait ClientContext: Send + Sync {
    /// This peer's own datasite identity (`user@domain`).
    fn local_datasite(&self) -> &str;

    /// Absolute path to the root of the synced workspace
    /// (`<workspace>/datasites/...` lives under this).
    fn workspace_root(&self) -> &Path;

    /// Convert an absolute local filesystem path under the workspace into
    /// the `SyftUrl` it corresponds to, if any.
    fn path_to_url(&self, path: &Path) -> Option<SyftUrl>;

    /// Absolute path to `<workspace>/datasites`.
    fn datasites_root(&self) -> PathBuf {
        self.workspace_root().join("datasites")
    }
}
