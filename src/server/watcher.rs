//! Filesystem watcher for incoming request files.
//!
//! Watches one app's RPC directory recursively for both *file-created*
//! and *file-renamed-into-place* events, since the sync layer may do
//! either depending on how it lands a file. `notify`'s recommended
//! watcher picks the native backend for the platform and falls back to
//! polling automatically where native events aren't available, which is
//! why we never hand-roll that fallback ourselves.

use crate::protocol::paths::is_plain_request_file;
use crate::server::telemetry::ServerTelemetry;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Owns the live `notify` watcher; dropping this stops watching.
pub struct RpcWatcher {
    _watcher: RecommendedWatcher,
}

impl RpcWatcher {
    /// Starts watching `rpc_dir` recursively, forwarding every candidate
    /// request file path into `tx`. Non-request-file events (responses,
    /// rejection markers, directories, policy files) are filtered out
    /// here so the dispatch pipeline only ever sees `.request` paths.
    /// Events that would overflow the bounded intake queue are dropped
    /// and counted in `telemetry` rather than applying backpressure to
    /// the watcher thread. Runtime errors reported by the native backend
    /// (queue overflows, a watched handle going away) are forwarded on
    /// `errors` instead of only logged, so a supervisor can restart the
    /// watcher per §7's "one restart, then degraded polling-only mode".
    pub fn start(
        rpc_dir: &Path,
        tx: mpsc::Sender<PathBuf>,
        telemetry: Arc<ServerTelemetry>,
        errors: mpsc::UnboundedSender<String>,
    ) -> crate::error::RpcResult<Self> {
        let watcher_tx = tx.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => handle_event(event, &watcher_tx, &telemetry),
                Err(e) => {
                    warn!("filesystem watcher error: {e}");
                    let _ = errors.send(e.to_string());
                }
            },
            Config::default(),
        )
        .map_err(|e| crate::error::RpcError::Watcher(e.to_string()))?;

        std::fs::create_dir_all(rpc_dir).map_err(|e| crate::error::RpcError::Io {
            source: e,
            path: Some(rpc_dir.to_path_buf()),
        })?;

        watcher
            .watch(rpc_dir, RecursiveMode::Recursive)
            .map_err(|e| crate::error::RpcError::Watcher(e.to_string()))?;

        Ok(Self { _watcher: watcher })
    }
}

/// Both plain creates and renames-into-place are interesting; other
/// kinds (metadata-only modifies, removes) are not.
fn handle_event(event: Event, tx: &mpsc::Sender<PathBuf>, telemetry: &ServerTelemetry) {
    let interesting = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(notify::event::ModifyKind::Name(_))
    );
    if !interesting {
        return;
    }

    for path in event.paths {
        if is_plain_request_file(&path) && tx.try_send(path.clone()).is_err() {
            debug!(path = %path.display(), "intake queue full, dropping watcher event");
            telemetry.events_dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    }
}

/// Recursively lists every plain `.request` file already present under
/// `rpc_dir`, used for the startup scan that catches requests which
/// arrived while the server was down.
pub fn scan_existing_requests(rpc_dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    walk(rpc_dir, &mut out);
    out
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk(&path, out);
        } else if is_plain_request_file(&path) {
            out.push(path);
        }
    }
}
