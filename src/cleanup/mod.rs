//! Background cleanup service: periodically sweeps expired request and
//! response files out of an app's RPC tree.

use crate::config::CleanupConfig;
use crate::protocol::{paths, RequestRecord, ResponseRecord};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Running counters for every sweep this service has performed.
#[derive(Debug, Default, Clone, Copy)]
pub struct CleanupStats {
    pub requests_deleted: u64,
    pub responses_deleted: u64,
    pub rejections_deleted: u64,
    pub errors: u64,
}

/// Sweeps one or more RPC directories at a configured interval, deleting
/// request/response/rejection files whose record has aged out past
/// `retention` beyond its own `expires`. Safe to run
/// concurrently with an [`crate::server::EventServer`] watching the
/// same tree: both only ever act on files that are already fully
/// written (atomic rename discipline), never on one mid-write.
pub struct CleanupService {
    config: CleanupConfig,
    rpc_dirs: Vec<PathBuf>,
    stats: Arc<RwLock<CleanupStats>>,
    shutdown_tx: broadcast::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl CleanupService {
    pub fn new(config: CleanupConfig, rpc_dirs: Vec<PathBuf>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            rpc_dirs,
            stats: Arc::new(RwLock::new(CleanupStats::default())),
            shutdown_tx,
            task: None,
        }
    }

    pub async fn stats(&self) -> CleanupStats {
        *self.stats.read().await
    }

    /// Starts the background sweep timer, running on its own interval
    /// independent of the event server.
    pub fn start(&mut self) {
        let interval = self.config.interval;
        let retention = self.config.retention;
        let rpc_dirs = self.rpc_dirs.clone();
        let stats = Arc::clone(&self.stats);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for rpc_dir in &rpc_dirs {
                            run_sweep(rpc_dir, retention, &stats).await;
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("cleanup service shutting down");
                        break;
                    }
                }
            }
        });
        self.task = Some(handle);
    }

    /// Signals the sweep loop to stop after its current tick.
    pub fn stop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Runs one sweep immediately, outside the timer, returning the
    /// updated stats snapshot. Useful for tests and for an operator-
    /// triggered cleanup.
    pub async fn sweep_once(&self) -> CleanupStats {
        for rpc_dir in &self.rpc_dirs {
            run_sweep(rpc_dir, self.config.retention, &self.stats).await;
        }
        self.stats().await
    }
}

async fn run_sweep(rpc_dir: &Path, retention: std::time::Duration, stats: &Arc<RwLock<CleanupStats>>) {
    let cutoff = Utc::now()
        - chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::zero());

    let mut files = Vec::new();
    walk(rpc_dir, &mut files);

    for path in files {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };

        if name.ends_with(&format!(".{}", paths::REJECTION_SUFFIX)) {
            sweep_rejection(&path, cutoff, stats).await;
        } else if name.ends_with(&format!(".{}", paths::REQUEST_SUFFIX)) {
            sweep_request(&path, cutoff, stats).await;
        } else if name.ends_with(&format!(".{}", paths::RESPONSE_SUFFIX)) {
            sweep_response(&path, cutoff, stats).await;
        }
    }
}

async fn sweep_request(path: &Path, cutoff: chrono::DateTime<Utc>, stats: &Arc<RwLock<CleanupStats>>) {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(_) => return,
    };
    let record = match RequestRecord::decode(&bytes, Some(path)) {
        Ok(r) => r,
        Err(_) => return,
    };
    if record.expires >= cutoff {
        return;
    }
    match std::fs::remove_file(path) {
        Ok(()) => {
            stats.write().await.requests_deleted += 1;
            debug!(path = %path.display(), "deleted expired request file");
        }
        Err(e) => {
            stats.write().await.errors += 1;
            error!(path = %path.display(), error = %e, "failed to delete expired request file");
        }
    }
}

async fn sweep_response(path: &Path, cutoff: chrono::DateTime<Utc>, stats: &Arc<RwLock<CleanupStats>>) {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(_) => return,
    };
    let record = match ResponseRecord::decode(&bytes, Some(path)) {
        Ok(r) => r,
        Err(_) => return,
    };
    if record.expires >= cutoff {
        return;
    }
    match std::fs::remove_file(path) {
        Ok(()) => {
            stats.write().await.responses_deleted += 1;
            debug!(path = %path.display(), "deleted expired response file");
        }
        Err(e) => {
            stats.write().await.errors += 1;
            error!(path = %path.display(), error = %e, "failed to delete expired response file");
        }
    }
}

/// Rejection markers are empty files with no `expires` of their own
/// (spec open question resolved in `SPEC_FULL.md` §3), so staleness is
/// judged by file modification time against `cutoff` instead.
async fn sweep_rejection(path: &Path, cutoff: chrono::DateTime<Utc>, stats: &Arc<RwLock<CleanupStats>>) {
    let modified = match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(m) => chrono::DateTime::<Utc>::from(m),
        Err(_) => return,
    };
    if modified >= cutoff {
        return;
    }
    match std::fs::remove_file(path) {
        Ok(()) => {
            stats.write().await.rejections_deleted += 1;
            debug!(path = %path.display(), "deleted orphaned rejection marker");
        }
        Err(e) => {
            stats.write().await.errors += 1;
            error!(path = %path.display(), error = %e, "failed to delete orphaned rejection marker");
        }
    }
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
        } else {
            out.push(path);
        }
    }
}
